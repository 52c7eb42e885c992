use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite, Transaction,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use shared::{
    domain::{EventId, Priority, ProgressStatus, ProjectId, ProjectType, UserId},
    event::{EventSource, EventType},
};
use sync_core::{
    CommitOutcome, DedupLedger, DedupRecord, DomainMutation, LocalStore, NewProgressSession,
    NewProject, SyncStateStore,
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredProject {
    pub project_id: ProjectId,
    pub owner_user_id: UserId,
    pub title: String,
    pub deadline: NaiveDate,
    pub priority: Priority,
    pub project_type: ProjectType,
    pub course_id: Option<String>,
    pub course_name: Option<String>,
    pub description: String,
    /// `None` until the first progress log is applied.
    pub status: Option<ProgressStatus>,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredProgressSession {
    pub session_id: EventId,
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub status: ProgressStatus,
    pub duration_minutes: u32,
    pub progress: u8,
    pub note: String,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSyncState {
    pub channel: String,
    pub last_success_at: DateTime<Utc>,
}

const PROJECT_COLUMNS: &str = "id, owner_user_id, title, deadline, priority, project_type, \
     course_id, course_name, description, status, progress, created_at, updated_at";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn load_project(&self, project_id: ProjectId) -> Result<Option<StoredProject>> {
        let row = sqlx::query(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"))
            .bind(project_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(project_from_row).transpose()
    }

    /// Projects ordered by deadline, optionally only those owned by `owner`.
    pub async fn list_projects(&self, owner: Option<UserId>) -> Result<Vec<StoredProject>> {
        let rows = match owner {
            Some(owner) => {
                sqlx::query(&format!(
                    "SELECT {PROJECT_COLUMNS} FROM projects WHERE owner_user_id = ? ORDER BY deadline, title"
                ))
                .bind(owner.0)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY deadline, title"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(project_from_row).collect()
    }

    pub async fn list_progress_sessions(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<StoredProgressSession>> {
        let rows = sqlx::query(
            "SELECT id, project_id, user_id, status, duration_minutes, progress, note, logged_at
             FROM progress_sessions WHERE project_id = ? ORDER BY logged_at, id",
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                Ok(StoredProgressSession {
                    session_id: parse_event_id(&r.get::<String, _>(0))?,
                    project_id: parse_project_id(&r.get::<String, _>(1))?,
                    user_id: UserId(r.get::<i64, _>(2)),
                    status: parse_column(&r.get::<String, _>(3), "status", ProgressStatus::parse)?,
                    duration_minutes: u32::try_from(r.get::<i64, _>(4))
                        .context("negative duration in progress_sessions")?,
                    progress: u8::try_from(r.get::<i64, _>(5))
                        .context("progress out of range in progress_sessions")?,
                    note: r.get::<String, _>(6),
                    logged_at: r.get::<DateTime<Utc>, _>(7),
                })
            })
            .collect()
    }

    /// Most recently applied first.
    pub async fn list_applied(&self, limit: u32) -> Result<Vec<DedupRecord>> {
        let rows = sqlx::query(
            "SELECT event_id, event_type, applied_at, source, payload_hash
             FROM applied_events ORDER BY applied_at DESC, event_id LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    pub async fn count_applied(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM applied_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    pub async fn list_sync_state(&self) -> Result<Vec<StoredSyncState>> {
        let rows = sqlx::query("SELECT channel, last_success_at FROM sync_state ORDER BY channel")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| StoredSyncState {
                channel: r.get::<String, _>(0),
                last_success_at: r.get::<DateTime<Utc>, _>(1),
            })
            .collect())
    }
}

#[async_trait]
impl DedupLedger for Storage {
    async fn applied_record(&self, event_id: EventId) -> Result<Option<DedupRecord>> {
        let row = sqlx::query(
            "SELECT event_id, event_type, applied_at, source, payload_hash
             FROM applied_events WHERE event_id = ?",
        )
        .bind(event_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(record_from_row).transpose()
    }
}

#[async_trait]
impl LocalStore for Storage {
    async fn commit_once(
        &self,
        record: &DedupRecord,
        mutation: &DomainMutation,
    ) -> Result<CommitOutcome> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "INSERT INTO applied_events (event_id, event_type, applied_at, source, payload_hash)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(event_id) DO NOTHING",
        )
        .bind(record.event_id.to_string())
        .bind(record.event_type.as_str())
        .bind(record.applied_at)
        .bind(record.source.as_str())
        .bind(&record.payload_hash)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to claim ledger row for event {}", record.event_id))?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            return Ok(CommitOutcome::AlreadyApplied);
        }

        // On error `tx` is dropped, which rolls the claim back with the mutation.
        apply_mutation(&mut tx, mutation, record.applied_at).await?;
        tx.commit()
            .await
            .with_context(|| format!("failed to commit event {}", record.event_id))?;
        Ok(CommitOutcome::Committed)
    }
}

#[async_trait]
impl SyncStateStore for Storage {
    async fn last_successful_sync(&self, channel: EventSource) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT last_success_at FROM sync_state WHERE channel = ?")
            .bind(channel.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<DateTime<Utc>, _>(0)))
    }

    async fn record_successful_sync(&self, channel: EventSource, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO sync_state (channel, last_success_at) VALUES (?, ?)
             ON CONFLICT(channel) DO UPDATE SET last_success_at = excluded.last_success_at",
        )
        .bind(channel.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .context("failed to record sync time")?;
        Ok(())
    }
}

async fn apply_mutation(
    tx: &mut Transaction<'_, Sqlite>,
    mutation: &DomainMutation,
    applied_at: DateTime<Utc>,
) -> Result<()> {
    match mutation {
        DomainMutation::UpsertProject(project) => upsert_project(tx, project, applied_at).await,
        DomainMutation::RecordProgress(session) => record_progress(tx, session, applied_at).await,
    }
}

async fn upsert_project(
    tx: &mut Transaction<'_, Sqlite>,
    project: &NewProject,
    applied_at: DateTime<Utc>,
) -> Result<()> {
    let details = &project.details;
    sqlx::query(
        "INSERT INTO projects (id, owner_user_id, title, deadline, priority, project_type,
             course_id, course_name, description, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             owner_user_id = excluded.owner_user_id,
             title = excluded.title,
             deadline = excluded.deadline,
             priority = excluded.priority,
             project_type = excluded.project_type,
             course_id = excluded.course_id,
             course_name = excluded.course_name,
             description = excluded.description,
             updated_at = excluded.updated_at",
    )
    .bind(project.project_id.to_string())
    .bind(project.owner_user_id.0)
    .bind(&details.title)
    .bind(details.deadline)
    .bind(details.priority.as_str())
    .bind(details.project_type.as_str())
    .bind(details.course_id.as_deref())
    .bind(details.course_name.as_deref())
    .bind(&details.description)
    .bind(project.created_at)
    .bind(applied_at)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("failed to upsert project {}", project.project_id))?;
    Ok(())
}

async fn record_progress(
    tx: &mut Transaction<'_, Sqlite>,
    session: &NewProgressSession,
    applied_at: DateTime<Utc>,
) -> Result<()> {
    let details = &session.details;
    let updated = sqlx::query(
        "UPDATE projects SET status = ?, progress = ?, updated_at = ? WHERE id = ?",
    )
    .bind(details.status.as_str())
    .bind(i64::from(details.progress))
    .bind(applied_at)
    .bind(details.project_id.to_string())
    .execute(&mut **tx)
    .await
    .with_context(|| format!("failed to update project {}", details.project_id))?
    .rows_affected();
    if updated == 0 {
        bail!(
            "project {} not found for progress session {}",
            details.project_id,
            session.session_id
        );
    }

    sqlx::query(
        "INSERT INTO progress_sessions (id, project_id, user_id, status, duration_minutes,
             progress, note, logged_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(session.session_id.to_string())
    .bind(details.project_id.to_string())
    .bind(session.user_id.0)
    .bind(details.status.as_str())
    .bind(i64::from(details.duration_minutes))
    .bind(i64::from(details.progress))
    .bind(&details.note)
    .bind(session.logged_at)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("failed to insert progress session {}", session.session_id))?;
    Ok(())
}

fn project_from_row(r: &SqliteRow) -> Result<StoredProject> {
    let status = r
        .get::<Option<String>, _>(9)
        .map(|raw| parse_column(&raw, "status", ProgressStatus::parse))
        .transpose()?;
    Ok(StoredProject {
        project_id: parse_project_id(&r.get::<String, _>(0))?,
        owner_user_id: UserId(r.get::<i64, _>(1)),
        title: r.get::<String, _>(2),
        deadline: r.get::<NaiveDate, _>(3),
        priority: parse_column(&r.get::<String, _>(4), "priority", Priority::parse)?,
        project_type: parse_column(&r.get::<String, _>(5), "project_type", ProjectType::parse)?,
        course_id: r.get::<Option<String>, _>(6),
        course_name: r.get::<Option<String>, _>(7),
        description: r.get::<String, _>(8),
        status,
        progress: u8::try_from(r.get::<i64, _>(10)).context("progress out of range in projects")?,
        created_at: r.get::<DateTime<Utc>, _>(11),
        updated_at: r.get::<DateTime<Utc>, _>(12),
    })
}

fn record_from_row(r: &SqliteRow) -> Result<DedupRecord> {
    Ok(DedupRecord {
        event_id: parse_event_id(&r.get::<String, _>(0))?,
        event_type: parse_column(&r.get::<String, _>(1), "event_type", EventType::parse)?,
        applied_at: r.get::<DateTime<Utc>, _>(2),
        source: parse_column(&r.get::<String, _>(3), "source", EventSource::parse)?,
        payload_hash: r.get::<String, _>(4),
    })
}

fn parse_column<T>(raw: &str, column: &str, parse: impl Fn(&str) -> Option<T>) -> Result<T> {
    parse(raw).ok_or_else(|| anyhow!("unexpected value '{raw}' in column {column}"))
}

fn parse_event_id(raw: &str) -> Result<EventId> {
    EventId::parse(raw).ok_or_else(|| anyhow!("invalid event id '{raw}'"))
}

fn parse_project_id(raw: &str) -> Result<ProjectId> {
    ProjectId::parse(raw).ok_or_else(|| anyhow!("invalid project id '{raw}'"))
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
