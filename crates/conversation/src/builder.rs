use chrono::{DateTime, Utc};
use shared::{
    domain::{EventId, Priority, ProgressStatus, ProjectId, ProjectType, UserId},
    event::{Event, EventPayload, EventSource, ProgressLogged, ProjectCreated},
};
use thiserror::Error;

use crate::session::{fields, CollectedFields, FieldValue, Flow};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("field '{0}' holds an unexpected value")]
    InvalidField(&'static str),
}

/// Stamps a completed flow into a new event with a fresh id and the current time.
pub fn build_event(
    origin_user_id: UserId,
    flow: Flow,
    collected: &CollectedFields,
) -> Result<Event, BuildError> {
    build_event_with(origin_user_id, flow, collected, EventId::new_v4(), Utc::now())
}

pub fn build_event_with(
    origin_user_id: UserId,
    flow: Flow,
    collected: &CollectedFields,
    event_id: EventId,
    timestamp: DateTime<Utc>,
) -> Result<Event, BuildError> {
    let payload = match flow {
        Flow::ProjectCreation => EventPayload::ProjectCreated(project_created(collected)?),
        Flow::ProgressLogging => EventPayload::ProgressLogged(progress_logged(collected)?),
    };
    Ok(Event {
        event_id,
        origin_user_id,
        timestamp,
        payload,
        source: EventSource::Chat,
    })
}

fn project_created(collected: &CollectedFields) -> Result<ProjectCreated, BuildError> {
    let deadline = match field(collected, fields::DEADLINE)? {
        FieldValue::Date(date) => *date,
        _ => return Err(BuildError::InvalidField(fields::DEADLINE)),
    };
    let priority = Priority::parse(text(collected, fields::PRIORITY)?)
        .ok_or(BuildError::InvalidField(fields::PRIORITY))?;
    let project_type = ProjectType::parse(text(collected, fields::TYPE)?)
        .ok_or(BuildError::InvalidField(fields::TYPE))?;

    Ok(ProjectCreated {
        title: text(collected, fields::TITLE)?.to_string(),
        deadline,
        priority,
        project_type,
        course_id: nullable_text(collected, fields::COURSE_ID)?,
        course_name: nullable_text(collected, fields::COURSE_NAME)?,
        description: text(collected, fields::DESCRIPTION)?.to_string(),
    })
}

fn progress_logged(collected: &CollectedFields) -> Result<ProgressLogged, BuildError> {
    let project_id = ProjectId::parse(text(collected, fields::PROJECT_ID)?)
        .ok_or(BuildError::InvalidField(fields::PROJECT_ID))?;
    let status = ProgressStatus::parse(text(collected, fields::STATUS)?)
        .ok_or(BuildError::InvalidField(fields::STATUS))?;
    let duration_minutes = u32::try_from(integer(collected, fields::DURATION_MINUTES)?)
        .map_err(|_| BuildError::InvalidField(fields::DURATION_MINUTES))?;
    let progress = u8::try_from(integer(collected, fields::PROGRESS)?)
        .map_err(|_| BuildError::InvalidField(fields::PROGRESS))?;

    Ok(ProgressLogged {
        project_id,
        status,
        duration_minutes,
        progress,
        note: text(collected, fields::NOTE)?.to_string(),
    })
}

fn field<'a>(collected: &'a CollectedFields, name: &'static str) -> Result<&'a FieldValue, BuildError> {
    collected.get(name).ok_or(BuildError::MissingField(name))
}

fn text<'a>(collected: &'a CollectedFields, name: &'static str) -> Result<&'a str, BuildError> {
    match field(collected, name)? {
        FieldValue::Text(value) => Ok(value),
        _ => Err(BuildError::InvalidField(name)),
    }
}

/// The field must be present; an explicit null maps to `None`.
fn nullable_text(collected: &CollectedFields, name: &'static str) -> Result<Option<String>, BuildError> {
    match field(collected, name)? {
        FieldValue::Text(value) => Ok(Some(value.clone())),
        FieldValue::Null => Ok(None),
        _ => Err(BuildError::InvalidField(name)),
    }
}

fn integer(collected: &CollectedFields, name: &'static str) -> Result<i64, BuildError> {
    match field(collected, name)? {
        FieldValue::Integer(value) => Ok(*value),
        _ => Err(BuildError::InvalidField(name)),
    }
}

#[cfg(test)]
#[path = "tests/builder_tests.rs"]
mod tests;
