use shared::domain::{ProjectId, ProjectRef};

/// Slash commands understood outside of (or on top of) a running flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    NewProject,
    LogProgress(ProjectRef),
    Cancel,
    Help,
    Invalid { usage: &'static str },
    Unknown(String),
}

impl ChatCommand {
    /// Whether the command starts a flow (and so replaces any session).
    pub fn is_flow_entry(&self) -> bool {
        matches!(self, ChatCommand::NewProject | ChatCommand::LogProgress(_))
    }
}

pub const LOG_USAGE: &str = "/log <project-id> [project title]";

/// Returns `None` for input that is not a slash command at all.
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default().to_ascii_lowercase();
    let args = parts.next().unwrap_or_default().trim();

    let command = match name.as_str() {
        "new" | "newproject" => ChatCommand::NewProject,
        "log" => parse_log_args(args),
        "cancel" => ChatCommand::Cancel,
        "help" | "start" => ChatCommand::Help,
        _ => ChatCommand::Unknown(input.to_string()),
    };
    Some(command)
}

fn parse_log_args(args: &str) -> ChatCommand {
    let mut parts = args.splitn(2, char::is_whitespace);
    let Some(project_id) = parts.next().and_then(ProjectId::parse) else {
        return ChatCommand::Invalid { usage: LOG_USAGE };
    };
    let title = parts
        .next()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("project {}", short_id(&project_id)));
    ChatCommand::LogProgress(ProjectRef { project_id, title })
}

fn short_id(project_id: &ProjectId) -> String {
    project_id.to_string().chars().take(8).collect()
}
