use conversation::{
    parse_command, validate::SKIP_SENTINEL, Advance, ChatCommand, Prompt, SessionStateMachine,
};
use shared::{
    domain::UserId,
    event::{Event, EventPayload},
};
use sync_core::Broadcaster;
use tracing::warn;

pub const HELP: &str = "Commands:
  /new                       start a new project
  /log <project-id> [title]  log a work session for a project
  /cancel                    abandon the current flow
  /help                      show this list";

/// One user's chat front end: routes each line either to a command or to the
/// conversation, and hands finished events to every channel.
pub struct ChatClient {
    user_id: UserId,
    machine: SessionStateMachine,
    broadcaster: Broadcaster,
}

impl ChatClient {
    pub fn new(user_id: UserId, machine: SessionStateMachine, broadcaster: Broadcaster) -> Self {
        Self {
            user_id,
            machine,
            broadcaster,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Replies to show for one line of input.
    pub async fn handle_line(&mut self, line: &str) -> Vec<String> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }

        match parse_command(line) {
            Some(ChatCommand::NewProject) => render(&self.machine.start_project_flow(self.user_id)),
            Some(ChatCommand::LogProgress(project)) => {
                render(&self.machine.start_progress_flow(self.user_id, project))
            }
            Some(ChatCommand::Cancel) => {
                if self.machine.cancel(self.user_id) {
                    vec!["Cancelled.".to_string()]
                } else {
                    vec!["Nothing to cancel.".to_string()]
                }
            }
            Some(ChatCommand::Help) => vec![HELP.to_string()],
            Some(ChatCommand::Invalid { usage }) => vec![format!("Usage: {usage}")],
            // Only the skip sentinel belongs to a running flow.
            Some(ChatCommand::Unknown(command)) if !self.is_flow_sentinel(&command) => {
                vec![format!("Unknown command {command}. Send /help for the list.")]
            }
            Some(ChatCommand::Unknown(_)) | None => self.advance(line).await,
        }
    }

    fn is_flow_sentinel(&mut self, command: &str) -> bool {
        command.eq_ignore_ascii_case(SKIP_SENTINEL) && self.machine.session(self.user_id).is_some()
    }

    async fn advance(&mut self, line: &str) -> Vec<String> {
        match self.machine.advance(self.user_id, line) {
            Advance::NotInFlow => vec![
                "Start with /new or /log <project-id>. Send /help for the list.".to_string(),
            ],
            Advance::Rejected { reason, .. } => {
                let mut lines = vec![reason.to_string()];
                if let Some(prompt) = self.machine.current_prompt(self.user_id) {
                    lines.extend(render(&prompt));
                }
                lines
            }
            Advance::Advanced(prompt) => render(&prompt),
            Advance::Completed(event) => self.publish(&event).await,
            Advance::Cancelled => vec!["Cancelled.".to_string()],
            Advance::Failed(err) => vec![format!("Could not save this entry: {err}")],
        }
    }

    async fn publish(&self, event: &Event) -> Vec<String> {
        let accepted = self.broadcaster.broadcast(self.user_id, event).await;
        let mut lines = Vec::new();
        if accepted == 0 {
            warn!(event_id = %event.event_id, "sync: no channel accepted the event");
            lines.push(format!(
                "Could not send {} {}; no channel accepted it.",
                event.event_type(),
                event.event_id
            ));
            return lines;
        }

        lines.push(format!(
            "Saved {} {} (sent through {accepted} of {} channels).",
            event.event_type(),
            event.event_id,
            self.broadcaster.len()
        ));
        if let EventPayload::ProjectCreated(project) = &event.payload {
            lines.push(format!(
                "Log progress with: /log {} {}",
                event.event_id, project.title
            ));
        }
        lines
    }
}

/// Prompt text followed by its numbered options.
pub fn render(prompt: &Prompt) -> Vec<String> {
    let mut lines = vec![prompt.text.clone()];
    lines.extend(
        prompt
            .options
            .iter()
            .enumerate()
            .map(|(index, option)| format!("  {}. {option}", index + 1)),
    );
    lines
}

#[cfg(test)]
#[path = "tests/chat_tests.rs"]
mod tests;
