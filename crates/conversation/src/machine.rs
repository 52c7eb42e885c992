use chrono::{DateTime, Utc};
use shared::{
    domain::{CourseOption, ProjectRef, UserId},
    event::Event,
};
use tracing::{debug, error, info};

use crate::{
    builder::{build_event, BuildError},
    flow::{prompt_for, transition, Next, Prompt},
    session::{fields, FieldValue, Flow, SessionState, SessionStep, SessionStore},
    validate::{is_cancel, Rejection},
};

/// Result of feeding one input to the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// The user has no flow in progress; route the input elsewhere.
    NotInFlow,
    /// The input was invalid; the session is unchanged and still at `step`.
    Rejected { step: SessionStep, reason: Rejection },
    Advanced(Prompt),
    Completed(Event),
    Cancelled,
    /// The flow reached its end but its fields could not be stamped into an
    /// event. The session is dropped.
    Failed(BuildError),
}

pub struct SessionStateMachine {
    store: SessionStore,
    courses: Vec<CourseOption>,
}

impl SessionStateMachine {
    pub fn new(store: SessionStore, courses: Vec<CourseOption>) -> Self {
        Self { store, courses }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn courses(&self) -> &[CourseOption] {
        &self.courses
    }

    /// Starts project creation, discarding any flow the user had in progress.
    pub fn start_project_flow(&mut self, user_id: UserId) -> Prompt {
        self.start(SessionState::start(user_id, Flow::ProjectCreation, Utc::now()))
    }

    /// Starts progress logging for `project`, discarding any flow the user had
    /// in progress.
    pub fn start_progress_flow(&mut self, user_id: UserId, project: ProjectRef) -> Prompt {
        let mut session = SessionState::start(user_id, Flow::ProgressLogging, Utc::now());
        session.collected_fields.insert(
            fields::PROJECT_ID,
            FieldValue::Text(project.project_id.to_string()),
        );
        session
            .collected_fields
            .insert(fields::PROJECT_TITLE, FieldValue::Text(project.title));
        self.start(session)
    }

    fn start(&mut self, session: SessionState) -> Prompt {
        let prompt = prompt_for(&session, &self.courses);
        let user_id = session.user_id;
        let flow = session.flow();
        if let Some(previous) = self.store.put(session) {
            info!(
                user_id = user_id.0,
                ?flow,
                replaced_step = ?previous.current_step,
                "conversation: new flow replaced an unfinished session"
            );
        }
        prompt
    }

    pub fn cancel(&mut self, user_id: UserId) -> bool {
        self.store.remove(user_id).is_some()
    }

    pub fn session(&mut self, user_id: UserId) -> Option<&SessionState> {
        self.store.get(user_id, Utc::now())
    }

    /// Re-asks the question for the user's current step.
    pub fn current_prompt(&mut self, user_id: UserId) -> Option<Prompt> {
        let session = self.store.get(user_id, Utc::now())?;
        Some(prompt_for(session, &self.courses))
    }

    pub fn advance(&mut self, user_id: UserId, raw_input: &str) -> Advance {
        self.advance_at(user_id, raw_input, Utc::now())
    }

    pub fn advance_at(&mut self, user_id: UserId, raw_input: &str, now: DateTime<Utc>) -> Advance {
        let Some(session) = self.store.get(user_id, now).cloned() else {
            return Advance::NotInFlow;
        };

        if is_cancel(raw_input) {
            self.store.remove(user_id);
            return Advance::Cancelled;
        }

        let step = session.current_step;
        let transition = match transition(step, raw_input, &self.courses) {
            Ok(transition) => transition,
            Err(reason) => {
                debug!(user_id = user_id.0, ?step, %reason, "conversation: input rejected");
                return Advance::Rejected { step, reason };
            }
        };

        let mut next = session;
        for (name, value) in transition.fields {
            next.collected_fields.insert(name, value);
        }
        next.updated_at = now;

        match transition.next {
            Next::Step(next_step) => {
                next.current_step = next_step;
                let prompt = prompt_for(&next, &self.courses);
                self.store.put(next);
                Advance::Advanced(prompt)
            }
            Next::Complete => {
                self.store.remove(user_id);
                match build_event(user_id, next.flow(), &next.collected_fields) {
                    Ok(event) => {
                        info!(
                            user_id = user_id.0,
                            event_id = %event.event_id,
                            event_type = %event.event_type(),
                            "conversation: flow completed"
                        );
                        Advance::Completed(event)
                    }
                    Err(err) => {
                        error!(user_id = user_id.0, %err, "conversation: completed flow could not be built");
                        Advance::Failed(err)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/machine_tests.rs"]
mod tests;
