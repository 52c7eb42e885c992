//! Conversational side of the sync engine: turns one-message-at-a-time chat
//! input into well-formed [`shared::event::Event`]s.

pub mod builder;
pub mod command;
pub mod duration;
mod flow;
pub mod machine;
pub mod session;
pub mod validate;

pub use builder::{build_event, build_event_with, BuildError};
pub use command::{parse_command, ChatCommand};
pub use flow::{prompt_for, Prompt};
pub use machine::{Advance, SessionStateMachine};
pub use session::{
    CollectedFields, FieldValue, Flow, ProgressStep, ProjectStep, SessionState, SessionStep,
    SessionStore,
};
pub use validate::Rejection;
