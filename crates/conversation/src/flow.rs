//! The two flow graphs. `transition` is a pure function of the current step,
//! the raw input and the course catalog; the machine applies its result.

use shared::domain::{CourseOption, Priority, ProgressStatus, ProjectType};

use crate::{
    duration::parse_duration_minutes,
    session::{fields, FieldValue, ProgressStep, ProjectStep, SessionState, SessionStep},
    validate::{
        choose, choose_course, parse_deadline, parse_optional_note, parse_progress,
        parse_required_note, parse_title, Rejection,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub options: Vec<String>,
}

impl Prompt {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: Vec::new(),
        }
    }

    fn choice(text: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            text: text.into(),
            options,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Next {
    Step(SessionStep),
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Transition {
    pub(crate) next: Next,
    pub(crate) fields: Vec<(&'static str, FieldValue)>,
}

impl Transition {
    fn to(step: SessionStep, fields: Vec<(&'static str, FieldValue)>) -> Self {
        Self {
            next: Next::Step(step),
            fields,
        }
    }

    fn complete(fields: Vec<(&'static str, FieldValue)>) -> Self {
        Self {
            next: Next::Complete,
            fields,
        }
    }
}

fn project_type_options() -> Vec<(ProjectType, &'static str, &'static str)> {
    ProjectType::ALL
        .into_iter()
        .map(|kind| (kind, kind.as_str(), kind.label()))
        .collect()
}

fn priority_options() -> Vec<(Priority, &'static str, &'static str)> {
    Priority::ALL
        .into_iter()
        .map(|priority| (priority, priority.as_str(), priority.label()))
        .collect()
}

fn status_options() -> Vec<(ProgressStatus, &'static str, &'static str)> {
    ProgressStatus::ALL
        .into_iter()
        .map(|status| (status, status.as_str(), status.label()))
        .collect()
}

fn text(value: impl Into<String>) -> FieldValue {
    FieldValue::Text(value.into())
}

pub(crate) fn transition(
    step: SessionStep,
    raw: &str,
    courses: &[CourseOption],
) -> Result<Transition, Rejection> {
    match step {
        SessionStep::Project(step) => project_transition(step, raw, courses),
        SessionStep::Progress(step) => progress_transition(step, raw),
    }
}

fn project_transition(
    step: ProjectStep,
    raw: &str,
    courses: &[CourseOption],
) -> Result<Transition, Rejection> {
    use ProjectStep::*;

    let to = |next: ProjectStep, merged| Transition::to(SessionStep::Project(next), merged);
    match step {
        AwaitingDeadline => {
            let deadline = parse_deadline(raw)?;
            Ok(to(
                AwaitingTitle,
                vec![(fields::DEADLINE, FieldValue::Date(deadline))],
            ))
        }
        AwaitingTitle => {
            let title = parse_title(raw)?;
            Ok(to(AwaitingType, vec![(fields::TITLE, text(title))]))
        }
        AwaitingType => {
            let kind = choose(raw, &project_type_options())?;
            let chosen = (fields::TYPE, text(kind.as_str()));
            if kind == ProjectType::Course {
                return Ok(to(AwaitingCourse, vec![chosen]));
            }
            Ok(to(
                AwaitingPriority,
                vec![
                    chosen,
                    (fields::COURSE_ID, FieldValue::Null),
                    (fields::COURSE_NAME, FieldValue::Null),
                ],
            ))
        }
        AwaitingCourse => {
            let course = choose_course(raw, courses)?;
            Ok(to(
                AwaitingPriority,
                vec![
                    (fields::COURSE_ID, text(course.course_id.clone())),
                    (fields::COURSE_NAME, text(course.name.clone())),
                ],
            ))
        }
        AwaitingPriority => {
            let priority = choose(raw, &priority_options())?;
            Ok(to(
                AwaitingNote,
                vec![(fields::PRIORITY, text(priority.as_str()))],
            ))
        }
        AwaitingNote => Ok(Transition::complete(vec![(
            fields::DESCRIPTION,
            text(parse_optional_note(raw)),
        )])),
    }
}

fn progress_transition(step: ProgressStep, raw: &str) -> Result<Transition, Rejection> {
    use ProgressStep::*;

    let to = |next: ProgressStep, merged| Transition::to(SessionStep::Progress(next), merged);
    match step {
        AwaitingStatus => {
            let status = choose(raw, &status_options())?;
            Ok(to(
                AwaitingDuration,
                vec![(fields::STATUS, text(status.as_str()))],
            ))
        }
        AwaitingDuration => {
            let minutes = parse_duration_minutes(raw)?;
            Ok(to(
                AwaitingProgress,
                vec![(fields::DURATION_MINUTES, FieldValue::Integer(i64::from(minutes)))],
            ))
        }
        AwaitingProgress => {
            let progress = parse_progress(raw)?;
            Ok(to(
                AwaitingNote,
                vec![(fields::PROGRESS, FieldValue::Integer(i64::from(progress)))],
            ))
        }
        AwaitingNote => {
            let note = parse_required_note(raw)?;
            Ok(Transition::complete(vec![(fields::NOTE, text(note))]))
        }
    }
}

/// The question to ask for the session's current step.
pub fn prompt_for(session: &SessionState, courses: &[CourseOption]) -> Prompt {
    match session.current_step {
        SessionStep::Project(step) => match step {
            ProjectStep::AwaitingDeadline => {
                Prompt::text("New project. What is the deadline? (YYYY-MM-DD)")
            }
            ProjectStep::AwaitingTitle => Prompt::text("What is the project title?"),
            ProjectStep::AwaitingType => Prompt::choice(
                "What kind of project is it?",
                ProjectType::ALL
                    .into_iter()
                    .map(|kind| kind.label().to_string())
                    .collect(),
            ),
            ProjectStep::AwaitingCourse => Prompt::choice(
                "Which course is it for?",
                courses.iter().map(|course| course.name.clone()).collect(),
            ),
            ProjectStep::AwaitingPriority => Prompt::choice(
                "Which priority?",
                Priority::ALL
                    .into_iter()
                    .map(|priority| priority.label().to_string())
                    .collect(),
            ),
            ProjectStep::AwaitingNote => {
                Prompt::text("Add a description, or send /skip to leave it empty.")
            }
        },
        SessionStep::Progress(step) => match step {
            ProgressStep::AwaitingStatus => {
                let title = match session.collected_fields.get(fields::PROJECT_TITLE) {
                    Some(FieldValue::Text(title)) => title.as_str(),
                    _ => "this project",
                };
                Prompt::choice(
                    format!("Logging progress for {title}. What is the status?"),
                    ProgressStatus::ALL
                        .into_iter()
                        .map(|status| status.label().to_string())
                        .collect(),
                )
            }
            ProgressStep::AwaitingDuration => {
                Prompt::text("How long did you work? (e.g. 1h 30m, or minutes)")
            }
            ProgressStep::AwaitingProgress => {
                Prompt::text("How far along is the project now? (0-100)")
            }
            ProgressStep::AwaitingNote => Prompt::text("Add a short note about this session."),
        },
    }
}
