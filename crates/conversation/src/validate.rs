//! Per-step input validators. Every validator is pure; a failure is a
//! [`Rejection`] whose `Display` text is shown to the user as-is.

use chrono::NaiveDate;
use shared::domain::CourseOption;
use thiserror::Error;

pub const SKIP_SENTINEL: &str = "/skip";
pub const CANCEL_SENTINEL: &str = "/cancel";
pub const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Please send the deadline as YYYY-MM-DD, for example 2026-12-31.")]
    InvalidDate,
    #[error("The title cannot be empty.")]
    EmptyTitle,
    #[error("The title cannot start with '/'.")]
    CommandAsTitle,
    #[error("The title is too long (at most {max} characters).")]
    TitleTooLong { max: usize },
    #[error("'{input}' is not one of the options: {options}.")]
    UnknownChoice { input: String, options: String },
    #[error("There are no courses to choose from. Send /cancel and pick another project type.")]
    NoCourses,
    #[error("Please send a duration such as 1h 30m, 45m or 45.")]
    InvalidDuration,
    #[error("The duration must be between 1 minute and 24 hours.")]
    DurationOutOfRange,
    #[error("Please send a whole number between 0 and 100.")]
    InvalidProgress,
    #[error("A note is required for a progress log.")]
    NoteRequired,
}

/// Strict `YYYY-MM-DD`: zero-padded and a real calendar date.
pub fn parse_deadline(raw: &str) -> Result<NaiveDate, Rejection> {
    let input = raw.trim();
    let bytes = input.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes.iter().enumerate().all(|(index, byte)| match index {
            4 | 7 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        });
    if !well_formed {
        return Err(Rejection::InvalidDate);
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| Rejection::InvalidDate)
}

pub fn parse_title(raw: &str) -> Result<String, Rejection> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(Rejection::EmptyTitle);
    }
    if title.starts_with('/') {
        return Err(Rejection::CommandAsTitle);
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(Rejection::TitleTooLong {
            max: MAX_TITLE_CHARS,
        });
    }
    Ok(title.to_string())
}

/// Picks one of `options` by 1-based number, by value or by label
/// (both case-insensitive).
pub fn choose<T: Copy>(raw: &str, options: &[(T, &str, &str)]) -> Result<T, Rejection> {
    let input = raw.trim();
    if let Ok(number) = input.parse::<usize>() {
        if let Some((value, _, _)) = number.checked_sub(1).and_then(|index| options.get(index)) {
            return Ok(*value);
        }
    }
    options
        .iter()
        .find(|(_, value, label)| value.eq_ignore_ascii_case(input) || label.eq_ignore_ascii_case(input))
        .map(|(value, _, _)| *value)
        .ok_or_else(|| Rejection::UnknownChoice {
            input: input.to_string(),
            options: options
                .iter()
                .map(|(_, _, label)| *label)
                .collect::<Vec<_>>()
                .join(", "),
        })
}

pub fn choose_course<'a>(raw: &str, courses: &'a [CourseOption]) -> Result<&'a CourseOption, Rejection> {
    if courses.is_empty() {
        return Err(Rejection::NoCourses);
    }
    let input = raw.trim();
    if let Ok(number) = input.parse::<usize>() {
        if let Some(course) = number.checked_sub(1).and_then(|index| courses.get(index)) {
            return Ok(course);
        }
    }
    courses
        .iter()
        .find(|course| {
            course.course_id.eq_ignore_ascii_case(input) || course.name.eq_ignore_ascii_case(input)
        })
        .ok_or_else(|| Rejection::UnknownChoice {
            input: input.to_string(),
            options: courses
                .iter()
                .map(|course| course.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// Whole percent in `0..=100`; a trailing `%` is accepted.
pub fn parse_progress(raw: &str) -> Result<u8, Rejection> {
    let input = raw.trim();
    let digits = input.strip_suffix('%').unwrap_or(input).trim_end();
    match digits.parse::<u8>() {
        Ok(value) if value <= 100 => Ok(value),
        _ => Err(Rejection::InvalidProgress),
    }
}

/// Free text where the skip sentinel (or nothing at all) means "no text".
pub fn parse_optional_note(raw: &str) -> String {
    let note = raw.trim();
    if note.eq_ignore_ascii_case(SKIP_SENTINEL) {
        return String::new();
    }
    note.to_string()
}

pub fn parse_required_note(raw: &str) -> Result<String, Rejection> {
    let note = raw.trim();
    if note.is_empty() || note.eq_ignore_ascii_case(SKIP_SENTINEL) {
        return Err(Rejection::NoteRequired);
    }
    Ok(note.to_string())
}

pub fn is_cancel(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case(CANCEL_SENTINEL)
}

#[cfg(test)]
#[path = "tests/validate_tests.rs"]
mod tests;
