use chrono::{NaiveDate, TimeZone};
use serde_json::json;
use uuid::Uuid;

use super::*;

fn project_fields() -> CollectedFields {
    let mut collected = CollectedFields::default();
    collected.insert(
        fields::DEADLINE,
        FieldValue::Date(NaiveDate::from_ymd_opt(2026, 12, 31).unwrap()),
    );
    collected.insert(fields::TITLE, FieldValue::Text("Algo HW".into()));
    collected.insert(fields::TYPE, FieldValue::Text("personal".into()));
    collected.insert(fields::COURSE_ID, FieldValue::Null);
    collected.insert(fields::COURSE_NAME, FieldValue::Null);
    collected.insert(fields::PRIORITY, FieldValue::Text("high".into()));
    collected.insert(fields::DESCRIPTION, FieldValue::Text(String::new()));
    collected
}

#[test]
fn stamps_identity_and_chat_source() {
    let event_id = EventId(Uuid::from_u128(1));
    let timestamp = Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap();
    let event = build_event_with(
        UserId(42),
        Flow::ProjectCreation,
        &project_fields(),
        event_id,
        timestamp,
    )
    .unwrap();

    assert_eq!(event.event_id, event_id);
    assert_eq!(event.origin_user_id, UserId(42));
    assert_eq!(event.timestamp, timestamp);
    assert_eq!(event.source, EventSource::Chat);
    assert_eq!(
        event.payload.to_json(),
        json!({
            "title": "Algo HW",
            "deadline": "2026-12-31",
            "priority": "high",
            "type": "personal",
            "courseId": null,
            "courseName": null,
            "description": ""
        })
    );
}

#[test]
fn fresh_events_get_distinct_ids() {
    let first = build_event(UserId(1), Flow::ProjectCreation, &project_fields()).unwrap();
    let second = build_event(UserId(1), Flow::ProjectCreation, &project_fields()).unwrap();
    assert_ne!(first.event_id, second.event_id);
}

#[test]
fn missing_field_is_reported_by_name() {
    let mut collected = CollectedFields::default();
    collected.insert(fields::TITLE, FieldValue::Text("Algo HW".into()));
    assert_eq!(
        build_event(UserId(1), Flow::ProjectCreation, &collected),
        Err(BuildError::MissingField(fields::DEADLINE))
    );
}

#[test]
fn course_fields_must_be_present_even_when_null() {
    let mut collected = project_fields();
    let mut without_course = CollectedFields::default();
    for (name, value) in collected.iter() {
        if name != fields::COURSE_ID {
            without_course.insert(name, value.clone());
        }
    }
    assert_eq!(
        build_event(UserId(1), Flow::ProjectCreation, &without_course),
        Err(BuildError::MissingField(fields::COURSE_ID))
    );

    collected.insert(fields::PRIORITY, FieldValue::Integer(3));
    assert_eq!(
        build_event(UserId(1), Flow::ProjectCreation, &collected),
        Err(BuildError::InvalidField(fields::PRIORITY))
    );
}

#[test]
fn builds_progress_payload() {
    let project_id = Uuid::from_u128(7);
    let mut collected = CollectedFields::default();
    collected.insert(fields::PROJECT_ID, FieldValue::Text(project_id.to_string()));
    collected.insert(fields::PROJECT_TITLE, FieldValue::Text("Algo HW".into()));
    collected.insert(fields::STATUS, FieldValue::Text("in_progress".into()));
    collected.insert(fields::DURATION_MINUTES, FieldValue::Integer(90));
    collected.insert(fields::PROGRESS, FieldValue::Integer(40));
    collected.insert(fields::NOTE, FieldValue::Text("chapter 2".into()));

    let event = build_event(UserId(3), Flow::ProgressLogging, &collected).unwrap();
    assert_eq!(
        event.payload.to_json(),
        json!({
            "projectId": project_id.to_string(),
            "status": "in_progress",
            "durationMinutes": 90,
            "progress": 40,
            "note": "chapter 2"
        })
    );
}

#[test]
fn out_of_range_integers_are_invalid() {
    let mut collected = CollectedFields::default();
    collected.insert(fields::PROJECT_ID, FieldValue::Text(Uuid::from_u128(7).to_string()));
    collected.insert(fields::STATUS, FieldValue::Text("blocked".into()));
    collected.insert(fields::DURATION_MINUTES, FieldValue::Integer(30));
    collected.insert(fields::PROGRESS, FieldValue::Integer(300));
    collected.insert(fields::NOTE, FieldValue::Text("stuck".into()));
    assert_eq!(
        build_event(UserId(3), Flow::ProgressLogging, &collected),
        Err(BuildError::InvalidField(fields::PROGRESS))
    );
}
