use super::*;
use serde_json::json;

fn sample(status: &str) -> serde_json::Value {
    json!({
        "id": "job-1",
        "status": status,
        "progress": 40,
        "result": null,
        "error": null,
        "createdAt": "2026-03-01T10:00:00Z",
        "finishedAt": null
    })
}

#[test]
fn terminal_states_are_completed_and_failed() {
    assert!(JobState::Completed.is_terminal());
    assert!(JobState::Failed.is_terminal());
    assert!(!JobState::Waiting.is_terminal());
    assert!(!JobState::Active.is_terminal());
    assert!(!JobState::Delayed.is_terminal());
}

#[test]
fn parses_graphql_job_status() {
    let job: JobStatus = serde_json::from_value(sample("active")).unwrap();
    assert_eq!(job.id, "job-1");
    assert_eq!(job.status, JobState::Active);
    assert!((job.progress - 40.0).abs() < f64::EPSILON);
    assert!(job.result.is_none());
    assert!(job.error.is_none());
    assert_eq!(job.created_at.map(OffsetDateTime::unix_timestamp), Some(1_772_359_200));
    assert!(job.finished_at.is_none());
}

#[test]
fn unknown_state_is_rejected() {
    let err = serde_json::from_value::<JobStatus>(sample("paused")).unwrap_err();
    assert!(err.to_string().contains("unknown variant"));
}

#[test]
fn missing_optional_fields_default() {
    let job: JobStatus = serde_json::from_value(json!({ "id": "j", "status": "waiting" })).unwrap();
    assert!(job.progress.abs() < f64::EPSILON);
    assert!(job.created_at.is_none());
}

#[test]
fn null_progress_defaults_to_zero() {
    let job: JobStatus = serde_json::from_value(json!({ "id": "j", "status": "waiting", "progress": null })).unwrap();
    assert!(job.progress.abs() < f64::EPSILON);
}

#[test]
fn epoch_millis_timestamps_are_accepted() {
    let job: JobStatus = serde_json::from_value(json!({
        "id": "j",
        "status": "completed",
        "createdAt": 1_700_000_000_000_i64,
        "finishedAt": "1700000005000"
    }))
    .unwrap();
    assert_eq!(job.created_at.map(OffsetDateTime::unix_timestamp), Some(1_700_000_000));
    assert_eq!(job.finished_at.map(OffsetDateTime::unix_timestamp), Some(1_700_000_005));
}

#[test]
fn timestamps_serialize_as_rfc3339() {
    let job: JobStatus = serde_json::from_value(json!({
        "id": "j",
        "status": "completed",
        "createdAt": 0
    }))
    .unwrap();
    let value = serde_json::to_value(&job).unwrap();
    assert_eq!(value["createdAt"], "1970-01-01T00:00:00Z");
    assert!(value.get("finishedAt").is_none());
    assert_eq!(value["status"], "completed");
}

#[test]
fn garbage_timestamp_is_an_error() {
    let result = serde_json::from_value::<JobStatus>(json!({
        "id": "j",
        "status": "completed",
        "createdAt": "yesterday"
    }));
    assert!(result.is_err());
}

#[test]
fn decoded_result_unpacks_json_strings() {
    let mut job: JobStatus = serde_json::from_value(sample("completed")).unwrap();
    job.result = Some(json!("{\"caption\":\"hello\",\"hashtags\":[\"a\"]}"));
    assert_eq!(job.decoded_result(), Some(json!({ "caption": "hello", "hashtags": ["a"] })));
}

#[test]
fn decoded_result_keeps_plain_strings_and_objects() {
    let mut job: JobStatus = serde_json::from_value(sample("completed")).unwrap();
    job.result = Some(json!("just text"));
    assert_eq!(job.decoded_result(), Some(json!("just text")));

    job.result = Some(json!({ "ok": true }));
    assert_eq!(job.decoded_result(), Some(json!({ "ok": true })));

    job.result = None;
    assert_eq!(job.decoded_result(), None);
}

#[test]
fn result_as_deserializes_typed_payload() {
    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Caption {
        caption: String,
    }

    let mut job: JobStatus = serde_json::from_value(sample("completed")).unwrap();
    job.result = Some(json!("{\"caption\":\"hi\"}"));
    let typed: Option<Caption> = job.result_as().unwrap();
    assert_eq!(typed, Some(Caption { caption: "hi".into() }));

    job.result = Some(json!(42));
    assert!(job.result_as::<Caption>().is_err());
}

#[test]
fn failure_message_falls_back_to_generic() {
    let mut job: JobStatus = serde_json::from_value(sample("failed")).unwrap();
    assert_eq!(job.failure_message(), GENERIC_FAILURE_MESSAGE);

    job.error = Some("   ".into());
    assert_eq!(job.failure_message(), GENERIC_FAILURE_MESSAGE);

    job.error = Some("quota exceeded".into());
    assert_eq!(job.failure_message(), "quota exceeded");
}

#[test]
fn state_display_matches_wire_name() {
    assert_eq!(JobState::Delayed.to_string(), "delayed");
    assert_eq!(serde_json::to_value(JobState::Active).unwrap(), json!("active"));
}
