// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::job::JobId;

#[test]
fn events_serialize_with_event_tag() {
    let record = EventRecord::new(
        JobId::from_string("job-evt"),
        1_000,
        HubEvent::PosterCompleted {
            identifier: "ada".into(),
            artifact_url: "https://cdn/p.png".into(),
            success: true,
            error: None,
        },
    );

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["event"], "poster_completed");
    assert_eq!(json["job_id"], "job-evt");
    assert_eq!(json["identifier"], "ada");
    // Absent optional fields are omitted entirely
    assert!(json.get("error").is_none());
}

#[test]
fn events_roundtrip_through_serde() {
    let record = EventRecord::new(
        JobId::from_string("job-rt"),
        2_000,
        HubEvent::progress(
            &JobCounters { total: 10, processed: 3, success: 2, failure: 1 },
            Some("ada".into()),
            "processing",
        ),
    );
    let json = serde_json::to_string(&record).unwrap();
    let parsed: EventRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, record);
}

#[yare::parameterized(
    connected        = { HubEvent::Connected { message: "hi".into() }, "connected", false, false },
    heartbeat        = { HubEvent::heartbeat(), "heartbeat", false, true },
    progress         = { HubEvent::progress(&JobCounters::new(1), None, "starting"), "progress", false, true },
    job_completed    = { HubEvent::JobCompleted { success_count: 1, failure_count: 0, total_time_ms: 5, results: vec![] }, "job_completed", true, false },
    job_failed       = { HubEvent::JobFailed { error: "boom".into(), details: Default::default() }, "job_failed", true, false },
)]
fn event_classification(event: HubEvent, name: &str, terminal: bool, coalescing: bool) {
    assert_eq!(event.name(), name);
    assert_eq!(event.is_terminal(), terminal);
    assert_eq!(event.is_coalescing(), coalescing);
}

#[test]
fn progress_builder_computes_percent() {
    let event = HubEvent::progress(
        &JobCounters { total: 3, processed: 1, success: 1, failure: 0 },
        None,
        "processing",
    );
    match event {
        HubEvent::Progress { percent_complete, processed, total, .. } => {
            assert_eq!(processed, 1);
            assert_eq!(total, 3);
            assert_eq!(percent_complete, 33.3);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn status_builder_reflects_counters() {
    let event = HubEvent::status(
        crate::job::JobState::Processing,
        &JobCounters { total: 5, processed: 5, success: 4, failure: 1 },
    );
    match event {
        HubEvent::Status { state, processed, success_count, failure_count, .. } => {
            assert_eq!(state, crate::job::JobState::Processing);
            assert_eq!(processed, 5);
            assert_eq!(success_count, 4);
            assert_eq!(failure_count, 1);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
