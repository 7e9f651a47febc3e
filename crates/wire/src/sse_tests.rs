// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pf_core::{HubEvent, JobId};

#[test]
fn frames_encode_as_sse_wire_text() {
    let frame = SseFrame::new("heartbeat", r#"{"status":"alive"}"#);
    assert_eq!(frame.encode(), "event: heartbeat\ndata: {\"status\":\"alive\"}\n\n");
}

#[test]
fn record_frames_carry_name_and_full_body() {
    let record = EventRecord::new(
        JobId::from_string("job-sse"),
        1234,
        HubEvent::PosterCompleted {
            identifier: "ada".into(),
            artifact_url: "https://cdn/a.png".into(),
            success: true,
            error: None,
        },
    );
    let frame = SseFrame::from_record(&record);
    assert_eq!(frame.event, "poster_completed");

    let body: serde_json::Value = serde_json::from_str(&frame.data).unwrap();
    assert_eq!(body["event"], "poster_completed");
    assert_eq!(body["job_id"], "job-sse");
    assert_eq!(body["timestamp_ms"], 1234);
    assert_eq!(body["identifier"], "ada");
}
