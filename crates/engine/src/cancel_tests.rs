// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{row, TestContext};
use pf_bus::TOPIC_ERRORS;
use pf_core::{Dimensions, HubEvent, JobParams, JobState};

async fn queued_job(context: &TestContext) -> JobId {
    context
        .dispatcher()
        .submit_by_row(
            "cancel-campaign",
            vec![row(&[("name", "Ada")])],
            vec!["name".into()],
            "<p>{name}</p>",
            Dimensions::new(100, 50),
            JobParams::default(),
            serde_json::Map::new(),
        )
        .await
        .unwrap()
        .job_id
}

#[tokio::test]
async fn cancelling_a_queued_job_emits_job_failed() {
    let context = TestContext::new();
    let job_id = queued_job(&context).await;
    let sub = context.hub.subscribe(&job_id);

    let response = cancel_job(&context.runtime, &job_id).await.unwrap();
    assert!(response.success);
    assert_eq!(response.message, "job cancelled (was queued)");

    let job = context.runtime.store().get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Cancelled);
    assert_eq!(job.error_message.as_deref(), Some("cancelled by user"));
    assert!(job.completed_at_ms.is_some());

    // The terminal event for a cancelled job is job_failed
    let event = loop {
        let record = sub.next().await.unwrap();
        if record.body.is_terminal() {
            break record;
        }
    };
    match event.body {
        HubEvent::JobFailed { error, .. } => assert_eq!(error, "cancelled by user"),
        other => panic!("unexpected terminal event: {other:?}"),
    }
    assert_eq!(context.bus.on_topic(TOPIC_ERRORS).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_terminal_job_is_a_no_op() {
    let context = TestContext::new();
    let job_id = queued_job(&context).await;
    let envelope = context.bus.requests().remove(0);
    crate::worker::Worker::new(context.runtime.clone())
        .handle_envelope(&envelope)
        .await
        .unwrap();

    let sub = context.hub.subscribe(&job_id);
    let response = cancel_job(&context.runtime, &job_id).await.unwrap();
    assert!(response.success);
    assert_eq!(response.message, "already terminal");

    // State and events are untouched
    let job = context.runtime.store().get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert!(context.bus.on_topic(TOPIC_ERRORS).is_empty());
    sub.cancel();
    assert!(sub.next().await.is_none());
}

#[tokio::test]
async fn cancelling_an_unknown_job_reports_failure() {
    let context = TestContext::new();
    let response = cancel_job(&context.runtime, &JobId::new()).await.unwrap();
    assert!(!response.success);
    assert_eq!(response.message, "job not found");
}
