// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{row, TestContext};
use crate::EngineError;
use pf_core::{ArtifactExport, Identifier, JobKind, JobPayload};

fn dims() -> Dimensions {
    Dimensions::new(1080, 1080)
}

#[tokio::test]
async fn degenerate_identifier_lists_are_rejected() {
    for input in ["", "   \n ", ", ,\n,"] {
        let context = TestContext::new();
        let err = context
            .dispatcher()
            .submit_by_identifier("c", input, "<p>{name}</p>", dims(), JobParams::default(), Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyJob), "accepted {input:?}");
        // No job row was created
        assert!(context.store.list_jobs(None, 10, 0).await.unwrap().is_empty());
        assert!(context.bus.requests().is_empty());
    }
}

#[tokio::test]
async fn identifier_submission_dedups_and_queues_one_envelope() {
    let context = TestContext::new();
    let ticket = context
        .dispatcher()
        .submit_by_identifier(
            "spring-launch",
            "ada, 42\nada, 42, grace",
            "<h1>{display_name}</h1>",
            dims(),
            JobParams::default(),
            Map::new(),
        )
        .await
        .unwrap();

    assert_eq!(ticket.state, JobState::Queued);
    assert_eq!(ticket.total, 3);
    assert_eq!(ticket.stream_endpoint, format!("/api/batch/jobs/{}/stream", ticket.job_id));

    let job = context.store.get_job(&ticket.job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Queued);
    assert_eq!(job.kind, JobKind::ByIdentifier);
    assert_eq!(job.campaign_name, "spring-launch");

    let requests = context.bus.requests();
    assert_eq!(requests.len(), 1);
    match &requests[0].payload {
        JobPayload::ByIdentifier { identifiers } => assert_eq!(
            identifiers,
            &vec![
                Identifier::Username("ada".into()),
                Identifier::UserId(42),
                Identifier::Username("grace".into()),
            ]
        ),
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn publish_failure_leaves_the_job_pending() {
    let context = TestContext::new();
    context.bus.fail_publishes(true);

    let err = context
        .dispatcher()
        .submit_by_row(
            "c",
            vec![row(&[("name", "Ada")])],
            vec!["name".into()],
            "<p>{name}</p>",
            dims(),
            JobParams::default(),
            Map::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Bus(_)));

    // The row survives in pending; re-submission is allowed
    let jobs = context.store.list_jobs(Some(JobState::Pending), 10, 0).await.unwrap();
    assert_eq!(jobs.len(), 1);
}

#[tokio::test]
async fn legacy_tokens_are_normalized_at_ingress() {
    let context = TestContext::new();
    let ticket = context
        .dispatcher()
        .submit_by_row(
            "c",
            vec![row(&[("name", "Ada")])],
            vec!["name".into()],
            "<h1>{{name}} / {{ stats.count }}</h1>",
            dims(),
            JobParams::default(),
            Map::new(),
        )
        .await
        .unwrap();

    let job = context.store.get_job(&ticket.job_id).await.unwrap().unwrap();
    assert_eq!(job.template, "<h1>{name} / {stats.count}</h1>");
    assert_eq!(context.bus.requests()[0].template, "<h1>{name} / {stats.count}</h1>");
}

#[tokio::test]
async fn template_generation_is_a_single_item_job() {
    let context = TestContext::new();
    let ticket = context
        .dispatcher()
        .submit_template_generation(
            "testimonial_latest",
            "<div>{quote}</div>",
            Dimensions::new(1080, 1350),
            row(&[("quote", "it works"), ("entity_id", "t-99")]),
            Map::new(),
        )
        .await
        .unwrap();

    assert_eq!(ticket.total, 1);
    let job = context.store.get_job(&ticket.job_id).await.unwrap().unwrap();
    assert_eq!(job.kind, JobKind::ByTemplateParam);
    assert_eq!(job.counters.total, 1);
}

#[tokio::test]
async fn export_submission_requires_artifacts() {
    let context = TestContext::new();
    let err = context
        .dispatcher()
        .submit_export("c", vec![], Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EmptyJob));

    let ticket = context
        .dispatcher()
        .submit_export(
            "c",
            vec![ArtifactExport {
                identifier: "ada".into(),
                user_id: Some(1),
                artifact_url: "https://cdn/a.png".into(),
            }],
            Map::new(),
        )
        .await
        .unwrap();
    let job = context.store.get_job(&ticket.job_id).await.unwrap().unwrap();
    assert_eq!(job.kind, JobKind::Export);
}
