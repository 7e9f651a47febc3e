// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{collect_until_terminal, event_names, progress_values, row, TestContext};
use pf_adapters::fakes::{FakeRasterizer, TIMEOUT_MARKER};
use pf_adapters::{Rasterizer, RasterizeError};
use pf_bus::{TOPIC_ERRORS, TOPIC_RESULTS};
use pf_core::{
    CompletionPolicy, Dimensions, FailureKind, JobKind, JobParams, Settings,
};
use pf_storage::Store;
use serde_json::Map;
use std::sync::atomic::{AtomicUsize, Ordering};

fn rows_named(names: &[&str]) -> Vec<RowData> {
    names.iter().map(|name| row(&[("name", name)])).collect()
}

async fn submit_rows(
    context: &TestContext,
    rows: Vec<RowData>,
    template: &str,
) -> (pf_core::JobId, JobEnvelope) {
    let ticket = context
        .dispatcher()
        .submit_by_row(
            "test-campaign",
            rows,
            vec!["name".to_string()],
            template,
            Dimensions::new(100, 50),
            JobParams::default(),
            Map::new(),
        )
        .await
        .unwrap();
    let envelope = context.bus.requests().remove(0);
    (ticket.job_id, envelope)
}

#[tokio::test(start_paused = true)]
async fn single_row_job_runs_end_to_end() {
    let context = TestContext::new();
    let (job_id, envelope) =
        submit_rows(&context, rows_named(&["Ada"]), "<h1>Hello {name}</h1>").await;
    let sub = context.hub.subscribe(&job_id);

    context.worker().handle_envelope(&envelope).await.unwrap();

    let job = context.store.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(
        (job.counters.total, job.counters.processed, job.counters.success, job.counters.failure),
        (1, 1, 1, 0)
    );
    assert!(job.completed_at_ms.is_some());

    let items = context.store.get_items(&job_id).await.unwrap();
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.status, ItemStatus::Completed);
    let key = item.artifact_key.clone().unwrap();
    assert!(key.starts_with(&format!("jobs/{job_id}/Ada_")), "unexpected key {key}");
    assert_eq!(item.artifact_url.as_deref(), Some(format!("mem://{key}").as_str()));

    // The stored artifact is a real PNG at exactly the requested size
    let png = context.blobs.get(&key).unwrap();
    let decoded = image::load_from_memory(&png).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (100, 50));

    let events = collect_until_terminal(&sub).await;
    assert_eq!(
        event_names(&events),
        vec!["progress", "progress", "poster_completed", "job_completed"]
    );
    assert_eq!(progress_values(&events), vec![0, 1]);
    match &events[0].body {
        HubEvent::Progress { phase, .. } => assert_eq!(phase, "starting"),
        other => panic!("unexpected first event: {other:?}"),
    }
    match &events.last().unwrap().body {
        HubEvent::JobCompleted { success_count, failure_count, results, .. } => {
            assert_eq!((*success_count, *failure_count), (1, 0));
            assert_eq!(results.len(), 1);
            assert!(results[0].success);
        }
        other => panic!("unexpected terminal event: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn timeouts_fail_items_but_not_the_job() {
    let context = TestContext::new();
    let mut rows = rows_named(&[
        "u01", "u02", "u03", "u04", "u05", "u06", "u07", "u08", "u09", "u10", "u11", "u12",
        "u13", "u14", "u15", "u16", "u17",
    ]);
    for name in ["slow1", "slow2", "slow3"] {
        rows.push(row(&[("name", name), ("note", TIMEOUT_MARKER)]));
    }
    let (job_id, envelope) = submit_rows(&context, rows, "<p>{name} {note}</p>").await;

    context.worker().handle_envelope(&envelope).await.unwrap();

    let job = context.store.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(
        (job.counters.total, job.counters.processed, job.counters.success, job.counters.failure),
        (20, 20, 17, 3)
    );

    let failures = context.store.get_failures(&job_id).await.unwrap();
    assert_eq!(failures.len(), 3);
    assert!(failures.iter().all(|f| f.kind == FailureKind::Timeout));
    // Row-mode failures snapshot the template for post-mortems
    assert!(failures.iter().all(|f| f.template_snapshot.is_some()));
}

#[tokio::test(start_paused = true)]
async fn profile_fetch_failures_count_against_the_item() {
    let context = TestContext::new();
    for (user_id, username) in [(1, "ada"), (2, "grace"), (3, "alan"), (4, "barbara")] {
        context.profiles.insert(pf_adapters::Profile {
            user_id: Some(user_id),
            username: username.to_string(),
            display_name: format!("{username} display"),
            ..pf_adapters::Profile::default()
        });
    }

    let ticket = context
        .dispatcher()
        .submit_by_identifier(
            "id-campaign",
            "ada, grace, alan, barbara, missing",
            "<h1>{display_name}</h1>",
            Dimensions::new(100, 50),
            JobParams::default(),
            Map::new(),
        )
        .await
        .unwrap();
    let envelope = context.bus.requests().remove(0);

    context.worker().handle_envelope(&envelope).await.unwrap();

    let job = context.store.get_job(&ticket.job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!((job.counters.success, job.counters.failure), (4, 1));

    let failures = context.store.get_failures(&ticket.job_id).await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, FailureKind::ProfileFetch);
    assert_eq!(failures[0].identifier, "missing");

    let items = context.store.get_items(&ticket.job_id).await.unwrap();
    let ada = items.iter().find(|i| i.input_identifier == "ada").unwrap();
    assert_eq!(ada.display_name.as_deref(), Some("ada display"));
    // The resolved user id is persisted for the export job
    assert_eq!(ada.metadata.get("user_id").and_then(|v| v.as_i64()), Some(1));
}

#[tokio::test(start_paused = true)]
async fn redelivered_envelope_changes_nothing() {
    let context = TestContext::new();
    let names: Vec<String> = (0..10).map(|i| format!("user{i}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let (job_id, envelope) = submit_rows(&context, rows_named(&name_refs), "<p>{name}</p>").await;

    context.worker().handle_envelope(&envelope).await.unwrap();
    let job_before = context.store.get_job(&job_id).await.unwrap().unwrap();
    let items_before = context.store.get_items(&job_id).await.unwrap();

    // Redelivery: the terminal job short-circuits, nothing mutates
    let sub = context.hub.subscribe(&job_id);
    context.worker().handle_envelope(&envelope).await.unwrap();

    let job_after = context.store.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job_after.counters, job_before.counters);
    let items_after = context.store.get_items(&job_id).await.unwrap();
    assert_eq!(items_after.len(), items_before.len());
    for (before, after) in items_before.iter().zip(items_after.iter()) {
        assert_eq!(before.artifact_url, after.artifact_url);
        assert_eq!(before.status, after.status);
    }

    // Exactly one terminal result ever published
    assert_eq!(context.bus.on_topic(TOPIC_RESULTS).len(), 1);
    sub.cancel();
    assert!(sub.next().await.is_none(), "redelivery emitted events");
}

#[tokio::test(start_paused = true)]
async fn crashed_worker_resume_finishes_remaining_items() {
    let context = TestContext::new();
    let names: Vec<String> = (0..10).map(|i| format!("user{i}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let (job_id, envelope) = submit_rows(&context, rows_named(&name_refs), "<p>{name}</p>").await;

    // Simulate a worker that finished 7 items and crashed before the rest
    let store = &context.store;
    store.transition_job(&job_id, JobState::Queued, JobState::Processing).await.unwrap();
    for index in 0..7 {
        let item_id = pf_core::ItemId::from_index(index);
        store
            .start_item(&job_id, &pf_core::NewItem::new(item_id, format!("user{index}")))
            .await
            .unwrap();
        store
            .close_item(
                &job_id,
                &item_id,
                &pf_core::ItemClose::success(
                    format!("mem://jobs/{job_id}/user{index}.png"),
                    format!("jobs/{job_id}/user{index}.png"),
                    5,
                ),
            )
            .await
            .unwrap();
    }

    context.worker().handle_envelope(&envelope).await.unwrap();

    let job = context.store.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(
        (job.counters.total, job.counters.processed, job.counters.success, job.counters.failure),
        (10, 10, 10, 0)
    );
    // Items finished before the crash kept their original artifacts
    let items = context.store.get_items(&job_id).await.unwrap();
    assert_eq!(
        items[3].artifact_url.as_deref(),
        Some(format!("mem://jobs/{job_id}/user3.png").as_str())
    );
    assert_eq!(context.bus.on_topic(TOPIC_RESULTS).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn progress_is_strictly_increasing_across_parallel_batches() {
    let mut settings = Settings::default();
    settings.batch_size = 4;
    let context = TestContext::with_settings(settings);
    let names: Vec<String> = (0..12).map(|i| format!("user{i}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let (job_id, envelope) = submit_rows(&context, rows_named(&name_refs), "<p>{name}</p>").await;
    let sub = context.hub.subscribe(&job_id);

    context.worker().handle_envelope(&envelope).await.unwrap();

    let events = collect_until_terminal(&sub).await;
    let progress = progress_values(&events);
    assert_eq!(progress.first(), Some(&0));
    for pair in progress.windows(2) {
        assert!(pair[1] > pair[0], "progress regressed: {progress:?}");
    }
    assert_eq!(progress.last(), Some(&12));
    assert_eq!(events.last().unwrap().body.name(), "job_completed");
}

#[tokio::test(start_paused = true)]
async fn all_failed_policy_fails_the_job() {
    let mut settings = Settings::default();
    settings.completion_policy = CompletionPolicy::FailWhenAllFailed;
    let context = TestContext::with_settings(settings);
    let rows = vec![
        row(&[("name", "a"), ("note", TIMEOUT_MARKER)]),
        row(&[("name", "b"), ("note", TIMEOUT_MARKER)]),
    ];
    let (job_id, envelope) = submit_rows(&context, rows, "<p>{name} {note}</p>").await;
    let sub = context.hub.subscribe(&job_id);

    context.worker().handle_envelope(&envelope).await.unwrap();

    let job = context.store.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.error_message.as_deref(), Some("all 2 items failed"));
    assert_eq!((job.counters.processed, job.counters.failure), (2, 2));

    let events = collect_until_terminal(&sub).await;
    assert_eq!(events.last().unwrap().body.name(), "job_failed");
    assert_eq!(context.bus.on_topic(TOPIC_ERRORS).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn expansion_failure_fails_the_whole_job() {
    let context = TestContext::new();
    // An empty envelope cannot pass the dispatcher; forge one
    let job_id = pf_core::JobId::new();
    let new_job = pf_core::NewJob::builder(job_id, JobKind::ByRow, 0)
        .campaign_name("forged")
        .template("<p>{name}</p>")
        .build();
    context.store.create_job(&new_job).await.unwrap();
    context.store.transition_job(&job_id, JobState::Pending, JobState::Queued).await.unwrap();
    let envelope = JobEnvelope {
        job_id,
        campaign_name: "forged".into(),
        template: "<p>{name}</p>".into(),
        dims: Dimensions::new(100, 50),
        params: JobParams::default(),
        payload: JobPayload::ByRow { rows: vec![], columns: vec![] },
        metadata: Map::new(),
        queued_at_ms: 0,
    };
    let sub = context.hub.subscribe(&job_id);

    context.worker().handle_envelope(&envelope).await.unwrap();

    let job = context.store.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.error_message.as_deref(), Some("submission contains no work items"));

    let events = collect_until_terminal(&sub).await;
    assert_eq!(events.last().unwrap().body.name(), "job_failed");
    assert_eq!(context.bus.on_topic(TOPIC_ERRORS).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn envelope_for_unknown_job_is_acknowledged() {
    let context = TestContext::new();
    let envelope = JobEnvelope {
        job_id: pf_core::JobId::new(),
        campaign_name: "ghost".into(),
        template: String::new(),
        dims: Dimensions::default(),
        params: JobParams::default(),
        payload: JobPayload::ByRow { rows: vec![row(&[("name", "x")])], columns: vec![] },
        metadata: Map::new(),
        queued_at_ms: 0,
    };
    context.worker().handle_envelope(&envelope).await.unwrap();
    assert!(context.bus.on_topic(TOPIC_RESULTS).is_empty());
}

#[tokio::test(start_paused = true)]
async fn logo_overlay_lands_on_the_artifact() {
    let blue_logo = {
        let mut bytes = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            10,
            10,
            image::Rgba([0, 0, 255, 255]),
        ))
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
        pf_adapters::bytes_to_data_url(&bytes.into_inner())
    };

    let context = TestContext::new();
    let ticket = context
        .dispatcher()
        .submit_by_row(
            "logo-campaign",
            rows_named(&["Ada"]),
            vec!["name".to_string()],
            "<h1>{name}</h1>",
            Dimensions::new(100, 50),
            JobParams { logo_handle: Some(blue_logo), ..JobParams::default() },
            Map::new(),
        )
        .await
        .unwrap();
    let envelope = context.bus.requests().remove(0);

    context.worker().handle_envelope(&envelope).await.unwrap();

    let items = context.store.get_items(&ticket.job_id).await.unwrap();
    let png = context.blobs.get(items[0].artifact_key.as_deref().unwrap()).unwrap();
    let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
    assert_eq!((decoded.width(), decoded.height()), (100, 50));
    // Logo sits top-right with 20px padding: x = 100 - 70 - 20 = 10
    assert_eq!(decoded.get_pixel(15, 25), &image::Rgba([0, 0, 255, 255]));
    // Far corner is untouched fake-rasterizer background
    assert_eq!(decoded.get_pixel(0, 49), &image::Rgba([240, 240, 240, 255]));
}

/// Rasterizer that cancels the job while the first render is in flight.
struct CancelDuringRender {
    inner: FakeRasterizer,
    store: pf_storage::mem::MemStore,
    job_id: pf_core::JobId,
    remaining: AtomicUsize,
}

#[async_trait::async_trait]
impl Rasterizer for CancelDuringRender {
    async fn render_png(
        &self,
        html: &str,
        dims: Dimensions,
        scale: f64,
        deadline: std::time::Duration,
    ) -> Result<Vec<u8>, RasterizeError> {
        if self.remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            == Ok(1)
        {
            let _ = self.store.cancel_job(&self.job_id).await;
        }
        self.inner.render_png(html, dims, scale, deadline).await
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_flight_discards_outcomes_and_stops_batches() {
    let mut settings = Settings::default();
    settings.batch_size = 2;

    // Two-phase setup: the job id must exist before the rasterizer can
    // target it, so submit first, then swap in the cancelling rasterizer
    let context = TestContext::with_settings(settings.clone());
    let names: Vec<String> = (0..6).map(|i| format!("user{i}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let (job_id, envelope) = submit_rows(&context, rows_named(&name_refs), "<p>{name}</p>").await;

    let cancelling = Arc::new(CancelDuringRender {
        inner: FakeRasterizer::new(),
        store: context.store.clone(),
        job_id,
        remaining: AtomicUsize::new(1),
    });
    let worker = Worker::new(Arc::new(Runtime::new(
        Arc::new(context.store.clone()),
        Arc::new(context.bus.clone()),
        context.hub.clone(),
        crate::runtime::Capabilities {
            rasterizer: cancelling,
            blobs: Arc::new(context.blobs.clone()),
            profiles: Arc::new(context.profiles.clone()),
            sink: Arc::new(context.sink.clone()),
        },
        settings,
    )));

    let sub = context.hub.subscribe(&job_id);
    worker.handle_envelope(&envelope).await.unwrap();

    let job = context.store.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Cancelled);
    // In-flight items were discarded at the counter level
    assert_eq!(job.counters.processed, 0);

    // No poster_completed or terminal completion was surfaced
    sub.cancel();
    let mut surfaced = Vec::new();
    while let Some(record) = sub.next().await {
        surfaced.push(record);
    }
    assert!(
        surfaced.iter().all(|record| matches!(
            record.body,
            HubEvent::Progress { .. } | HubEvent::Log { .. }
        )),
        "unexpected events surfaced after cancel: {surfaced:?}"
    );
    assert!(context.bus.on_topic(TOPIC_RESULTS).is_empty());
}
