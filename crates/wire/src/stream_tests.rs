// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pf_core::{Dimensions, ItemClose, ItemId, JobKind, NewItem, NewJob};
use pf_storage::mem::MemStore;

struct Fixture {
    hub: EventHub,
    store: MemStore,
    gateway: StreamGateway,
}

fn fixture() -> Fixture {
    let hub = EventHub::in_process();
    let store = MemStore::new();
    let gateway = StreamGateway::new(hub.clone(), Arc::new(store.clone()));
    Fixture { hub, store, gateway }
}

async fn seed_job(store: &MemStore, id: &str, total: i64, state: JobState) -> JobId {
    let job_id = JobId::from_string(id);
    let new_job = NewJob::builder(job_id, JobKind::ByRow, total)
        .campaign_name("stream-campaign")
        .template("<p>{name}</p>")
        .dims(Dimensions::new(100, 50))
        .build();
    store.create_job(&new_job).await.unwrap();
    if state == JobState::Pending {
        return job_id;
    }
    store.transition_job(&job_id, JobState::Pending, JobState::Queued).await.unwrap();
    if state == JobState::Queued {
        return job_id;
    }
    store.transition_job(&job_id, JobState::Queued, JobState::Processing).await.unwrap();
    if state == JobState::Processing {
        return job_id;
    }
    store.transition_job(&job_id, JobState::Processing, state).await.unwrap();
    job_id
}

async fn close_one(store: &MemStore, job_id: &JobId, index: usize) {
    let item_id = ItemId::from_index(index);
    store.start_item(job_id, &NewItem::new(item_id, format!("u{index}"))).await.unwrap();
    store
        .close_item(
            job_id,
            &item_id,
            &ItemClose::success(format!("mem://{index}.png"), format!("{index}.png"), 5),
        )
        .await
        .unwrap();
}

fn body(frame: &SseFrame) -> serde_json::Value {
    serde_json::from_str(&frame.data).unwrap()
}

#[tokio::test]
async fn opening_an_unknown_job_fails() {
    let fx = fixture();
    let err = fx.gateway.open(&JobId::from_string("job-none")).await.unwrap_err();
    assert!(matches!(err, GatewayError::JobNotFound(_)));
    // The short-lived subscription was released
    assert_eq!(fx.hub.subscription_count(None), 0);
}

#[tokio::test]
async fn mid_job_subscriber_gets_catchup_then_live_events() {
    let fx = fixture();
    let job_id = seed_job(&fx.store, "job-mid", 3, JobState::Processing).await;
    close_one(&fx.store, &job_id, 0).await;

    let mut stream = fx.gateway.open(&job_id).await.unwrap();

    let connected = stream.next_frame().await.unwrap();
    assert_eq!(connected.event, "connected");

    // Catch-up reflects the counters at subscribe time
    let status = stream.next_frame().await.unwrap();
    assert_eq!(status.event, "status");
    let status_body = body(&status);
    assert_eq!(status_body["processed"], 1);
    assert_eq!(status_body["total"], 3);
    assert_eq!(status_body["state"], "processing");

    // Live events are forwarded verbatim and the terminal one closes
    fx.hub
        .emit(
            job_id,
            HubEvent::PosterCompleted {
                identifier: "u1".into(),
                artifact_url: "mem://1.png".into(),
                success: true,
                error: None,
            },
        )
        .await;
    fx.hub
        .emit(
            job_id,
            HubEvent::JobCompleted {
                success_count: 3,
                failure_count: 0,
                total_time_ms: 10,
                results: vec![],
            },
        )
        .await;

    assert_eq!(stream.next_frame().await.unwrap().event, "poster_completed");
    assert_eq!(stream.next_frame().await.unwrap().event, "job_completed");
    assert!(stream.next_frame().await.is_none());
    assert_eq!(fx.hub.subscription_count(None), 0);
}

#[tokio::test]
async fn late_subscriber_gets_status_and_synthesized_terminal() {
    let fx = fixture();
    let job_id = seed_job(&fx.store, "job-late", 2, JobState::Processing).await;
    close_one(&fx.store, &job_id, 0).await;
    close_one(&fx.store, &job_id, 1).await;
    fx.store.transition_job(&job_id, JobState::Processing, JobState::Completed).await.unwrap();

    let mut stream = fx.gateway.open(&job_id).await.unwrap();
    assert_eq!(stream.next_frame().await.unwrap().event, "connected");

    let status = stream.next_frame().await.unwrap();
    assert_eq!(status.event, "status");
    assert_eq!(body(&status)["state"], "completed");
    assert_eq!(body(&status)["processed"], 2);

    let terminal = stream.next_frame().await.unwrap();
    assert_eq!(terminal.event, "job_completed");
    assert_eq!(body(&terminal)["success_count"], 2);

    assert!(stream.next_frame().await.is_none());
}

#[tokio::test]
async fn cancelled_job_synthesizes_job_failed_for_late_subscribers() {
    let fx = fixture();
    let job_id = seed_job(&fx.store, "job-gone", 2, JobState::Processing).await;
    fx.store.cancel_job(&job_id).await.unwrap();

    let mut stream = fx.gateway.open(&job_id).await.unwrap();
    stream.next_frame().await.unwrap(); // connected
    stream.next_frame().await.unwrap(); // status

    let terminal = stream.next_frame().await.unwrap();
    assert_eq!(terminal.event, "job_failed");
    assert_eq!(body(&terminal)["error"], "cancelled by user");
    assert!(stream.next_frame().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn silence_produces_heartbeats_while_the_job_runs() {
    let fx = fixture();
    let job_id = seed_job(&fx.store, "job-quiet", 1, JobState::Processing).await;

    let mut stream = fx.gateway.open(&job_id).await.unwrap();
    stream.next_frame().await.unwrap(); // connected
    stream.next_frame().await.unwrap(); // status

    // No events arrive; the 5s window elapses and a heartbeat keeps the
    // transport alive
    let frame = stream.next_frame().await.unwrap();
    assert_eq!(frame.event, "heartbeat");
    let frame = stream.next_frame().await.unwrap();
    assert_eq!(frame.event, "heartbeat");
}

#[tokio::test(start_paused = true)]
async fn lost_terminal_event_is_recovered_from_the_store() {
    let fx = fixture();
    let job_id = seed_job(&fx.store, "job-lost", 1, JobState::Processing).await;

    let mut stream = fx.gateway.open(&job_id).await.unwrap();
    stream.next_frame().await.unwrap(); // connected
    stream.next_frame().await.unwrap(); // status

    // The job finishes but the live event never reaches this process
    close_one(&fx.store, &job_id, 0).await;
    fx.store.transition_job(&job_id, JobState::Processing, JobState::Completed).await.unwrap();

    let terminal = stream.next_frame().await.unwrap();
    assert_eq!(terminal.event, "job_completed");
    assert_eq!(body(&terminal)["success_count"], 1);
    assert!(stream.next_frame().await.is_none());
}

#[tokio::test]
async fn dropping_the_stream_releases_the_subscription() {
    let fx = fixture();
    let job_id = seed_job(&fx.store, "job-drop", 1, JobState::Processing).await;

    let stream = fx.gateway.open(&job_id).await.unwrap();
    assert_eq!(fx.hub.subscription_count(Some(&job_id)), 1);
    drop(stream);
    assert_eq!(fx.hub.subscription_count(Some(&job_id)), 0);
}

#[tokio::test]
async fn two_subscribers_both_observe_the_terminal_event() {
    let fx = fixture();
    let job_id = seed_job(&fx.store, "job-two", 1, JobState::Processing).await;

    let mut early = fx.gateway.open(&job_id).await.unwrap();
    early.next_frame().await.unwrap(); // connected
    early.next_frame().await.unwrap(); // status

    close_one(&fx.store, &job_id, 0).await;
    let mut late = fx.gateway.open(&job_id).await.unwrap();
    late.next_frame().await.unwrap(); // connected
    let status = late.next_frame().await.unwrap();
    assert_eq!(body(&status)["processed"], 1);

    fx.hub
        .emit(
            job_id,
            HubEvent::JobCompleted {
                success_count: 1,
                failure_count: 0,
                total_time_ms: 7,
                results: vec![],
            },
        )
        .await;

    assert_eq!(early.next_frame().await.unwrap().event, "job_completed");
    assert_eq!(late.next_frame().await.unwrap().event, "job_completed");
    assert!(early.next_frame().await.is_none());
    assert!(late.next_frame().await.is_none());
}
