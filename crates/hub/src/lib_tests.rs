// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pf_core::JobCounters;

fn record(job_id: &JobId, body: HubEvent) -> EventRecord {
    EventRecord::new(*job_id, now_ms(), body)
}

fn progress(job_id: &JobId, processed: i64) -> EventRecord {
    record(
        job_id,
        HubEvent::progress(
            &JobCounters { total: 100, processed, success: processed, failure: 0 },
            None,
            "processing",
        ),
    )
}

fn log(job_id: &JobId, message: &str) -> EventRecord {
    record(
        job_id,
        HubEvent::Log {
            level: pf_core::LogLevel::Info,
            message: message.to_string(),
            details: Default::default(),
        },
    )
}

#[tokio::test]
async fn events_reach_local_subscribers() {
    let hub = EventHub::in_process();
    let job_id = JobId::from_string("job-hub1");
    let sub = hub.subscribe(&job_id);

    hub.publish(&log(&job_id, "hello")).await;
    let received = sub.next().await.unwrap();
    assert_eq!(received.body.name(), "log");
}

#[tokio::test]
async fn events_for_other_jobs_are_not_delivered() {
    let hub = EventHub::in_process();
    let job_a = JobId::from_string("job-a");
    let job_b = JobId::from_string("job-b");
    let sub = hub.subscribe(&job_a);

    hub.publish(&log(&job_b, "not for a")).await;
    hub.publish(&log(&job_a, "for a")).await;

    let received = sub.next().await.unwrap();
    match received.body {
        HubEvent::Log { message, .. } => assert_eq!(message, "for a"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn every_subscriber_sees_each_event() {
    let hub = EventHub::in_process();
    let job_id = JobId::from_string("job-fan");
    let sub_a = hub.subscribe(&job_id);
    let sub_b = hub.subscribe(&job_id);
    assert_eq!(hub.subscription_count(Some(&job_id)), 2);

    hub.publish(&log(&job_id, "fan-out")).await;
    assert_eq!(sub_a.next().await.unwrap().body.name(), "log");
    assert_eq!(sub_b.next().await.unwrap().body.name(), "log");
}

#[tokio::test]
async fn progress_coalesces_under_backpressure() {
    let hub = EventHub::in_process();
    let job_id = JobId::from_string("job-press");
    let sub = hub.subscribe(&job_id);

    // A critical event is never evicted by the progress flood behind it
    hub.publish(&log(&job_id, "must arrive")).await;
    // Saturate the queue with progress, then overflow it; each overflow
    // evicts the oldest progress snapshot, never the log event
    for processed in 0..(QUEUE_CAPACITY as i64 + 10) {
        hub.publish(&progress(&job_id, processed)).await;
    }

    let mut saw_log = false;
    let mut last_progress = -1i64;
    while let Some(event) = sub.queue.pop() {
        match event.body {
            HubEvent::Progress { processed, .. } => {
                assert!(processed > last_progress, "progress regressed");
                last_progress = processed;
            }
            HubEvent::Log { .. } => saw_log = true,
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert!(saw_log);
    // The newest snapshot survived the eviction
    assert_eq!(last_progress, QUEUE_CAPACITY as i64 + 9);
}

#[tokio::test]
async fn dropping_subscription_detaches_queue() {
    let hub = EventHub::in_process();
    let job_id = JobId::from_string("job-drop");
    let sub = hub.subscribe(&job_id);
    assert_eq!(hub.subscription_count(None), 1);
    drop(sub);
    assert_eq!(hub.subscription_count(None), 0);
}

#[tokio::test]
async fn cancelled_subscription_drains_then_ends() {
    let hub = EventHub::in_process();
    let job_id = JobId::from_string("job-drain");
    let sub = hub.subscribe(&job_id);

    hub.publish(&log(&job_id, "queued before cancel")).await;
    sub.cancel();

    assert!(sub.next().await.is_some());
    assert!(sub.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn idle_subscription_synthesizes_heartbeat() {
    let hub = EventHub::in_process();
    let job_id = JobId::from_string("job-idle");
    let sub = hub.subscribe(&job_id);

    let received = sub.next().await.unwrap();
    assert_eq!(received.body.name(), "heartbeat");
}
