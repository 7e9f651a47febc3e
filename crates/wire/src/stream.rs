// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-client subscription bridge.

use crate::sse::SseFrame;
use crate::GatewayError;
use futures_util::Stream;
use pf_core::{EventRecord, HubEvent, Job, JobId, JobState};
use pf_hub::{EventHub, Subscription};
use pf_storage::Store;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Silence window before the gateway probes persistent state and emits
/// a heartbeat.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Opens per-client streams over the hub and the store.
#[derive(Clone)]
pub struct StreamGateway {
    hub: EventHub,
    store: Arc<dyn Store>,
}

impl StreamGateway {
    pub fn new(hub: EventHub, store: Arc<dyn Store>) -> Self {
        Self { hub, store }
    }

    /// Open a stream for a job.
    ///
    /// The subscription attaches before persisted state is read, so the
    /// catch-up `status` event and the live feed can never lose an event
    /// in between. A client connecting after the job finished receives
    /// the synthesized terminal event right after the catch-up.
    pub async fn open(&self, job_id: &JobId) -> Result<JobStream, GatewayError> {
        let sub = self.hub.subscribe(job_id);
        let Some(job) = self.store.get_job(job_id).await? else {
            return Err(GatewayError::JobNotFound(*job_id));
        };

        let mut pending = VecDeque::new();
        pending.push_back(SseFrame::from_record(&EventRecord::new(
            *job_id,
            now_ms(),
            HubEvent::Connected { message: "Connected to job updates".to_string() },
        )));
        pending.push_back(SseFrame::from_record(&EventRecord::new(
            *job_id,
            now_ms(),
            HubEvent::status(job.state, &job.counters),
        )));

        let mut done = false;
        if job.state.is_terminal() {
            pending.push_back(synthesize_terminal(&job));
            done = true;
        }

        debug!(job_id = %job_id, state = %job.state, "stream opened");
        Ok(JobStream {
            sub,
            store: self.store.clone(),
            job_id: *job_id,
            pending,
            done,
            heartbeat: HEARTBEAT_INTERVAL,
        })
    }
}

/// One client's stream. Dropping it cancels the subscription.
pub struct JobStream {
    sub: Subscription,
    store: Arc<dyn Store>,
    job_id: JobId,
    pending: VecDeque<SseFrame>,
    done: bool,
    heartbeat: Duration,
}

impl std::fmt::Debug for JobStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStream")
            .field("job_id", &self.job_id)
            .field("pending", &self.pending.len())
            .field("done", &self.done)
            .field("heartbeat", &self.heartbeat)
            .finish()
    }
}

impl JobStream {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Next frame for the client; `None` closes the stream.
    ///
    /// Terminal events are forwarded and then end the stream. A silence
    /// longer than the heartbeat interval triggers a state probe: if the
    /// job went terminal without a live event (bus lag, restart), the
    /// terminal frame is synthesized from the store; otherwise the
    /// client gets a heartbeat.
    pub async fn next_frame(&mut self) -> Option<SseFrame> {
        if let Some(frame) = self.pending.pop_front() {
            return Some(frame);
        }
        if self.done {
            self.sub.cancel();
            return None;
        }

        match tokio::time::timeout(self.heartbeat, self.sub.next()).await {
            Ok(Some(record)) => {
                if record.body.is_terminal() {
                    self.done = true;
                }
                Some(SseFrame::from_record(&record))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(_) => match self.store.get_job(&self.job_id).await {
                Ok(Some(job)) if job.state.is_terminal() => {
                    self.done = true;
                    Some(synthesize_terminal(&job))
                }
                _ => Some(SseFrame::from_record(&EventRecord::new(
                    self.job_id,
                    now_ms(),
                    HubEvent::heartbeat(),
                ))),
            },
        }
    }

    /// Adapt to a `futures` stream for transports that want one.
    pub fn into_stream(self) -> impl Stream<Item = SseFrame> {
        futures_util::stream::unfold(self, |mut stream| async move {
            stream.next_frame().await.map(|frame| (frame, stream))
        })
    }
}

/// Build the terminal frame from persisted state, for clients that
/// missed the live event.
fn synthesize_terminal(job: &Job) -> SseFrame {
    let elapsed_ms = match (job.started_at_ms, job.completed_at_ms) {
        (Some(started), Some(completed)) => completed.saturating_sub(started),
        _ => 0,
    };
    let body = match job.state {
        JobState::Completed => HubEvent::JobCompleted {
            success_count: job.counters.success,
            failure_count: job.counters.failure,
            total_time_ms: elapsed_ms,
            results: Vec::new(),
        },
        _ => HubEvent::JobFailed {
            error: job
                .error_message
                .clone()
                .unwrap_or_else(|| "job failed".to_string()),
            details: Default::default(),
        },
    };
    SseFrame::from_record(&EventRecord::new(job.id, now_ms(), body))
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
