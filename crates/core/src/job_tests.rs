// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    pending    = { JobState::Pending, false },
    queued     = { JobState::Queued, false },
    processing = { JobState::Processing, false },
    completed  = { JobState::Completed, true },
    failed     = { JobState::Failed, true },
    cancelled  = { JobState::Cancelled, true },
)]
fn terminal_states(state: JobState, terminal: bool) {
    assert_eq!(state.is_terminal(), terminal);
}

#[test]
fn state_display_roundtrips_through_parse() {
    for state in [
        JobState::Pending,
        JobState::Queued,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Cancelled,
    ] {
        assert_eq!(JobState::parse(&state.to_string()), Some(state));
    }
    assert_eq!(JobState::parse("bogus"), None);
}

#[test]
fn kind_display_roundtrips_through_parse() {
    for kind in [
        JobKind::ByIdentifier,
        JobKind::ByRow,
        JobKind::ByTemplateParam,
        JobKind::Export,
    ] {
        assert_eq!(JobKind::parse(&kind.to_string()), Some(kind));
    }
}

#[test]
fn counters_percent_complete() {
    let counters = JobCounters { total: 20, processed: 7, success: 5, failure: 2 };
    assert_eq!(counters.percent_complete(), 35.0);
    assert!(!counters.is_drained());

    let empty = JobCounters::new(0);
    assert_eq!(empty.percent_complete(), 0.0);
}

#[test]
fn natural_drain_completes_even_when_all_failed() {
    let counters = JobCounters { total: 3, processed: 3, success: 0, failure: 3 };
    assert_eq!(
        CompletionPolicy::NaturalDrain.terminal_state(&counters),
        JobState::Completed
    );
}

#[yare::parameterized(
    all_failed  = { 0, 3, JobState::Failed },
    mixed       = { 1, 2, JobState::Completed },
    all_success = { 3, 0, JobState::Completed },
)]
fn fail_when_all_failed_policy(success: i64, failure: i64, expected: JobState) {
    let counters = JobCounters { total: success + failure, processed: success + failure, success, failure };
    assert_eq!(
        CompletionPolicy::FailWhenAllFailed.terminal_state(&counters),
        expected
    );
}

#[test]
fn new_job_builder_sets_fields() {
    let id = JobId::new();
    let job = NewJob::builder(id, JobKind::ByRow, 4)
        .campaign_name("spring-launch")
        .template("<h1>{name}</h1>")
        .dims(crate::dims::Dimensions::new(100, 50))
        .skip_overlays(true)
        .model("flash")
        .build();

    assert_eq!(job.id, id);
    assert_eq!(job.kind, JobKind::ByRow);
    assert_eq!(job.total, 4);
    assert_eq!(job.campaign_name, "spring-launch");
    assert_eq!(job.dims.width, 100);
    assert!(job.skip_overlays);
    assert_eq!(job.model.as_deref(), Some("flash"));
    assert_eq!(job.logo_handle, None);
}
