// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};

fn io_error() -> sqlx::Error {
    sqlx::Error::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
}

#[tokio::test(start_paused = true)]
async fn transient_errors_are_retried() {
    let attempts = AtomicU32::new(0);
    let result: Result<u32, _> = with_retry("op", || {
        let n = attempts.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Err(io_error())
            } else {
                Ok(n)
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), 2);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn attempts_are_bounded() {
    let attempts = AtomicU32::new(0);
    let result: Result<(), _> = with_retry("op", || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err(io_error()) }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), MAX_ATTEMPTS);
}

#[tokio::test]
async fn non_transient_errors_surface_immediately() {
    let attempts = AtomicU32::new(0);
    let result: Result<(), _> = with_retry("op", || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err(sqlx::Error::RowNotFound) }
    })
    .await;

    assert!(matches!(result, Err(sqlx::Error::RowNotFound)));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
