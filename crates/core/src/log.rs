// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job-scoped, user-visible log lines.
//!
//! Distinct from `tracing` telemetry: these rows are product data, shown
//! to clients over the stream and the logs endpoint.

use crate::job::JobId;
use serde::{Deserialize, Serialize};
use serde_json::Map;

/// Severity of a job log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Success,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARNING" => Some(LogLevel::Warning),
            "ERROR" => Some(LogLevel::Error),
            "SUCCESS" => Some(LogLevel::Success),
            _ => None,
        }
    }
}

crate::simple_display! {
    LogLevel {
        Debug => "DEBUG",
        Info => "INFO",
        Warning => "WARNING",
        Error => "ERROR",
        Success => "SUCCESS",
    }
}

/// One append-only log line for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub job_id: JobId,
    pub level: LogLevel,
    pub message: String,
    pub details: Map<String, serde_json::Value>,
    pub created_at_ms: u64,
}
