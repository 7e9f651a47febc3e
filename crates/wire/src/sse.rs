// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSE wire framing.

use pf_core::EventRecord;

/// One server-sent event: a name plus a JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self { event: event.into(), data: data.into() }
    }

    /// Frame a hub event. The body keeps the full record (job id,
    /// timestamp, and the flattened event fields).
    pub fn from_record(record: &EventRecord) -> Self {
        let data = match serde_json::to_string(record) {
            Ok(data) => data,
            // EventRecord serialization is infallible in practice; an
            // empty object keeps the stream alive if it ever is not
            Err(_) => "{}".to_string(),
        };
        Self { event: record.body.name().to_string(), data }
    }

    /// Encode as SSE wire text.
    pub fn encode(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }
}

#[cfg(test)]
#[path = "sse_tests.rs"]
mod tests;
