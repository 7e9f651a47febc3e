// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parsing of free-form user identifier lists.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single parsed identifier: numeric tokens become user ids, anything
/// else is a username.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    UserId(i64),
    Username(String),
}

impl Identifier {
    pub fn as_username(&self) -> Option<&str> {
        match self {
            Identifier::Username(name) => Some(name),
            Identifier::UserId(_) => None,
        }
    }

    pub fn as_user_id(&self) -> Option<i64> {
        match self {
            Identifier::UserId(id) => Some(*id),
            Identifier::Username(_) => None,
        }
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identifier::Username(name) => f.write_str(name),
            Identifier::UserId(id) => write!(f, "{id}"),
        }
    }
}

/// Parse a comma- or newline-separated identifier list.
///
/// Tolerant of surrounding whitespace and empty tokens. Duplicates are
/// dropped, first occurrence wins, order is otherwise preserved.
pub fn parse_identifiers(input: &str) -> Vec<Identifier> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    for token in input.replace('\n', ",").split(',') {
        let token = token.trim();
        if token.is_empty() || !seen.insert(token.to_string()) {
            continue;
        }
        match token.parse::<i64>() {
            Ok(id) if token.chars().all(|c| c.is_ascii_digit()) => {
                out.push(Identifier::UserId(id));
            }
            _ => out.push(Identifier::Username(token.to_string())),
        }
    }

    out
}

#[cfg(test)]
#[path = "identifiers_tests.rs"]
mod tests;
