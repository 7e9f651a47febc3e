// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template fill engine.
//!
//! Purely syntactic: `{name}` and `{a.b.c}` tokens are replaced by row
//! values (dotted paths resolve into nested maps), unknown tokens are left
//! verbatim, `{{…}}` tokens are normalized to `{…}` at ingress, image-ish
//! columns toggle visibility of the `profilePic`/`placeholder` elements,
//! and `<script>` elements are stripped from the output.

use crate::envelope::RowData;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Columns that drive the show/hide toggles (compared case-insensitively).
const IMAGE_COLUMNS: &[&str] = &["profile_pic", "profile_picture", "avatar", "image", "photo"];

fn static_regex(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(re) => re,
        // Patterns are compile-time constants, validated by tests.
        Err(_) => unreachable!("invalid static regex"),
    }
}

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| static_regex(r"\{([A-Za-z0-9_][A-Za-z0-9_.]*)\}"));

static DOUBLE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| static_regex(r"\{\{\s*([A-Za-z0-9_][A-Za-z0-9_.]*)\s*\}\}"));

static SCRIPT: LazyLock<Regex> = LazyLock::new(|| static_regex(r"(?is)<script\b.*?</script>"));

static HIDDEN_PROFILE_IMG: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(
        r#"(?is)(<img[^>]*id=["']?profilePic["']?[^>]*?)style\s*=\s*["'][^"']*display\s*:\s*none[^"']*["']"#,
    )
});

static PLACEHOLDER_DIV: LazyLock<Regex> =
    LazyLock::new(|| static_regex(r#"(?i)(<div[^>]*id=["']?placeholder["']?[^>]*)>"#));

/// Convert legacy `{{name}}` tokens to the canonical `{name}` form.
pub fn normalize_tokens(template: &str) -> String {
    DOUBLE_TOKEN.replace_all(template, "{$1}").into_owned()
}

/// Extract the set of tokens present in a template.
pub fn extract_tokens(template: &str) -> BTreeSet<String> {
    TOKEN
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Resolve a dotted path against a (possibly nested) row.
///
/// Returns `None` when any segment is missing or a non-map is traversed;
/// the caller leaves the token literal in that case.
fn resolve_path(row: &RowData, path: &str) -> Option<String> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = row.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    value_to_string(current)
}

fn value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Null => Some(String::new()),
        _ => None,
    }
}

/// Fill a template with a data row.
///
/// Normalizes `{{…}}` tokens first, then replaces every known token,
/// applies the image-column visibility toggles, and strips `<script>`
/// elements from the result.
pub fn fill(template: &str, row: &RowData) -> String {
    let normalized = normalize_tokens(template);

    let mut result = TOKEN
        .replace_all(&normalized, |caps: &regex::Captures<'_>| {
            resolve_path(row, &caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned();

    if has_image_value(row) {
        result = apply_visibility_toggles(&result);
    }

    SCRIPT.replace_all(&result, "").into_owned()
}

/// True when any image-ish column carries a non-empty value.
fn has_image_value(row: &RowData) -> bool {
    row.iter().any(|(key, value)| {
        IMAGE_COLUMNS.contains(&key.trim().to_ascii_lowercase().as_str())
            && value
                .as_str()
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false)
    })
}

/// Un-hide the `profilePic` image element and hide the `placeholder` div.
fn apply_visibility_toggles(html: &str) -> String {
    let shown = HIDDEN_PROFILE_IMG.replace_all(html, r#"${1}style="""#);
    PLACEHOLDER_DIV
        .replace_all(&shown, r#"$1 style="display: none;">"#)
        .into_owned()
}

/// True when the template is a complete document that declares its own
/// viewport; bare fragments get wrapped in a generated host document.
pub fn is_complete_document(html: &str) -> bool {
    let head = html.trim_start().to_ascii_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
