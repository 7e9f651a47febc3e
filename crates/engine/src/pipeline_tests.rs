// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn row_of(value: serde_json::Value) -> RowData {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("not an object: {other:?}"),
    }
}

#[yare::parameterized(
    plain_number    = { json!({"user_id": 42}), Some(42) },
    id_column       = { json!({"id": 7}), Some(7) },
    spaced_key      = { json!({" User Id ": 9}), Some(9) },
    string_value    = { json!({"user_id": "123"}), Some(123) },
    float_string    = { json!({"user_id": "123.0"}), Some(123) },
    none_string     = { json!({"user_id": "None"}), None },
    empty_string    = { json!({"user_id": "  "}), None },
    garbage_string  = { json!({"user_id": "abc"}), None },
    missing         = { json!({"name": "ada"}), None },
)]
fn user_id_extraction(row: serde_json::Value, expected: Option<i64>) {
    assert_eq!(extract_user_id(&row_of(row)), expected);
}

#[test]
fn row_identifier_prefers_username_column() {
    assert_eq!(row_identifier(&row_of(json!({"username": "ada"})), 0), "ada");
    assert_eq!(row_identifier(&row_of(json!({"Username": "grace"})), 1), "grace");
    assert_eq!(row_identifier(&row_of(json!({"name": "x"})), 2), "row_3");
}

#[test]
fn row_display_name_prefers_display_name() {
    assert_eq!(
        row_display_name(&row_of(json!({"display_name": "Ada L", "name": "ada"}))),
        Some("Ada L".to_string())
    );
    assert_eq!(
        row_display_name(&row_of(json!({"name": "ada"}))),
        Some("ada".to_string())
    );
    assert_eq!(row_display_name(&row_of(json!({"username": "ada"}))), None);
}
