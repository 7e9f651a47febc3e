// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fragments_are_wrapped_in_a_sized_host_document() {
    let wrapped = host_document("<div>poster</div>", Dimensions::new(100, 50));
    assert!(wrapped.starts_with("<!DOCTYPE html>"));
    assert!(wrapped.contains("width: 100px"));
    assert!(wrapped.contains("height: 50px"));
    assert!(wrapped.contains("<div>poster</div>"));
}

#[test]
fn complete_documents_pass_through_untouched() {
    let html = "<!DOCTYPE html><html><body>own viewport</body></html>";
    assert_eq!(host_document(html, Dimensions::new(100, 50)), html);

    let html = "<html lang=\"en\"><body>x</body></html>";
    assert_eq!(host_document(html, Dimensions::new(100, 50)), html);
}
