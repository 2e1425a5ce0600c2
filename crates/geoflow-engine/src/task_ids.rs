// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Remote compute task ID extraction from execution logs.
//!
//! Scripts that delegate work to the remote compute platform log the task
//! IDs they submit. Cancellation scans the accumulated log text with a
//! versioned pattern so changes to the platform's log format are explicit.
//!
//! # Pattern v1
//!
//! | Part | Rule |
//! |------|------|
//! | keyword | `task`, any case, optionally followed by `id` / `_id` |
//! | separator | `:` or `=` (with optional spaces), or whitespace |
//! | task ID | exactly 24 upper-case ASCII letters or digits |
//!
//! Matching lines, e.g.:
//!
//! ```text
//! Starting GEE task 6CIGR7EG2J45GJ2DN2J7X3WZ
//! Export task id: QW3ZJ7C5H6S3KAXJ4UQG5N2M
//! task_id=B2YV6NRRN3LTUFUPXNEYAJ3C
//! ```

use std::sync::LazyLock;

use regex::Regex;

/// Version of the extraction contract implemented by [`extract_task_ids`].
pub const TASK_ID_PATTERN_VERSION: u32 = 1;

/// Pattern v1, see the module docs.
pub const TASK_ID_PATTERN_V1: &str = r"(?i:\btask(?:[\s_]*id)?)(?:\s*[:=]\s*|\s+)([A-Z0-9]{24})\b";

static TASK_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TASK_ID_PATTERN_V1).expect("task id pattern is valid"));

/// Extract remote task IDs from log text.
///
/// IDs are returned in order of first appearance, without duplicates.
pub fn extract_task_ids(log_text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for captures in TASK_ID_RE.captures_iter(log_text) {
        let id = &captures[1];
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }
    ids
}
