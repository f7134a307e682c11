// SPDX-License-Identifier: MIT OR Apache-2.0
//! Recipient-id sanitization.
//!
//! Recipient ids name directories under the bus root, so anything outside
//! `[A-Za-z0-9_-]` is stripped before an id touches the filesystem. An id
//! that sanitizes to the empty string is unroutable and must be surfaced
//! as a block reason, never silently dropped.

/// Strip every character outside `[A-Za-z0-9_-]` from `value`.
///
/// Leading and trailing whitespace is removed first. The result may be
/// empty; callers decide whether that is an error.
#[must_use]
pub fn sanitize_agent_id(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .collect()
}

/// Returns `true` when `value` is non-empty and already in sanitized form.
#[must_use]
pub fn is_valid_agent_id(value: &str) -> bool {
    !value.is_empty() && sanitize_agent_id(value) == value
}
