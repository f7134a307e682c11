// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rename-atomic JSON persistence.
//!
//! Every durable artifact on the bus is written with create-temp-then-rename
//! so readers never observe a torn file. Temp names carry a random uuid
//! suffix so two producers writing the same target never collide. Advisory
//! locks are never used; `rename(2)` is the only synchronization primitive.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;
use uuid::Uuid;

/// Serialize `value` as JSON and atomically replace `path` with it.
///
/// Parent directories are created as needed. On any failure the temp file
/// is unlinked before the error is returned.
///
/// # Errors
///
/// Returns the underlying I/O error when the directory cannot be created,
/// the temp file cannot be written, or the rename fails.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{file_name}.tmp.{}", Uuid::new_v4().simple()));

    let payload = serde_json::to_vec(value).map_err(io::Error::other)?;
    let result = fs::write(&tmp, &payload).and_then(|()| fs::rename(&tmp, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Read `path` and parse it as a JSON value, tolerating every failure.
///
/// Returns `None` for missing, unreadable, or malformed files so a poison
/// artifact can never block a caller's scan loop.
#[must_use]
pub fn read_json_value(path: &Path) -> Option<serde_json::Value> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/out.json");

        write_json_atomic(&target, &serde_json::json!({"k": 1})).unwrap();

        let names: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["out.json"]);
        assert_eq!(
            read_json_value(&target),
            Some(serde_json::json!({"k": 1}))
        );
    }

    #[test]
    fn read_tolerates_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("bad.json");
        fs::write(&target, b"{not json").unwrap();
        assert!(read_json_value(&target).is_none());
        assert!(read_json_value(&dir.path().join("missing.json")).is_none());
    }
}
