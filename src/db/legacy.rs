//! Migration from the old line-delimited JSON history file.
//!
//! A configured path that still points at a `.jsonl`/`.json` file is
//! redirected to the sibling `.db`, and the old file is imported into an
//! empty store once, then renamed with a `.migrated` suffix.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::HistoryItem;

const LEGACY_EXTENSIONS: [&str; 2] = ["jsonl", "json"];

fn is_legacy(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| LEGACY_EXTENSIONS.contains(&ext))
}

/// The relational store path for a configured history path.
pub fn resolve_history_path(configured: &Path) -> PathBuf {
    if is_legacy(configured) {
        configured.with_extension("db")
    } else {
        configured.to_path_buf()
    }
}

/// Legacy files that exist next to (or instead of) the store.
pub fn legacy_sources(configured: &Path, db_path: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if is_legacy(configured) {
        candidates.push(configured.to_path_buf());
    }
    for ext in LEGACY_EXTENSIONS {
        let sibling = db_path.with_extension(ext);
        if !candidates.contains(&sibling) {
            candidates.push(sibling);
        }
    }
    candidates.retain(|path| path.is_file());
    candidates
}

/// Parse every line that holds a usable item. Bad lines are logged and skipped.
pub fn read_legacy_items(path: &Path) -> Result<Vec<HistoryItem>> {
    let content = std::fs::read_to_string(path)?;
    let mut items = Vec::new();

    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryItem>(line) {
            Ok(item) if !item.id.trim().is_empty() => items.push(item),
            Ok(_) => tracing::warn!("{:?}:{}: legacy item without id, skipped", path, number + 1),
            Err(e) => tracing::warn!("{:?}:{}: unreadable legacy item: {}", path, number + 1, e),
        }
    }

    Ok(items)
}

/// Rename the legacy file out of the way, keeping it on disk.
pub fn mark_migrated(path: &Path) -> Result<PathBuf> {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".migrated");
    let target = path.with_file_name(name);
    std::fs::rename(path, &target)?;
    Ok(target)
}
