// Compact pool: per-file aggregation of line numbers before a flush

use std::collections::{HashMap, VecDeque};
use tracing::warn;

use super::record::{encode_compact, storage_key, COMPACT_RECORD_LIMIT};
use super::WriteFlags;

/// Initial capacity of the tag table, and of each line number list
const POOL_BUCKETS: usize = 256;
const LINES_PER_TAG: usize = 100;

/// Flushed paths remembered to detect non-contiguous input
const RECENT_PATHS: usize = 8;

/// Line numbers collected for the file currently being written.
///
/// Holds at most one path at a time. Writers must present all occurrences
/// of a file contiguously; a path that comes back after its group was
/// flushed produces a second, unmerged group of records. Only the last
/// few flushed paths are remembered for that check.
#[derive(Debug, Default)]
pub struct CompactPool {
    path: Option<String>,
    entries: HashMap<String, Vec<u32>>,
    recent: VecDeque<String>,
    reentries: usize,
}

impl CompactPool {
    pub fn new() -> Self {
        Self {
            path: None,
            entries: HashMap::with_capacity(POOL_BUCKETS),
            recent: VecDeque::with_capacity(RECENT_PATHS),
            reentries: 0,
        }
    }

    pub fn current_path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// True when `path` differs from the path of the pending entries.
    pub fn needs_flush(&self, path: &str) -> bool {
        matches!(&self.path, Some(current) if current != path)
    }

    /// Make `path` current. The pool must be empty or already on `path`.
    pub fn set_path(&mut self, path: &str) {
        if self.path.as_deref() == Some(path) {
            return;
        }
        debug_assert!(self.entries.is_empty());
        if self.recent.iter().any(|p| p == path) {
            self.reentries += 1;
            warn!(
                "records for '{}' are not contiguous; its tags will be stored as separate groups",
                path
            );
        }
        self.path = Some(path.to_string());
    }

    /// Number of times a recently flushed path came back
    pub fn reentries(&self) -> usize {
        self.reentries
    }

    pub fn add(&mut self, tag: &str, line: u32) {
        match self.entries.get_mut(tag) {
            Some(lines) => lines.push(line),
            None => {
                let mut lines = Vec::with_capacity(LINES_PER_TAG);
                lines.push(line);
                self.entries.insert(tag.to_string(), lines);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_none()
    }

    /// Number of distinct tags pending
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Take the pending path and its entries, leaving the pool empty.
    pub fn take(&mut self) -> Option<(String, HashMap<String, Vec<u32>>)> {
        let path = self.path.take()?;
        let entries = std::mem::replace(&mut self.entries, HashMap::with_capacity(POOL_BUCKETS));
        if self.recent.len() == RECENT_PATHS {
            self.recent.pop_front();
        }
        self.recent.push_back(path.clone());
        Some((path, entries))
    }
}

/// Serialize pooled entries for file `fid` into keyed compact records.
pub fn serialize(fid: u32, entries: HashMap<String, Vec<u32>>, flags: WriteFlags) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (tag, mut lines) in entries {
        lines.sort_unstable();
        let key = storage_key(&tag, flags.extract_method);
        for record in encode_compact(fid, &tag, &lines, flags.unique, COMPACT_RECORD_LIMIT) {
            out.push((key.to_string(), record));
        }
    }
    out
}
