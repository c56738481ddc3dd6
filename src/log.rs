//! Append-only, version-indexed record of accepted operations for one
//! document. Owned exclusively by a [`crate::hub::DocumentHub`]; nothing
//! outside the hub's single-writer task ever appends to it.

use chrono::{DateTime, Utc};

use crate::algebra::Operation;

/// One accepted operation, immutable after append.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub op: Operation,
    pub author_principal_id: String,
    pub server_version: u64,
    pub accepted_at: DateTime<Utc>,
}

/// Append-only sequence keyed by `server_version`, with a bounded retention
/// window: once `retention` entries are held, the oldest is evicted on the
/// next append.
pub struct OperationLog {
    entries: Vec<LogEntry>,
    retention: usize,
    /// Number of entries ever appended, including ones since evicted.
    /// Equals the document's current version.
    version: u64,
}

impl OperationLog {
    pub fn new(retention: usize) -> Self {
        Self {
            entries: Vec::new(),
            retention,
            version: 0,
        }
    }

    /// Restores a log whose current version is already known (e.g. loaded
    /// from a repository snapshot that does not carry log entries).
    pub fn with_starting_version(retention: usize, version: u64) -> Self {
        Self {
            entries: Vec::new(),
            retention,
            version,
        }
    }

    /// Current document version: number of entries ever appended.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The oldest `base_version` a client may still submit against without
    /// triggering a resync. `None` means every version back to 0 is known
    /// (nothing has been evicted).
    pub fn retained_floor(&self) -> u64 {
        self.version.saturating_sub(self.entries.len() as u64)
    }

    /// Whether `base_version` is still inside the retained window.
    pub fn is_within_retention(&self, base_version: u64) -> bool {
        base_version >= self.retained_floor()
    }

    /// Appends an accepted operation, assigning it `current_version + 1`.
    pub fn append(
        &mut self,
        op: Operation,
        author_principal_id: String,
        accepted_at: DateTime<Utc>,
    ) -> u64 {
        self.version += 1;
        self.entries.push(LogEntry {
            op,
            author_principal_id,
            server_version: self.version,
            accepted_at,
        });
        if self.entries.len() > self.retention {
            self.entries.remove(0);
        }
        self.version
    }

    /// Ordered slice of entries with `server_version > v`.
    pub fn tail_since(&self, v: u64) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.server_version > v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::Operation;

    fn entry(op: Operation) -> (Operation, String, DateTime<Utc>) {
        (op, "alice".to_string(), Utc::now())
    }

    #[test]
    fn append_increments_version_monotonically() {
        let mut log = OperationLog::new(10);
        let (op, author, at) = entry(Operation::insert(0, "a"));
        assert_eq!(log.append(op, author, at), 1);
        let (op, author, at) = entry(Operation::insert(1, "b"));
        assert_eq!(log.append(op, author, at), 2);
        assert_eq!(log.version(), 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn tail_since_excludes_seen_entries() {
        let mut log = OperationLog::new(10);
        let (op, author, at) = entry(Operation::insert(0, "a"));
        log.append(op, author, at);
        let (op, author, at) = entry(Operation::insert(1, "b"));
        log.append(op, author, at);
        let (op, author, at) = entry(Operation::insert(2, "c"));
        log.append(op, author, at);

        let tail: Vec<_> = log.tail_since(1).collect();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].server_version, 2);
        assert_eq!(tail[1].server_version, 3);
    }

    #[test]
    fn retention_window_evicts_oldest_and_reports_floor() {
        let mut log = OperationLog::new(2);
        for i in 0..5 {
            let (op, author, at) = entry(Operation::insert(i, "x"));
            log.append(op, author, at);
        }
        assert_eq!(log.version(), 5);
        assert_eq!(log.len(), 2);
        assert_eq!(log.retained_floor(), 3);
        assert!(log.is_within_retention(3));
        assert!(!log.is_within_retention(2));
    }
}
