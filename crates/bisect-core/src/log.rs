// SPDX-License-Identifier: MIT OR Apache-2.0
//! Append-only per-job log store.
//!
//! Each `PUT` appends one chunk; chunks are newline-joined on read, giving
//! callers the familiar "each write is a line" shape described in the
//! scenario walkthroughs. Storage is independent of the job store: logging
//! to an id the job store has never seen (or has since forgotten) is itself
//! a not-found, not a broker invariant violation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

/// Append-only log store keyed by job id.
///
/// Clone is cheap: internally this is an `Arc`-backed handle, so every
/// clone shares the same underlying map.
#[derive(Clone, Default)]
pub struct LogStore {
    chunks: Arc<RwLock<HashMap<Uuid, Vec<String>>>>,
}

impl LogStore {
    /// Construct an empty log store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk of text to `id`'s log, creating the log if this is
    /// its first chunk.
    pub async fn append(&self, id: Uuid, chunk: impl Into<String>) {
        let mut chunks = self.chunks.write().await;
        chunks.entry(id).or_default().push(chunk.into());
    }

    /// Read `id`'s accumulated log as newline-joined text, or `None` if
    /// nothing has ever been appended for this id.
    pub async fn read(&self, id: Uuid) -> Option<String> {
        let chunks = self.chunks.read().await;
        chunks.get(&id).map(|lines| lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_unknown_id_is_none() {
        let store = LogStore::new();
        assert!(store.read(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn appended_chunks_join_with_newlines_in_order() {
        let store = LogStore::new();
        let id = Uuid::new_v4();
        store.append(id, "line 1").await;
        store.append(id, "line 2").await;
        store.append(id, "line 3").await;
        let log = store.read(id).await.unwrap();
        assert_eq!(log, "line 1\nline 2\nline 3");
        assert_eq!(log.split('\n').collect::<Vec<_>>(), vec!["line 1", "line 2", "line 3"]);
    }

    #[tokio::test]
    async fn logs_for_distinct_ids_are_independent() {
        let store = LogStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.append(a, "from a").await;
        store.append(b, "from b").await;
        assert_eq!(store.read(a).await.unwrap(), "from a");
        assert_eq!(store.read(b).await.unwrap(), "from b");
    }
}
