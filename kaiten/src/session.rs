//! Session stores: external, append-only conversation history.
//!
//! A [`Session`] persists [`RunItem`]s across runs. The engine only ever
//! appends the not-yet-persisted suffix of the history, using the run
//! state's persisted-count as the cursor, so a store never sees the same
//! item twice from a single run.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::items::RunItem;

/// An append-only item store.
#[async_trait]
pub trait Session: Send + Sync {
    /// The session identifier.
    fn id(&self) -> &str;

    /// Retrieve stored items, newest-last. `limit` returns only the last
    /// `n` items.
    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<RunItem>>;

    /// Append items. Appending an empty slice is a no-op.
    async fn add_items(&self, items: &[RunItem]) -> Result<()>;

    /// Remove all stored items.
    async fn clear(&self) -> Result<()>;
}

/// A shared, reference-counted session.
pub type SharedSession = Arc<dyn Session>;

/// In-memory session backed by `tokio::sync::RwLock<Vec<_>>`.
///
/// Concurrent readers may retrieve history simultaneously; writes acquire
/// exclusive access. All data is lost when the value is dropped. Best suited
/// for tests and short-lived conversations.
#[derive(Debug)]
pub struct InMemorySession {
    id: String,
    items: RwLock<Vec<RunItem>>,
}

impl InMemorySession {
    /// Creates an empty session.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            items: RwLock::new(Vec::new()),
        }
    }

    /// Creates a session pre-populated with `items`.
    #[must_use]
    pub fn with_items(id: impl Into<String>, items: Vec<RunItem>) -> Self {
        Self {
            id: id.into(),
            items: RwLock::new(items),
        }
    }
}

#[async_trait]
impl Session for InMemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<RunItem>> {
        let guard = self.items.read().await;
        match limit {
            Some(n) if n < guard.len() => Ok(guard[guard.len() - n..].to_vec()),
            _ => Ok(guard.clone()),
        }
    }

    async fn add_items(&self, items: &[RunItem]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.items.write().await.extend(items.iter().cloned());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.items.write().await.clear();
        Ok(())
    }
}
