//! Notification history with optimistic deletes.

use std::sync::{Arc, Mutex, MutexGuard};

use super::HistoryCache;
use crate::constants::redact_token;
use crate::directory::{DirectoryClient, HistoryEntry};
use crate::error::{Error, Result};
use crate::token::TokenProvider;

/// Outcome of a history fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryView {
    /// The directory's current list.
    Fresh(Vec<HistoryEntry>),
    /// The fetch failed; this is the last list seen for the device.
    Cached {
        /// Previously fetched entries.
        entries: Vec<HistoryEntry>,
        /// Why the fresh fetch failed.
        error: Error,
    },
    /// The directory does not know the device token.
    Unregistered,
}

impl HistoryView {
    /// The entries to display. Empty for `Unregistered`.
    pub fn entries(&self) -> &[HistoryEntry] {
        match self {
            Self::Fresh(entries) | Self::Cached { entries, .. } => entries,
            Self::Unregistered => &[],
        }
    }
}

#[derive(Debug, Default)]
struct Loaded {
    token: Option<String>,
    entries: Vec<HistoryEntry>,
    // Bumped whenever a fetch replaces the list.
    generation: u64,
}

/// An entry taken out of the list while its remote delete runs.
struct Removed {
    index: usize,
    entry: HistoryEntry,
    token: Option<String>,
    generation: u64,
    before: Option<String>,
    after: Option<String>,
}

impl Removed {
    /// Where the entry goes back: next to a surviving neighbour, else its
    /// old index clamped to the current length.
    fn position_in(&self, entries: &[HistoryEntry]) -> usize {
        let find = |id: &Option<String>| {
            id.as_deref()
                .and_then(|id| entries.iter().position(|e| e.id == id))
        };
        if let Some(next) = find(&self.after) {
            return next;
        }
        if let Some(prev) = find(&self.before) {
            return prev + 1;
        }
        self.index.min(entries.len())
    }
}

/// Fetches, mirrors and deletes delivered notifications.
///
/// The in-memory list belongs to the last fetched token. Its lock is never
/// held across a network call.
pub struct HistoryStore {
    directory: DirectoryClient,
    tokens: Arc<dyn TokenProvider>,
    cache: Option<HistoryCache>,
    loaded: Mutex<Loaded>,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("cache", &self.cache)
            .field("entries", &self.lock().entries.len())
            .finish_non_exhaustive()
    }
}

impl HistoryStore {
    /// Creates a store. Without a cache, only the in-memory list backs the
    /// offline fallback.
    pub fn new(
        directory: DirectoryClient,
        tokens: Arc<dyn TokenProvider>,
        cache: Option<HistoryCache>,
    ) -> Self {
        Self {
            directory,
            tokens,
            cache,
            loaded: Mutex::new(Loaded::default()),
        }
    }

    /// The last list seen for `token`, for painting while a fetch runs.
    ///
    /// Empty if nothing was ever fetched for it.
    pub fn placeholder(&self, token: &str) -> Vec<HistoryEntry> {
        self.previous(token).unwrap_or_default()
    }

    /// Snapshot of the in-memory list.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.lock().entries.clone()
    }

    /// Fetches the history of the provider's current token.
    pub async fn fetch_current(&self) -> Result<HistoryView> {
        let token = self.tokens.current_token().await?;
        self.fetch(&token).await
    }

    /// Fetches the authoritative history of `token`.
    ///
    /// The directory is first asked whether it knows the token at all.
    ///
    /// # Errors
    ///
    /// Returns the fetch error only when no earlier list exists to fall back
    /// on; otherwise the failure is reported inside [`HistoryView::Cached`].
    pub async fn fetch(&self, token: &str) -> Result<HistoryView> {
        match self.directory.device_record(token).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                log::info!("Device {} is not registered, no history", redact_token(token));
                self.forget(token);
                return Ok(HistoryView::Unregistered);
            }
            Err(e) => return self.fall_back(token, e),
        }

        let entries = match self.directory.history(token).await {
            Ok(entries) => entries,
            Err(e) => return self.fall_back(token, e),
        };

        log::debug!("Fetched {} history entries", entries.len());
        {
            let mut loaded = self.lock();
            loaded.token = Some(token.to_string());
            loaded.entries = entries.clone();
            loaded.generation += 1;
        }
        self.mirror(token, &entries);
        Ok(HistoryView::Fresh(entries))
    }

    /// Deletes an entry.
    ///
    /// The entry leaves the in-memory list immediately. If the directory
    /// refuses, it is put back between its old neighbours and the error is
    /// returned. A fetch that replaced the list in the meantime wins; the
    /// entry is then not reinserted.
    pub async fn delete(&self, entry_id: &str) -> Result<()> {
        let removed = {
            let mut loaded = self.lock();
            let position = loaded.entries.iter().position(|e| e.id == entry_id);
            position.map(|index| {
                let before = index
                    .checked_sub(1)
                    .map(|prev| loaded.entries[prev].id.clone());
                let after = loaded.entries.get(index + 1).map(|next| next.id.clone());
                Removed {
                    index,
                    entry: loaded.entries.remove(index),
                    token: loaded.token.clone(),
                    generation: loaded.generation,
                    before,
                    after,
                }
            })
        };

        match self.directory.delete_history_entry(entry_id).await {
            Ok(()) => {
                log::info!("Deleted history entry {entry_id}");
                if let Some(Removed { token: Some(token), .. }) = &removed {
                    let entries = self.entries();
                    self.mirror(token, &entries);
                }
                Ok(())
            }
            Err(e) => {
                log::warn!("Failed to delete history entry {entry_id}: {e}");
                if let Some(removed) = removed {
                    self.restore(removed);
                }
                Err(e)
            }
        }
    }

    fn restore(&self, removed: Removed) {
        let mut loaded = self.lock();
        if loaded.token != removed.token || loaded.generation != removed.generation {
            log::debug!("History list was refreshed, not restoring {}", removed.entry.id);
            return;
        }
        if loaded.entries.iter().any(|e| e.id == removed.entry.id) {
            return;
        }
        let at = removed.position_in(&loaded.entries);
        loaded.entries.insert(at, removed.entry);
    }

    fn fall_back(&self, token: &str, error: Error) -> Result<HistoryView> {
        match self.previous(token) {
            Some(entries) => {
                log::warn!("History fetch failed ({error}), showing {} cached entries", entries.len());
                Ok(HistoryView::Cached { entries, error })
            }
            None => {
                log::warn!("History fetch failed ({error}), nothing cached");
                Err(error)
            }
        }
    }

    /// The last list for `token`: in memory first, then on disk.
    fn previous(&self, token: &str) -> Option<Vec<HistoryEntry>> {
        {
            let loaded = self.lock();
            if loaded.token.as_deref() == Some(token) {
                return Some(loaded.entries.clone());
            }
        }
        let cache = self.cache.as_ref()?;
        match cache.load(token) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Ignoring unreadable history cache: {e:#}");
                None
            }
        }
    }

    fn forget(&self, token: &str) {
        {
            let mut loaded = self.lock();
            if loaded.token.as_deref() == Some(token) {
                loaded.token = None;
                loaded.entries.clear();
                loaded.generation += 1;
            }
        }
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.remove(token) {
                log::warn!("Failed to drop history cache: {e:#}");
            }
        }
    }

    fn mirror(&self, token: &str, entries: &[HistoryEntry]) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.save(token, entries) {
                log::warn!("Failed to mirror history: {e:#}");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Loaded> {
        self.loaded.lock().unwrap_or_else(|e| e.into_inner())
    }
}
