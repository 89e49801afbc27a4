//! On-disk mirror of the last fetched history list.
//!
//! Lets the UI paint something while the authoritative list loads, and
//! backs the offline fallback of [`HistoryStore::fetch`](super::HistoryStore::fetch).
//! The mirror is never authoritative.
//!
//! # Storage structure
//!
//! ```text
//! {cache_dir}/
//!     history-{sha256(token)}.json    # last list seen for that device
//! ```
//!
//! The device token is a credential, so only its digest appears on disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::directory::HistoryEntry;

/// JSON file cache keyed by device token.
#[derive(Debug, Clone)]
pub struct HistoryCache {
    dir: PathBuf,
}

impl HistoryCache {
    /// Creates a cache rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads the mirrored list for `token`, if one was saved.
    pub fn load(&self, token: &str) -> Result<Option<Vec<HistoryEntry>>> {
        let path = self.path_for(token);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).context("Failed to read history cache")?;
        let entries = serde_json::from_str(&content).context("Failed to parse history cache")?;
        Ok(Some(entries))
    }

    /// Replaces the mirrored list for `token`.
    pub fn save(&self, token: &str, entries: &[HistoryEntry]) -> Result<()> {
        fs::create_dir_all(&self.dir).context("Failed to create history cache directory")?;

        let path = self.path_for(token);
        let content =
            serde_json::to_string_pretty(entries).context("Failed to serialize history cache")?;
        fs::write(&path, content).context("Failed to write history cache")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms)
                .context("Failed to set history cache file permissions")?;
        }

        log::debug!("Mirrored {} history entries to {}", entries.len(), path.display());
        Ok(())
    }

    /// Deletes the mirrored list for `token`, if any.
    pub fn remove(&self, token: &str) -> Result<()> {
        let path = self.path_for(token);
        if path.exists() {
            fs::remove_file(&path).context("Failed to remove history cache")?;
        }
        Ok(())
    }

    fn path_for(&self, token: &str) -> PathBuf {
        let digest = Sha256::digest(token.as_bytes());
        self.dir.join(format!("history-{digest:x}.json"))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::directory::Delivery;

    fn entry(id: &str) -> HistoryEntry {
        HistoryEntry {
            id: id.to_string(),
            title: format!("title {id}"),
            body: "body".to_string(),
            delivery: Delivery::Direct {
                token: "tok-abc".to_string(),
            },
            sent_at: Utc.with_ymd_and_hms(2024, 6, 4, 18, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_missing_cache_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HistoryCache::new(dir.path());
        assert!(cache.load("tok-abc").unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HistoryCache::new(dir.path().join("nested"));
        let entries = vec![entry("a"), entry("b")];

        cache.save("tok-abc", &entries).unwrap();
        assert_eq!(cache.load("tok-abc").unwrap(), Some(entries));
        assert!(cache.load("tok-other").unwrap().is_none());

        cache.remove("tok-abc").unwrap();
        assert!(cache.load("tok-abc").unwrap().is_none());
    }

    #[test]
    fn test_file_name_hides_token() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HistoryCache::new(dir.path());
        cache.save("tok-secret", &[]).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("history-"));
        assert!(!names[0].contains("tok-secret"));
    }

    #[cfg(unix)]
    #[test]
    fn test_cache_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cache = HistoryCache::new(dir.path());
        cache.save("tok-abc", &[entry("a")]).unwrap();

        let mode = fs::metadata(cache.path_for("tok-abc")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
