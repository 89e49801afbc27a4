//! Device token acquisition.
//!
//! The push transport provider owns the device token and may rotate it at any
//! time. The runtime never stores the token; every chain asks the provider
//! for the current value.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Supplies the current device token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns the current device token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenUnavailable`] if the provider cannot yield one.
    async fn current_token(&self) -> Result<String>;
}

/// A token provider backed by an in-memory value.
///
/// Used by the `pushreg` binary (token from the command line) and by tests.
/// Clones share the value, so [`rotate`](Self::rotate) on one clone is seen
/// by all.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Arc<RwLock<Option<String>>>,
}

impl StaticTokenProvider {
    /// Creates a provider that yields `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(Some(token.into()))),
        }
    }

    /// Creates a provider that has no token yet.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Replaces the token, simulating a provider rotation.
    pub fn rotate(&self, token: impl Into<String>) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(token.into());
    }

    /// Forgets the token; subsequent calls fail with `TokenUnavailable`.
    pub fn clear(&self) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn current_token(&self) -> Result<String> {
        let guard = self.token.read().unwrap_or_else(|e| e.into_inner());
        guard
            .clone()
            .ok_or_else(|| Error::TokenUnavailable("no device token issued yet".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_rotation_is_shared() {
        let provider = StaticTokenProvider::new("tok-abc");
        let clone = provider.clone();
        assert_eq!(provider.current_token().await.unwrap(), "tok-abc");

        clone.rotate("tok-def");
        assert_eq!(provider.current_token().await.unwrap(), "tok-def");
    }

    #[tokio::test]
    async fn test_empty_provider_is_unavailable() {
        let provider = StaticTokenProvider::empty();
        let err = provider.current_token().await.unwrap_err();
        assert!(matches!(err, Error::TokenUnavailable(_)));
        assert!(err.is_transient());

        provider.rotate("tok");
        provider.clear();
        assert!(provider.current_token().await.is_err());
    }
}
