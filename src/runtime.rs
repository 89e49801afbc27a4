//! Runtime construction.
//!
//! [`Runtime`] is the explicitly constructed context that owns every
//! component. There is no global state; a host builds one runtime and hands
//! out references (or clones of the coordinator) as needed.
//!
//! # Example
//!
//! ```ignore
//! let (prompter, prompts) = ChannelPrompter::new(true);
//! let runtime = Runtime::builder(config)
//!     .token_provider(Arc::new(StaticTokenProvider::new("tok-abc")))
//!     .prompter(Arc::new(prompter))
//!     .location_source(Arc::new(gps))
//!     .build()?;
//!
//! runtime.coordinator().register_gated(profile).await;
//! ```

use std::sync::Arc;

use crate::config::Config;
use crate::coordinator::service::{CoordinatorService, ServiceDeps};
use crate::coordinator::RegistrationCoordinator;
use crate::directory::DirectoryClient;
use crate::error::{Error, Result};
use crate::history::{HistoryCache, HistoryStore};
use crate::identity::IdentityResolver;
use crate::interests::InterestCatalog;
use crate::location::LocationSource;
use crate::permission::{PermissionGateway, PermissionPrompter};
use crate::token::TokenProvider;

/// Builder for [`Runtime`].
pub struct RuntimeBuilder {
    config: Config,
    tokens: Option<Arc<dyn TokenProvider>>,
    prompter: Option<Arc<dyn PermissionPrompter>>,
    location_source: Option<Arc<dyn LocationSource>>,
}

impl std::fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("config", &self.config)
            .field("has_token_provider", &self.tokens.is_some())
            .field("has_prompter", &self.prompter.is_some())
            .field("has_location_source", &self.location_source.is_some())
            .finish()
    }
}

impl RuntimeBuilder {
    /// Sets the push provider's token source. Required.
    #[must_use]
    pub fn token_provider(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Sets the OS permission bridge. Required.
    #[must_use]
    pub fn prompter(mut self, prompter: Arc<dyn PermissionPrompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Sets the platform location provider. Without one, location tracking
    /// is unavailable.
    #[must_use]
    pub fn location_source(mut self, source: Arc<dyn LocationSource>) -> Self {
        self.location_source = Some(source);
        self
    }

    /// Wires the components and spawns the coordinator task.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] if the tenant id, token provider or prompter
    /// is missing, or the server URL is invalid.
    pub fn build(self) -> Result<Runtime> {
        let config = self.config;
        let tenant_id = config
            .tenant_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::NotInitialized("tenant id not configured".into()))?;
        let tokens = self
            .tokens
            .ok_or_else(|| Error::NotInitialized("token provider not set".into()))?;
        let prompter = self
            .prompter
            .ok_or_else(|| Error::NotInitialized("permission prompter not set".into()))?;

        let directory = DirectoryClient::new(&config.server_url, config.request_timeout())?;
        let identity = Arc::new(IdentityResolver::new(directory.clone()));
        let gateway = Arc::new(PermissionGateway::new(prompter));

        let handle = CoordinatorService::start(ServiceDeps {
            tenant_id: tenant_id.clone(),
            directory: directory.clone(),
            identity: Arc::clone(&identity),
            tokens: Arc::clone(&tokens),
            force_local_reset: config.force_local_reset,
        });
        let coordinator = RegistrationCoordinator::new(
            handle,
            Arc::clone(&gateway),
            self.location_source,
            config.tracker_config(),
        );

        let cache = config.resolved_cache_dir().map(HistoryCache::new);
        if cache.is_none() {
            log::warn!("No cache directory available, history will not be mirrored");
        }
        let history = HistoryStore::new(directory.clone(), tokens, cache);
        let interests = InterestCatalog::new(directory.clone(), tenant_id);

        log::debug!("Runtime built against {}", directory.server_url());
        Ok(Runtime {
            config,
            directory,
            identity,
            gateway,
            coordinator,
            history,
            interests,
        })
    }
}

/// The registration runtime.
#[derive(Debug)]
pub struct Runtime {
    config: Config,
    directory: DirectoryClient,
    identity: Arc<IdentityResolver>,
    gateway: Arc<PermissionGateway>,
    coordinator: RegistrationCoordinator,
    history: HistoryStore,
    interests: InterestCatalog,
}

impl Runtime {
    /// Starts building a runtime from `config`.
    pub fn builder(config: Config) -> RuntimeBuilder {
        RuntimeBuilder {
            config,
            tokens: None,
            prompter: None,
            location_source: None,
        }
    }

    /// The configuration the runtime was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The directory client.
    pub fn directory(&self) -> &DirectoryClient {
        &self.directory
    }

    /// The routing id resolver.
    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    /// The permission gateway; hosts deliver OS replies to it.
    pub fn permissions(&self) -> &Arc<PermissionGateway> {
        &self.gateway
    }

    /// The registration coordinator.
    pub fn coordinator(&self) -> &RegistrationCoordinator {
        &self.coordinator
    }

    /// The notification history store.
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// The tenant interest catalogue.
    pub fn interests(&self) -> &InterestCatalog {
        &self.interests
    }

    /// Stops tracking and the coordinator task.
    pub async fn shutdown(&self) -> Result<()> {
        self.coordinator.stop_tracking();
        self.coordinator.handle().shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::ChannelPrompter;
    use crate::token::StaticTokenProvider;

    #[tokio::test]
    async fn test_build_requires_tenant_id() {
        let (prompter, _rx) = ChannelPrompter::new(false);
        let err = Runtime::builder(Config::default())
            .token_provider(Arc::new(StaticTokenProvider::new("tok")))
            .prompter(Arc::new(prompter))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::NotInitialized(_)));
    }

    #[tokio::test]
    async fn test_build_requires_collaborators() {
        let config = Config {
            tenant_id: Some("T1".into()),
            ..Config::default()
        };
        let err = Runtime::builder(config).build().unwrap_err();
        assert_eq!(err, Error::NotInitialized("token provider not set".into()));
    }
}
