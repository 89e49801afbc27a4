//! Tenant id to routing id resolution.
//!
//! The directory addresses devices by a routing ("client") id derived from
//! the tenant id. The mapping is fixed for the lifetime of the process, so
//! the first successful lookup is cached.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::directory::DirectoryClient;
use crate::error::{Error, Result};

/// Resolves and caches routing ids.
#[derive(Debug)]
pub struct IdentityResolver {
    directory: DirectoryClient,
    // Held across the lookup so concurrent first calls share one round trip.
    cache: Mutex<HashMap<String, String>>,
}

impl IdentityResolver {
    /// Creates a resolver with an empty cache.
    pub fn new(directory: DirectoryClient) -> Self {
        Self {
            directory,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the routing id for `tenant_id`.
    ///
    /// The first call for a tenant performs the remote lookup; later calls
    /// are answered from the cache. Failures are not cached.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTenantId`] if the directory has no mapping
    /// - [`Error::NetworkFailure`] / [`Error::ServerError`] otherwise
    pub async fn resolve_routing_id(&self, tenant_id: &str) -> Result<String> {
        let mut cache = self.cache.lock().await;
        if let Some(routing_id) = cache.get(tenant_id) {
            return Ok(routing_id.clone());
        }

        log::debug!("Routing id for tenant {tenant_id} not cached, asking directory");
        let response = match self.directory.client_id(tenant_id).await {
            Ok(response) => response,
            Err(err) if err.is_not_found() => {
                return Err(Error::InvalidTenantId(tenant_id.to_string()))
            }
            Err(err) => return Err(err),
        };

        let routing_id = response
            .client_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::InvalidTenantId(tenant_id.to_string()))?;

        log::info!("Tenant {tenant_id} routes via {routing_id}");
        cache.insert(tenant_id.to_string(), routing_id.clone());
        Ok(routing_id)
    }

    /// Returns the cached routing id without touching the network.
    pub async fn cached(&self, tenant_id: &str) -> Option<String> {
        self.cache.lock().await.get(tenant_id).cloned()
    }

    /// Drops the cached routing id for `tenant_id`.
    pub async fn invalidate(&self, tenant_id: &str) {
        self.cache.lock().await.remove(tenant_id);
    }
}
