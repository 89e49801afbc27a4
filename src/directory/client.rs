//! HTTP client for the notification directory.
//!
//! This module provides [`DirectoryClient`], which handles all HTTP
//! communication with the directory backend. It performs no retries and no
//! caching; it only maps transport and status failures into [`Error`].

use std::time::Duration;

use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;

use super::types::{
    ClientIdResponse, DeviceRecordResponse, HistoryEntry, InterestsPayload, RegisterDeviceRequest,
    UpdateDeviceRequest, UpdateLocationRequest,
};
use crate::constants::redact_token;
use crate::error::{Error, Result};

/// API client for the notification directory.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    client: Client,
    base_url: Url,
}

impl DirectoryClient {
    /// Creates a new client for `server_url` with the given transport timeout.
    ///
    /// The timeout is used both as connect timeout and as whole-request
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if the URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::NotInitialized(format!("HTTP client: {e}")))?;
        Self::with_client(client, server_url)
    }

    /// Creates a client with a pre-configured HTTP client.
    ///
    /// Useful for testing or when custom client configuration is needed.
    pub fn with_client(client: Client, server_url: &str) -> Result<Self> {
        let base_url = Url::parse(server_url)
            .map_err(|e| Error::NotInitialized(format!("invalid server url '{server_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::NotInitialized(format!(
                "server url '{server_url}' cannot carry a path"
            )));
        }
        Ok(Self { client, base_url })
    }

    /// Returns the base URL.
    pub fn server_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Looks up the routing id for a tenant (`GET /applications/{id}/client-id`).
    pub async fn client_id(&self, tenant_id: &str) -> Result<ClientIdResponse> {
        let url = self.endpoint(&["applications", tenant_id, "client-id"])?;
        log::debug!("Resolving routing id for tenant {tenant_id}");
        let response = self.client.get(url).send().await?;
        decode(check_status(response).await?).await
    }

    /// Creates the device record (`POST /devices/register`).
    pub async fn register_device(&self, request: &RegisterDeviceRequest<'_>) -> Result<()> {
        let url = self.endpoint(&["devices", "register"])?;
        log::debug!(
            "Registering device token={} tenant={} client={}",
            redact_token(request.token),
            request.app_id,
            request.client_id
        );
        let response = self.client.post(url).json(request).send().await?;
        check_status(response).await.map(drop)
    }

    /// Replaces the stored profile (`PUT /devices/update`).
    pub async fn update_device(&self, request: &UpdateDeviceRequest<'_>) -> Result<()> {
        let url = self.endpoint(&["devices", "update"])?;
        let response = self.client.put(url).json(request).send().await?;
        check_status(response).await.map(drop)
    }

    /// Updates only the stored position (`PUT /devices/update-location`).
    pub async fn update_location(&self, request: &UpdateLocationRequest<'_>) -> Result<()> {
        let url = self.endpoint(&["devices", "update-location"])?;
        let response = self.client.put(url).json(request).send().await?;
        check_status(response).await.map(drop)
    }

    /// Deletes the device record (`DELETE /devices/unregister/{token}`).
    pub async fn unregister_device(&self, token: &str) -> Result<()> {
        let url = self.endpoint(&["devices", "unregister", token])?;
        let response = self.client.delete(url).send().await?;
        check_status(response).await.map(drop)
    }

    /// Reads the device record (`GET /devices/me/{token}`).
    ///
    /// A 404 means the token is not registered.
    pub async fn device_record(&self, token: &str) -> Result<DeviceRecordResponse> {
        let url = self.endpoint(&["devices", "me", token])?;
        let response = self.client.get(url).send().await?;
        decode(check_status(response).await?).await
    }

    /// Fetches delivered notifications (`GET /notifications/history/{token}`).
    pub async fn history(&self, token: &str) -> Result<Vec<HistoryEntry>> {
        let url = self.endpoint(&["notifications", "history", token])?;
        let response = self.client.get(url).send().await?;
        decode(check_status(response).await?).await
    }

    /// Deletes one history entry (`DELETE /notifications/{id}`).
    pub async fn delete_history_entry(&self, entry_id: &str) -> Result<()> {
        let url = self.endpoint(&["notifications", entry_id])?;
        let response = self.client.delete(url).send().await?;
        check_status(response).await.map(drop)
    }

    /// Fetches the tenant's interest catalogue (`GET /applications/{id}/interests`).
    pub async fn interests(&self, app_id: &str) -> Result<Vec<String>> {
        let url = self.endpoint(&["applications", app_id, "interests"])?;
        let response = self.client.get(url).send().await?;
        let payload: InterestsPayload = decode(check_status(response).await?).await?;
        Ok(payload.interests)
    }

    /// Replaces the tenant's interest catalogue (`PUT /applications/{id}/interests`).
    pub async fn update_interests(&self, app_id: &str, interests: &[String]) -> Result<()> {
        let url = self.endpoint(&["applications", app_id, "interests"])?;
        let payload = InterestsPayload {
            interests: interests.to_vec(),
        };
        let response = self.client.put(url).json(&payload).send().await?;
        check_status(response).await.map(drop)
    }

    /// Joins percent-encoded path segments onto the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::NotInitialized("server url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Turns a non-2xx response into [`Error::ServerError`].
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    log::debug!("Directory returned {status}: {body}");
    Err(Error::ServerError {
        code: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| Error::MalformedResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_client_creation() {
        let client = DirectoryClient::new("https://example.com/api", Duration::from_secs(5));
        assert!(client.is_ok());
        assert_eq!(client.unwrap().server_url(), "https://example.com/api");
    }

    #[test]
    fn test_invalid_server_url_is_not_initialized() {
        let err = DirectoryClient::new("not a url", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, Error::NotInitialized(_)));

        let err = DirectoryClient::new("mailto:ops@example.com", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, Error::NotInitialized(_)));
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = DirectoryClient::new("https://example.com/api/", Duration::from_secs(5)).unwrap();
        let url = client.endpoint(&["devices", "me", "tok/with space"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/api/devices/me/tok%2Fwith%20space"
        );
    }
}
