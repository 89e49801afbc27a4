//! Tenant interest catalogue.
//!
//! Each tenant publishes the interest ids subscribers may pick from. The
//! directory stores bare ids (`breaking_news`); display options are derived
//! from them.

use crate::directory::DirectoryClient;
use crate::error::Result;

/// One selectable interest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterestOption {
    /// Interest id as stored in profiles.
    pub id: String,
    /// Human-readable label.
    pub label: String,
    /// One-line description for pickers.
    pub description: String,
}

impl InterestOption {
    /// Derives a display option from an interest id.
    ///
    /// Underscores become spaces and the first letter is capitalized:
    /// `breaking_news` becomes "Breaking news".
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        let words = id.replace('_', " ");
        let mut chars = words.chars();
        let label = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
        Self {
            description: format!("Notifications about {words}"),
            label,
            id,
        }
    }
}

/// Reads and writes a tenant's interest catalogue.
#[derive(Debug, Clone)]
pub struct InterestCatalog {
    directory: DirectoryClient,
    tenant_id: String,
}

impl InterestCatalog {
    /// Creates a catalogue accessor for `tenant_id`.
    pub fn new(directory: DirectoryClient, tenant_id: impl Into<String>) -> Self {
        Self {
            directory,
            tenant_id: tenant_id.into(),
        }
    }

    /// The raw interest ids.
    pub async fn ids(&self) -> Result<Vec<String>> {
        self.directory.interests(&self.tenant_id).await
    }

    /// The interest ids as display options, in directory order.
    pub async fn options(&self) -> Result<Vec<InterestOption>> {
        let ids = self.ids().await?;
        log::debug!("Loaded {} interests for tenant {}", ids.len(), self.tenant_id);
        Ok(ids.into_iter().map(InterestOption::from_id).collect())
    }

    /// Replaces the tenant's interest ids.
    pub async fn update(&self, ids: &[String]) -> Result<()> {
        self.directory.update_interests(&self.tenant_id, ids).await?;
        log::info!("Updated {} interests for tenant {}", ids.len(), self.tenant_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn test_option_from_id() {
        let option = InterestOption::from_id("breaking_news");
        assert_eq!(option.id, "breaking_news");
        assert_eq!(option.label, "Breaking news");
        assert_eq!(option.description, "Notifications about breaking news");

        assert_eq!(InterestOption::from_id("").label, "");
    }

    #[tokio::test]
    async fn test_options_and_update() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/applications/T1/interests"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"interests": ["sports", "tech_news"]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/applications/T1/interests"))
            .and(body_json(serde_json::json!({"interests": ["sports"]})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let directory = DirectoryClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let catalog = InterestCatalog::new(directory, "T1");

        let options = catalog.options().await.unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[1].label, "Tech news");

        catalog.update(&["sports".to_string()]).await.unwrap();
    }
}
