//! Request and response bodies for the notification directory API.
//!
//! Field names follow the directory's JSON (camelCase, `userInfo` for the
//! profile, `_id` for history ids).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::profile::SubscriberProfile;

/// Response of `GET /applications/{tenantId}/client-id`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientIdResponse {
    /// Routing id, absent when the tenant has no mapping.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Echo of the tenant id.
    #[serde(default)]
    pub app_id: Option<String>,
}

/// Body of `POST /devices/register`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest<'a> {
    /// Device token.
    pub token: &'a str,
    /// Tenant id.
    pub app_id: &'a str,
    /// Routing id resolved from the tenant id.
    pub client_id: &'a str,
    /// Subscriber profile.
    pub user_info: &'a SubscriberProfile,
}

/// Body of `PUT /devices/update`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDeviceRequest<'a> {
    /// Device token.
    pub token: &'a str,
    /// Replacement profile.
    pub user_info: &'a SubscriberProfile,
}

/// Body of `PUT /devices/update-location`.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateLocationRequest<'a> {
    /// Device token.
    pub token: &'a str,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

/// Response of `GET /devices/me/{token}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecordResponse {
    /// Profile the directory holds for the token.
    pub user_info: SubscriberProfile,
}

/// Body of both interest endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterestsPayload {
    /// Interest ids of the tenant.
    #[serde(default)]
    pub interests: Vec<String>,
}

/// How a history entry was addressed.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Broadcast to every device matching the filter criteria.
    Broadcast {
        /// Filter criteria as stored by the directory (`null` for "everyone").
        filters: serde_json::Value,
    },
    /// Sent to one device token.
    Direct {
        /// Target token.
        token: String,
    },
}

/// A previously delivered notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "HistoryEntryWire", into = "HistoryEntryWire")]
pub struct HistoryEntry {
    /// Server-assigned id.
    pub id: String,
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// Addressing mode and target.
    pub delivery: Delivery,
    /// When the directory sent it.
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryEntryWire {
    #[serde(rename = "_id", alias = "id")]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(rename = "type", alias = "kind", default = "default_kind")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    filters: serde_json::Value,
    sent_at: DateTime<Utc>,
}

fn default_kind() -> String {
    "broadcast".to_string()
}

impl From<HistoryEntryWire> for HistoryEntry {
    fn from(wire: HistoryEntryWire) -> Self {
        let delivery = match (wire.kind.as_str(), wire.token) {
            ("individual" | "direct", Some(token)) => Delivery::Direct { token },
            _ => Delivery::Broadcast {
                filters: wire.filters,
            },
        };
        Self {
            id: wire.id,
            title: wire.title,
            body: wire.body,
            delivery,
            sent_at: wire.sent_at,
        }
    }
}

impl From<HistoryEntry> for HistoryEntryWire {
    fn from(entry: HistoryEntry) -> Self {
        let (kind, token, filters) = match entry.delivery {
            Delivery::Broadcast { filters } => ("broadcast", None, filters),
            Delivery::Direct { token } => ("individual", Some(token), serde_json::Value::Null),
        };
        Self {
            id: entry.id,
            title: entry.title,
            body: entry.body,
            kind: kind.to_string(),
            token,
            filters,
            sent_at: entry.sent_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_entry_from_directory_json() {
        let json = serde_json::json!({
            "_id": "665f1c2e9b",
            "title": "Match tonight",
            "body": "Kickoff at 20:00",
            "type": "broadcast",
            "token": "tok-abc",
            "filters": { "interests": ["sports"] },
            "sentAt": "2024-06-04T18:00:00.000Z",
            "createdAt": "2024-06-04T18:00:00.000Z"
        });

        let entry: HistoryEntry = serde_json::from_value(json).unwrap();
        assert_eq!(entry.id, "665f1c2e9b");
        assert_eq!(
            entry.delivery,
            Delivery::Broadcast {
                filters: serde_json::json!({ "interests": ["sports"] })
            }
        );
        assert_eq!(entry.sent_at.to_rfc3339(), "2024-06-04T18:00:00+00:00");
    }

    #[test]
    fn test_individual_entry_is_direct_delivery() {
        let json = serde_json::json!({
            "id": "a1",
            "title": "Hi",
            "body": "Just you",
            "kind": "individual",
            "token": "tok-abc",
            "sentAt": "2024-06-04T18:00:00Z"
        });

        let entry: HistoryEntry = serde_json::from_value(json).unwrap();
        assert_eq!(
            entry.delivery,
            Delivery::Direct {
                token: "tok-abc".into()
            }
        );

        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back["_id"], "a1");
        assert_eq!(back["type"], "individual");
        assert!(back.get("filters").is_none());
    }

    #[test]
    fn test_client_id_response_tolerates_missing_mapping() {
        let parsed: ClientIdResponse = serde_json::from_str(r#"{"appId":"T1"}"#).unwrap();
        assert!(parsed.client_id.is_none());
        assert_eq!(parsed.app_id.as_deref(), Some("T1"));
    }
}
