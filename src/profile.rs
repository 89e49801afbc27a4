//! Subscriber profile model.
//!
//! A profile is replaced wholesale on every update. The only partial write is
//! the position patch performed after a location-only update.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl GeoPosition {
    /// Creates a position from latitude and longitude.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Demographic, interest and position data associated with a device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "ProfileWire", into = "ProfileWire")]
pub struct SubscriberProfile {
    /// Stable, externally assigned subscriber id.
    pub subscriber_id: String,
    /// Optional gender attribute.
    pub gender: Option<String>,
    /// Optional age attribute.
    pub age: Option<u32>,
    /// Interest tags (unordered, unique).
    pub interests: BTreeSet<String>,
    /// Last known position, if any.
    pub position: Option<GeoPosition>,
    /// Whether the subscriber opted into location-based notifications.
    ///
    /// Local only; never sent to the directory.
    pub location_updates: bool,
}

impl SubscriberProfile {
    /// Creates an empty profile for the given subscriber id.
    pub fn new(subscriber_id: impl Into<String>) -> Self {
        Self {
            subscriber_id: subscriber_id.into(),
            ..Self::default()
        }
    }

    /// Sets the gender attribute.
    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    /// Sets the age attribute.
    pub fn with_age(mut self, age: u32) -> Self {
        self.age = Some(age);
        self
    }

    /// Adds interest tags. Duplicates collapse.
    pub fn with_interests<I, S>(mut self, interests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interests.extend(interests.into_iter().map(Into::into));
        self
    }

    /// Sets the position.
    pub fn with_position(mut self, lat: f64, lng: f64) -> Self {
        self.position = Some(GeoPosition::new(lat, lng));
        self
    }

    /// Opts the profile into location-based notifications.
    pub fn with_location_updates(mut self, enabled: bool) -> Self {
        self.location_updates = enabled;
        self
    }
}

/// Shape the directory stores under `userInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileWire {
    #[serde(default)]
    user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    age: Option<u32>,
    #[serde(default)]
    interests: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lng: Option<f64>,
    // The directory nests position under `location` when it echoes a record.
    #[serde(default, skip_serializing)]
    location: Option<GeoPosition>,
}

impl From<ProfileWire> for SubscriberProfile {
    fn from(wire: ProfileWire) -> Self {
        let position = match (wire.lat, wire.lng) {
            (Some(lat), Some(lng)) => Some(GeoPosition { lat, lng }),
            _ => wire.location,
        };
        Self {
            subscriber_id: wire.user_id,
            // The directory stores "" for a missing gender.
            gender: wire.gender.filter(|g| !g.is_empty()),
            age: wire.age,
            interests: wire.interests.into_iter().collect(),
            position,
            location_updates: false,
        }
    }
}

impl From<SubscriberProfile> for ProfileWire {
    fn from(profile: SubscriberProfile) -> Self {
        Self {
            user_id: profile.subscriber_id,
            gender: profile.gender,
            age: profile.age,
            interests: profile.interests.into_iter().collect(),
            lat: profile.position.map(|p| p.lat),
            lng: profile.position.map(|p| p.lng),
            location: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_serializes_to_directory_shape() {
        let profile = SubscriberProfile::new("u1")
            .with_interests(["sports"])
            .with_position(32.0, 34.7)
            .with_location_updates(true);

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "userId": "u1",
                "interests": ["sports"],
                "lat": 32.0,
                "lng": 34.7
            })
        );
    }

    #[test]
    fn test_interests_are_unique_and_sorted() {
        let profile = SubscriberProfile::new("u1").with_interests(["tech", "sports", "tech"]);
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["interests"], serde_json::json!(["sports", "tech"]));
    }

    #[test]
    fn test_nested_location_from_directory_record() {
        let json = serde_json::json!({
            "userId": "u2",
            "gender": "",
            "age": 31,
            "interests": ["politics"],
            "location": { "lat": 1.5, "lng": 2.5 }
        });
        let profile: SubscriberProfile = serde_json::from_value(json).unwrap();
        assert_eq!(profile.subscriber_id, "u2");
        assert_eq!(profile.gender, None);
        assert_eq!(profile.age, Some(31));
        assert_eq!(profile.position, Some(GeoPosition::new(1.5, 2.5)));
        assert!(!profile.location_updates);
    }
}
