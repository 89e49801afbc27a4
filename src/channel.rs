//! Notification channel descriptors.
//!
//! The renderer is outside the runtime, but the channels it posts to must
//! stay stable across releases (platforms key user preferences by channel
//! id), so they are defined here.

/// Relative interruptiveness of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Importance {
    /// No sound, minimal visual presence.
    Low,
    /// Sound, no heads-up.
    Default,
    /// Sound and heads-up display.
    High,
}

/// A notification channel the host must create before posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationChannel {
    /// Stable channel id.
    pub id: &'static str,
    /// User-visible name.
    pub name: &'static str,
    /// User-visible description, if any.
    pub description: Option<&'static str>,
    /// Importance level.
    pub importance: Importance,
    /// Whether posts show a launcher badge.
    pub show_badge: bool,
}

/// Channel for pushed notifications.
pub const PUSH_CHANNEL: NotificationChannel = NotificationChannel {
    id: "push_notification_channel",
    name: "Push Notification Channel",
    description: None,
    importance: Importance::High,
    show_badge: true,
};

/// Channel for the ongoing notification shown while tracking location.
pub const LOCATION_TRACKING_CHANNEL: NotificationChannel = NotificationChannel {
    id: "location_tracking_channel",
    name: "Location Tracking",
    description: Some("Tracks your location for personalized notifications"),
    importance: Importance::Low,
    show_badge: false,
};

/// Every channel the host should register.
pub fn all() -> [NotificationChannel; 2] {
    [PUSH_CHANNEL, LOCATION_TRACKING_CHANNEL]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_ids_are_distinct() {
        let [push, tracking] = all();
        assert_ne!(push.id, tracking.id);
        assert!(push.importance > tracking.importance);
        assert!(!tracking.show_badge);
    }
}
