use chrono::{DateTime, Utc};
use serde::Serialize;

/// Events delivered to viewers of a room through the broadcast hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum RoomEvent {
    /// The room went live or offline.
    #[serde(rename_all = "camelCase")]
    StatusUpdate {
        is_active: bool,
        /// Seconds since epoch
        timestamp: i64,
    },
}

impl RoomEvent {
    pub fn status(is_active: bool, at: DateTime<Utc>) -> Self {
        Self::StatusUpdate {
            is_active,
            timestamp: at.timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_updates_serialize_deterministically() {
        let event = RoomEvent::StatusUpdate {
            is_active: true,
            timestamp: 1700000000,
        };

        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"status-update","isActive":true,"timestamp":1700000000}"#
        );
    }
}
