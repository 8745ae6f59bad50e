//! EventBus types
//!
//! Event records and the server-push text frames they travel in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of device-origin event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Motion,
    Photo,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Motion => "motion",
            EventKind::Photo => "photo",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device event fanned out to observers
///
/// Serialized with a `type` tag carrying the kind, e.g.
/// `{"type":"motion","device_id":"door-1","message":"...","timestamp":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventRecord {
    Motion {
        device_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    Photo {
        device_id: String,
        filename: String,
        url: String,
        timestamp: DateTime<Utc>,
    },
}

impl EventRecord {
    /// Motion event stamped now
    pub fn motion(device_id: impl Into<String>, message: impl Into<String>) -> Self {
        EventRecord::Motion {
            device_id: device_id.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Photo event stamped now
    pub fn photo(
        device_id: impl Into<String>,
        filename: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        EventRecord::Photo {
            device_id: device_id.into(),
            filename: filename.into(),
            url: url.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            EventRecord::Motion { .. } => EventKind::Motion,
            EventRecord::Photo { .. } => EventKind::Photo,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            EventRecord::Motion { device_id, .. } | EventRecord::Photo { device_id, .. } => {
                device_id
            }
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            EventRecord::Motion { timestamp, .. } | EventRecord::Photo { timestamp, .. } => {
                *timestamp
            }
        }
    }
}

/// Frame written to a subscriber's stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Sent once when the stream opens
    Connected,
    /// Keeps intermediaries from timing out an idle stream
    Heartbeat,
    /// Serialized event payload
    Data(String),
}

impl Frame {
    /// Wrap an event record as a data frame
    pub fn event(record: &EventRecord) -> serde_json::Result<Self> {
        Ok(Frame::Data(serde_json::to_string(record)?))
    }

    /// Encode as `text/event-stream` text
    pub fn encode(&self) -> String {
        match self {
            Frame::Connected => ": connected\n\n".to_string(),
            Frame::Heartbeat => ": heartbeat\n\n".to_string(),
            Frame::Data(json) => format!("data: {}\n\n", json),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_wire_format() {
        let record = EventRecord::motion("door-1", "motion detected");
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["type"], "motion");
        assert_eq!(value["device_id"], "door-1");
        assert_eq!(value["message"], "motion detected");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_photo_wire_format() {
        let record = EventRecord::photo("door-1", "1700000000000-42.jpg", "/uploads/1700000000000-42.jpg");
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["type"], "photo");
        assert_eq!(value["filename"], "1700000000000-42.jpg");
        assert_eq!(value["url"], "/uploads/1700000000000-42.jpg");
        assert_eq!(record.kind(), EventKind::Photo);
    }

    #[test]
    fn test_frame_encoding() {
        assert_eq!(Frame::Connected.encode(), ": connected\n\n");
        assert_eq!(Frame::Heartbeat.encode(), ": heartbeat\n\n");

        let record = EventRecord::motion("door-1", "hi");
        let encoded = Frame::event(&record).unwrap().encode();
        assert!(encoded.starts_with("data: {"));
        assert!(encoded.ends_with("}\n\n"));

        let json = encoded.trim_start_matches("data: ").trim_end();
        let parsed: EventRecord = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, record);
    }
}
