use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of the notification feed.
///
/// `kind` is the backend notification class name (serialized as `type`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl NotificationItem {
    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }

    /// Human-readable line for list output: `data.message`, then `data.title`,
    /// then the notification type.
    pub fn summary(&self) -> &str {
        ["message", "title"]
            .iter()
            .find_map(|key| self.data.get(*key).and_then(Value::as_str))
            .unwrap_or(&self.kind)
    }
}

/// One page of the feed plus the server's unread counter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationPage {
    pub items: Vec<NotificationItem>,
    pub unread: u64,
}

/// Query for `GET /api/notifications`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}
