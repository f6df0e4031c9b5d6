//! `/api/notifications` endpoints and the parsing boundary for feed payloads.
//!
//! Bodies may or may not be wrapped in a `data` envelope and fields are not
//! guaranteed to be present or well-typed. Everything is mapped into the
//! strict [`NotificationItem`] model here, defaulting on shape mismatches.

use anyhow::Result;
use cfp_types::{NotificationItem, NotificationPage, NotificationQuery};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::http::ApiClient;

/// Type assigned to items that do not name one.
pub const DEFAULT_NOTIFICATION_TYPE: &str = "notification";

#[derive(Clone)]
pub struct NotificationsApi {
    client: ApiClient,
}

impl NotificationsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Latest page of the feed plus the unread counter.
    ///
    /// # Errors
    /// Returns the normalized backend error on failure. Shape problems in a
    /// successful body are not errors; they default.
    pub async fn list(&self, query: &NotificationQuery) -> Result<NotificationPage> {
        let body: Value = self
            .client
            .get_json_with_query("/api/notifications", query)
            .await?;
        Ok(parse_page(body))
    }

    /// Marks every notification read. Returns the server's `ok` flag
    /// (true when absent).
    ///
    /// # Errors
    /// Returns the normalized backend error on failure.
    pub async fn read_all(&self) -> Result<bool> {
        let body: Value = self.client.post_empty("/api/notifications/read-all").await?;
        let body = unwrap_envelope(body);
        Ok(body.get("ok").and_then(Value::as_bool).unwrap_or(true))
    }

    /// Authoritative unread counter.
    ///
    /// # Errors
    /// Returns the normalized backend error on failure.
    pub async fn unread_count(&self) -> Result<u64> {
        let body: Value = self
            .client
            .get_json("/api/notifications/unread-count")
            .await?;
        let body = unwrap_envelope(body);
        Ok(parse_count(body.get("unread")))
    }
}

/// Strips an optional `{ "data": ... }` envelope.
pub fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Maps a list body into a page. Non-array `items` become empty, items
/// without an id are dropped, a missing or non-numeric `unread` becomes 0.
pub fn parse_page(body: Value) -> NotificationPage {
    let body = unwrap_envelope(body);

    let items = body
        .get("items")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_item).collect())
        .unwrap_or_default();

    NotificationPage {
        items,
        unread: parse_count(body.get("unread")),
    }
}

/// Parses one stored notification.
pub fn parse_item(value: &Value) -> Option<NotificationItem> {
    let object = value.as_object()?;
    let id = parse_id(object.get("id"))?;

    Some(NotificationItem {
        id,
        kind: parse_kind(object.get("type")),
        created_at: object.get("created_at").and_then(parse_timestamp),
        read_at: object.get("read_at").and_then(parse_timestamp),
        data: object
            .get("data")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
    })
}

/// Builds a feed item from a real-time push payload.
///
/// Pushes are always unread and stamped with the arrival time. A payload
/// without an id gets a fresh one; the whole payload becomes `data`.
pub fn item_from_push(payload: &Value, received_at: DateTime<Utc>) -> NotificationItem {
    let id = parse_id(payload.get("id")).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    NotificationItem {
        id,
        kind: parse_kind(payload.get("type")),
        created_at: Some(received_at),
        read_at: None,
        data: payload.as_object().cloned().unwrap_or_else(Map::new),
    }
}

fn parse_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_kind(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_NOTIFICATION_TYPE)
        .to_string()
}

fn parse_count(value: Option<&Value>) -> u64 {
    value
        .and_then(|v| {
            v.as_u64()
                .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
        })
        .unwrap_or(0)
}

/// RFC 3339, falling back to the backend's `Y-m-d H:i:s` format in UTC.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_page_plain_body() {
        let page = parse_page(json!({
            "items": [
                {"id": "a", "type": "ProposalReviewed", "created_at": "2025-03-01T10:00:00.000000Z", "read_at": null, "data": {"proposal_id": 4}},
                {"id": "b", "type": "ProposalApproved", "read_at": "2025-03-02 08:30:00", "data": {}}
            ],
            "unread": 1
        }));

        assert_eq!(page.unread, 1);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, "a");
        assert!(page.items[0].created_at.is_some());
        assert!(page.items[0].is_unread());
        assert_eq!(page.items[0].data["proposal_id"], 4);
        assert!(!page.items[1].is_unread());
    }

    #[test]
    fn test_parse_page_unwraps_data_envelope() {
        let page = parse_page(json!({"data": {"items": [{"id": "x"}], "unread": 3}}));
        assert_eq!(page.unread, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].kind, DEFAULT_NOTIFICATION_TYPE);
    }

    #[test]
    fn test_parse_page_defaults_on_bad_shapes() {
        let page = parse_page(json!({"items": "nope", "unread": "seven"}));
        assert!(page.items.is_empty());
        assert_eq!(page.unread, 0);

        let page = parse_page(json!(null));
        assert_eq!(page, NotificationPage::default());

        let page = parse_page(json!({"items": [], "unread": -4}));
        assert_eq!(page.unread, 0);
    }

    #[test]
    fn test_items_without_id_are_dropped() {
        let page = parse_page(json!({"items": [{"type": "x"}, {"id": ""}, {"id": 12}, 5]}));
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "12");
    }

    #[test]
    fn test_unparseable_timestamp_becomes_none() {
        let item = parse_item(&json!({"id": "a", "read_at": "yesterday"})).unwrap();
        assert!(item.read_at.is_none());
        assert!(item.is_unread());
    }

    #[test]
    fn test_item_from_push_keeps_payload() {
        let now = Utc::now();
        let item = item_from_push(&json!({"id": "n1", "type": "x", "title": "Hi"}), now);
        assert_eq!(item.id, "n1");
        assert_eq!(item.kind, "x");
        assert_eq!(item.created_at, Some(now));
        assert!(item.read_at.is_none());
        assert_eq!(item.data["title"], "Hi");
    }

    #[test]
    fn test_item_from_push_synthesizes_id() {
        let item = item_from_push(&json!({"message": "no id"}), Utc::now());
        assert!(!item.id.is_empty());
        assert_eq!(item.kind, DEFAULT_NOTIFICATION_TYPE);

        let other = item_from_push(&json!({"message": "no id"}), Utc::now());
        assert_ne!(item.id, other.id);
    }
}
