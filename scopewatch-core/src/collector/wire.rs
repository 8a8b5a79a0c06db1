//! Wire contract between scopewatch and the collector process
//!
//! Request:
//!
//! ```json
//! {"type": "collector.sync",
//!  "client": {"name": "scopewatch", "version": "0.1.0"},
//!  "captured_at": "2026-03-01T12:00:00Z",
//!  "items": [{"kind": "domain", "value": "lib.edu", "seen_at": "..."}],
//!  "request_id": "6f1c..."}
//! ```
//!
//! Response: any JSON object whose `request_id` equals the request's. Every
//! other field belongs to the collector and is passed through untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::types::Report;

/// Message type of every sync request
pub const SYNC_MESSAGE_TYPE: &str = "collector.sync";

/// `client` object of a sync request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl From<&ClientConfig> for ClientInfo {
    fn from(config: &ClientConfig) -> Self {
        Self {
            name: config.name.clone(),
            version: config.version.clone(),
        }
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

/// One batch sent to the collector
#[derive(Debug, Serialize)]
pub struct SyncRequest<'a> {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub client: &'a ClientInfo,
    pub captured_at: DateTime<Utc>,
    pub items: &'a [Report],
    pub request_id: Uuid,
}

impl<'a> SyncRequest<'a> {
    pub fn new(
        client: &'a ClientInfo,
        captured_at: DateTime<Utc>,
        items: &'a [Report],
        request_id: Uuid,
    ) -> Self {
        Self {
            message_type: SYNC_MESSAGE_TYPE,
            client,
            captured_at,
            items,
            request_id,
        }
    }
}

/// A collector response correlated to our request
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResponse {
    pub request_id: Uuid,
    /// Collector-defined fields (including `request_id`)
    pub body: serde_json::Value,
}

impl SyncResponse {
    /// Accept `message` only if it carries `request_id`.
    ///
    /// Anything else (other ids, missing id, non-objects) is not ours.
    pub fn correlate(message: serde_json::Value, request_id: &Uuid) -> Option<Self> {
        let id = message
            .get("request_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())?;
        if &id != request_id {
            return None;
        }
        Some(Self {
            request_id: id,
            body: message,
        })
    }

    /// The collector's `status` field, if it sent one
    pub fn status(&self) -> Option<&str> {
        self.body.get("status").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let client = ClientInfo {
            name: "scopewatch".to_string(),
            version: "0.1.0".to_string(),
        };
        let captured_at = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let items = vec![Report::domain("lib.edu", captured_at)];
        let request_id = Uuid::new_v4();

        let json = serde_json::to_value(SyncRequest::new(&client, captured_at, &items, request_id))
            .unwrap();

        assert_eq!(json["type"], "collector.sync");
        assert_eq!(json["client"], json!({"name": "scopewatch", "version": "0.1.0"}));
        assert_eq!(json["captured_at"], "2026-03-01T12:00:00Z");
        assert_eq!(json["items"][0]["value"], "lib.edu");
        assert_eq!(json["request_id"], request_id.to_string());
    }

    #[test]
    fn test_correlate_matching_response() {
        let id = Uuid::new_v4();
        let response = SyncResponse::correlate(
            json!({"status": "success", "request_id": id.to_string(), "stored": 3}),
            &id,
        )
        .unwrap();
        assert_eq!(response.request_id, id);
        assert_eq!(response.status(), Some("success"));
        assert_eq!(response.body["stored"], 3);
    }

    #[test]
    fn test_correlate_rejects_other_messages() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert!(SyncResponse::correlate(json!({"request_id": other.to_string()}), &id).is_none());
        assert!(SyncResponse::correlate(json!({"status": "success"}), &id).is_none());
        assert!(SyncResponse::correlate(json!({"request_id": "not-a-uuid"}), &id).is_none());
        assert!(SyncResponse::correlate(json!([id.to_string()]), &id).is_none());
    }
}
