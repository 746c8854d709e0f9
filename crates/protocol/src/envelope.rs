//! Event envelope pushed from the broker to connected apps.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

pub const EVENT_TYPE_APP_STATUS: &str = "AppStatusEvent";
pub const EVENT_TYPE_UPSTREAM_CLUSTER_CHANGED: &str = "UpstreamClusterChangedEvent";

/// CloudEvents-style envelope. `data` carries one of the typed payloads
/// below, serialized as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub id: String,
    /// Originator URI: `app://<uuid>` for app lifecycle, `broker://<id>` for
    /// broker-originated events.
    pub source: String,
    pub r#type: String,
    pub data_content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_schema: Option<String>,
    pub time: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl EventEnvelope {
    pub fn new(
        r#type: impl Into<String>,
        source: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.into(),
            r#type: r#type.into(),
            data_content_type: crate::MIME_APPLICATION_JSON.to_string(),
            data_schema: None,
            time: Utc::now(),
            data,
        }
    }

    /// App lifecycle event, sourced from the app itself.
    pub fn app_status(uuid: &str, status: AppStatus) -> Self {
        Self::new(
            EVENT_TYPE_APP_STATUS,
            format!("app://{uuid}"),
            serde_json::json!({ "id": uuid, "status": status }),
        )
    }

    /// Cluster topology change, sourced from this broker.
    pub fn upstream_cluster_changed(
        broker_id: &str,
        payload: &UpstreamClusterChangedPayload,
    ) -> Self {
        Self::new(
            EVENT_TYPE_UPSTREAM_CLUSTER_CHANGED,
            format!("broker://{broker_id}"),
            serde_json::json!(payload),
        )
    }
}

// ── Payloads ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStatus {
    Connected,
    Serving,
    OutOfService,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppStatusPayload {
    pub id: String,
    pub status: AppStatus,
}

/// Active-broker set announcement. `uris` preserves the ordering supplied by
/// the membership source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamClusterChangedPayload {
    pub group: String,
    pub interface_name: String,
    pub version: u64,
    pub uris: Vec<String>,
}
