//! App descriptor carried in the setup payload.

use std::collections::HashMap;

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

// Reserved metadata keys owned by the broker. Values a client supplies under
// these keys are discarded during admission and rewritten from the
// authenticated principal.
pub const METADATA_KEY_ORGS: &str = "_orgs";
pub const METADATA_KEY_ROLES: &str = "_roles";
pub const METADATA_KEY_SERVICE_ACCOUNTS: &str = "_serviceAccounts";

/// Descriptor an app sends once in its setup metadata, frozen after admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMetadata {
    /// Client-chosen opaque identifier, at least 32 characters.
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Service names this app exposes to the mesh.
    #[serde(default)]
    pub published_services: Vec<String>,
    /// Service names this app calls through the broker.
    #[serde(default)]
    pub consumed_services: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Stamped by the broker at admission; never trusted from the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
    /// Routing key for the live session, derived by the broker from the
    /// session credentials and `uuid`. Zero until admission completes.
    #[serde(default)]
    pub instance_id: i32,
}

impl AppMetadata {
    pub fn from_json(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}
