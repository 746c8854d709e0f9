//! Broker wire-protocol definitions.
//!
//! Covers the slice of the RSocket session handshake the broker core needs:
//! composite-metadata decoding for the setup payload, the app descriptor
//! carried inside it, and the CloudEvents-style envelope pushed back to
//! connected apps.

use bytes::Bytes;

pub mod app;
pub mod envelope;
pub mod metadata;

pub use {
    app::{
        AppMetadata, METADATA_KEY_ORGS, METADATA_KEY_ROLES, METADATA_KEY_SERVICE_ACCOUNTS,
    },
    envelope::{
        AppStatus, AppStatusPayload, EVENT_TYPE_APP_STATUS, EVENT_TYPE_UPSTREAM_CLUSTER_CHANGED,
        EventEnvelope, UpstreamClusterChangedPayload,
    },
    metadata::{CompositeMetadata, MetadataError, MetadataKind},
};

// ── Metadata mime types ──────────────────────────────────────────────────────

pub const MIME_APPLICATION_JSON: &str = "application/json";
pub const MIME_APP_METADATA: &str = "message/x.rsocket.application+json";
pub const MIME_BEARER_TOKEN: &str = "message/x.rsocket.authentication.bearer.v0";
pub const MIME_AUTHENTICATION: &str = "message/x.rsocket.authentication.v0";
pub const MIME_ROUTING: &str = "message/x.rsocket.routing.v0";
pub const MIME_COMPOSITE_METADATA: &str = "message/x.rsocket.composite-metadata.v0";

// ── Status codes ─────────────────────────────────────────────────────────────

/// Stable codes surfaced in setup rejections, logs, and operator notices.
pub mod codes {
    pub const METADATA_PARSE: &str = "RST-500402";
    pub const UNAUTHORIZED: &str = "RST-500405";
    pub const HANDLER_CONSTRUCTION: &str = "RST-500406";
    pub const DUPLICATE_INSTANCE: &str = "RST-500409";
    pub const MALFORMED_UUID: &str = "RST-500410";
    pub const MISSING_APP_METADATA: &str = "RST-500411";
    pub const INTERNAL: &str = "RST-600500";
    pub const APP_CONNECTED: &str = "RST-500200";
    pub const APP_STOPPED: &str = "RST-500202";
    pub const NOTICE_CONNECTED: &str = "RST-300203";
    pub const NOTICE_STOPPED: &str = "RST-300204";
}

// ── Setup payload ────────────────────────────────────────────────────────────

/// The slice of an RSocket SETUP frame the admission pipeline consumes.
///
/// `metadata` is raw composite metadata; `data` is opaque to the registry and
/// handed through to the responder untouched.
#[derive(Debug, Clone, Default)]
pub struct SetupPayload {
    pub metadata: Bytes,
    pub data: Bytes,
}

impl SetupPayload {
    pub fn from_metadata(metadata: impl Into<Bytes>) -> Self {
        Self {
            metadata: metadata.into(),
            data: Bytes::new(),
        }
    }
}
