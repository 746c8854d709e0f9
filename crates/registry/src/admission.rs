//! Connection-admission pipeline.
//!
//! Drives one setup attempt through its gates in order: parse →
//! authenticate → descriptor checks → instance-id derivation → uniqueness →
//! principal enrichment → responder construction → registration. Every gate
//! failure disposes a still-live requester socket exactly once and leaves
//! the directory untouched.

use std::sync::Arc;

use {
    chrono::Utc,
    petrel_protocol::{
        AppMetadata, METADATA_KEY_ORGS, METADATA_KEY_ROLES, METADATA_KEY_SERVICE_ACCOUNTS,
        SetupPayload,
        metadata::{CompositeMetadata, MetadataKind},
    },
    tracing::{error, warn},
};

use crate::{
    auth::{self, AUTH_METHOD_JWT, Principal},
    error::AdmissionError,
    handler::ResponderHandler,
    registry::HandlerRegistry,
    socket::RequesterSocket,
};

/// Minimum length of the client-chosen app uuid.
const MIN_APP_UUID_LEN: usize = 32;

/// Derive the 32-bit routing key for a session.
///
/// MurmurHash3 x86/32 over `"<credentials>:<uuid>"`: deterministic across
/// broker restarts, so a reconnect lands on the same routing slot iff the
/// credentials are identical, while a replayed uuid under other credentials
/// becomes a different instance.
pub fn derive_instance_id(credentials: &str, uuid: &str) -> i32 {
    let key = format!("{credentials}:{uuid}");
    let mut cursor = std::io::Cursor::new(key.as_bytes());
    // Reading from an in-memory cursor cannot fail.
    murmur3::murmur3_32(&mut cursor, 0)
        .map(|digest| digest as i32)
        .unwrap_or_default()
}

/// Admit one setup attempt. On success the returned handler owns the socket
/// and is live in the directory; on rejection the socket has been disposed
/// and the error carries the stable `RST-*` code for the setup rejection.
pub async fn accept(
    registry: &Arc<HandlerRegistry>,
    setup: SetupPayload,
    socket: RequesterSocket,
) -> Result<Arc<ResponderHandler>, AdmissionError> {
    match admit(registry, setup, &socket).await {
        Ok(handler) => Ok(handler),
        Err(err) => {
            if err.is_client_error() {
                warn!(code = err.code(), error = %err, "accept: setup rejected");
            } else {
                error!(code = err.code(), error = %err, "accept: setup failed");
            }
            if !socket.is_disposed() {
                socket.dispose();
            }
            Err(err)
        },
    }
}

async fn admit(
    registry: &Arc<HandlerRegistry>,
    setup: SetupPayload,
    socket: &RequesterSocket,
) -> Result<Arc<ResponderHandler>, AdmissionError> {
    let metadata = CompositeMetadata::decode(setup.metadata)?;
    let (principal, credentials) = authenticate(registry, &metadata).await?;

    let descriptor = metadata
        .get(&MetadataKind::Application)
        .ok_or(AdmissionError::MissingAppMetadata)?;
    let mut app = AppMetadata::from_json(descriptor)
        .map_err(|err| AdmissionError::MetadataParse(format!("app descriptor: {err}")))?;

    if app.uuid.len() < MIN_APP_UUID_LEN {
        return Err(AdmissionError::MalformedUuid(app.uuid));
    }

    let instance_id = derive_instance_id(&credentials, &app.uuid);
    app.instance_id = instance_id;

    if registry.services.routing.contains_instance(instance_id) {
        return Err(AdmissionError::DuplicateInstance(instance_id));
    }

    enrich(&mut app, &principal);

    let handler = ResponderHandler::build(app, principal, socket.clone(), &registry.services)
        .map_err(|err| AdmissionError::HandlerConstruction(err.to_string()))?;

    // Disposal always runs on the worker pool, never on the accept path or
    // the close-notifier thread.
    {
        let registry = Arc::clone(registry);
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            handler.socket().closed().await;
            registry.on_handler_disposed(&handler).await;
        });
    }

    registry.on_handler_registered(&handler).await?;
    Ok(handler)
}

/// Gate 2: bearer-token verification, or the synthesized mock principal
/// (with a fresh random hash salt) when authentication is disabled.
async fn authenticate(
    registry: &Arc<HandlerRegistry>,
    metadata: &CompositeMetadata,
) -> Result<(Principal, String), AdmissionError> {
    if !registry.config.auth_required {
        return Ok((auth::mock_principal(), auth::random_credentials()));
    }

    let token = metadata
        .get_utf8(&MetadataKind::BearerToken)?
        .ok_or(AdmissionError::MissingCredentials)?;
    let principal = registry
        .services
        .auth
        .auth(AUTH_METHOD_JWT, token)
        .await
        .ok_or(AdmissionError::InvalidCredentials)?;
    Ok((principal, token.to_string()))
}

/// Gate 7: the stored descriptor's identity keys reflect the authenticated
/// principal, never whatever the client put in its setup metadata.
fn enrich(app: &mut AppMetadata, principal: &Principal) {
    app.metadata.insert(
        METADATA_KEY_ORGS.to_string(),
        principal.joined_organizations(),
    );
    app.metadata
        .insert(METADATA_KEY_ROLES.to_string(), principal.joined_roles());
    app.metadata.insert(
        METADATA_KEY_SERVICE_ACCOUNTS.to_string(),
        principal.joined_service_accounts(),
    );
    app.connected_at = Some(Utc::now());
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_id_is_deterministic() {
        let a = derive_instance_id("secret", "0123456789abcdef0123456789abcdef");
        let b = derive_instance_id("secret", "0123456789abcdef0123456789abcdef");
        assert_eq!(a, b);
    }

    #[test]
    fn instance_id_depends_on_credentials_and_uuid() {
        let uuid = "0123456789abcdef0123456789abcdef";
        assert_ne!(
            derive_instance_id("secret-a", uuid),
            derive_instance_id("secret-b", uuid)
        );
        assert_ne!(
            derive_instance_id("secret-a", uuid),
            derive_instance_id("secret-a", "fedcba9876543210fedcba9876543210")
        );
    }

    #[test]
    fn enrichment_overwrites_client_supplied_identity_keys() {
        let mut app = AppMetadata::from_json(
            br#"{
                "uuid": "0123456789abcdef0123456789abcdef",
                "name": "svc-a",
                "metadata": {"_orgs": "spoofed", "_roles": "root", "zone": "eu-1"}
            }"#,
        )
        .unwrap();
        enrich(&mut app, &auth::mock_principal());

        assert_eq!(app.metadata[METADATA_KEY_ORGS], "default");
        assert_eq!(app.metadata[METADATA_KEY_ROLES], "admin");
        assert_eq!(app.metadata[METADATA_KEY_SERVICE_ACCOUNTS], "");
        // Unreserved keys survive untouched.
        assert_eq!(app.metadata["zone"], "eu-1");
        assert!(app.connected_at.is_some());
    }
}
