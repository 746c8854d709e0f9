//! Authenticated principals and the verification seam.

use std::collections::BTreeSet;

use {async_trait::async_trait, rand::Rng};

/// Verification method passed to the auth collaborator for bearer tokens.
pub const AUTH_METHOD_JWT: &str = "JWT";

/// Identity established for one session at admission.
///
/// The identity sets are ordered so the comma-joined strings written into
/// the app descriptor are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub organizations: BTreeSet<String>,
    pub roles: BTreeSet<String>,
    pub service_accounts: BTreeSet<String>,
    pub authorities: BTreeSet<String>,
}

impl Principal {
    pub fn joined_organizations(&self) -> String {
        join(&self.organizations)
    }

    pub fn joined_roles(&self) -> String {
        join(&self.roles)
    }

    pub fn joined_service_accounts(&self) -> String {
        join(&self.service_accounts)
    }
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(",")
}

/// Token verification, delegated to the surrounding broker.
#[async_trait]
pub trait AuthenticationService: Send + Sync {
    /// Verify `credentials` under `method`, returning the authenticated
    /// principal, or `None` when verification fails.
    async fn auth(&self, method: &str, credentials: &str) -> Option<Principal>;
}

// ── Auth-disabled path ───────────────────────────────────────────────────────

/// Fixed principal used when authentication is disabled.
pub fn mock_principal() -> Principal {
    Principal {
        subject: "MockApp".into(),
        organizations: BTreeSet::from(["default".to_string()]),
        roles: BTreeSet::from(["admin".to_string()]),
        service_accounts: BTreeSet::new(),
        authorities: BTreeSet::from(["1".to_string()]),
    }
}

/// Fresh random credential string for an unauthenticated session, used as
/// the instance-id hash salt so replayed uuids still get distinct slots.
pub fn random_credentials() -> String {
    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}
