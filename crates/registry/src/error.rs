//! Admission rejections.
//!
//! Every rejection carries one of the stable `RST-*` codes so clients and
//! operators can match on them across broker versions. Client errors are the
//! client's fault and logged at warn; the rest are logged at error with the
//! cause. Nothing here retries; the client reconnect is the retry.

use petrel_protocol::{codes, metadata::MetadataError};

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("{code}: setup metadata rejected: {0}", code = codes::METADATA_PARSE)]
    MetadataParse(String),

    #[error("{code}: no bearer token in setup metadata", code = codes::UNAUTHORIZED)]
    MissingCredentials,

    #[error("{code}: credential verification failed", code = codes::UNAUTHORIZED)]
    InvalidCredentials,

    #[error("{code}: setup carries no app descriptor", code = codes::MISSING_APP_METADATA)]
    MissingAppMetadata,

    #[error("{code}: app uuid '{0}' is shorter than 32 characters", code = codes::MALFORMED_UUID)]
    MalformedUuid(String),

    #[error("{code}: instance {0} is already live", code = codes::DUPLICATE_INSTANCE)]
    DuplicateInstance(i32),

    #[error("{code}: app uuid '{0}' is already live", code = codes::DUPLICATE_INSTANCE)]
    DuplicateUuid(String),

    #[error("{code}: responder construction failed: {0}", code = codes::HANDLER_CONSTRUCTION)]
    HandlerConstruction(String),

    #[error("{code}: unexpected failure: {0}", code = codes::INTERNAL)]
    Internal(String),
}

impl AdmissionError {
    /// The stable code surfaced in the setup rejection.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MetadataParse(_) => codes::METADATA_PARSE,
            Self::MissingCredentials | Self::InvalidCredentials => codes::UNAUTHORIZED,
            Self::MissingAppMetadata => codes::MISSING_APP_METADATA,
            Self::MalformedUuid(_) => codes::MALFORMED_UUID,
            Self::DuplicateInstance(_) | Self::DuplicateUuid(_) => codes::DUPLICATE_INSTANCE,
            Self::HandlerConstruction(_) => codes::HANDLER_CONSTRUCTION,
            Self::Internal(_) => codes::INTERNAL,
        }
    }

    /// Malformed input, bad credentials, duplicate session: the client's
    /// fault, not worth an error-level log.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::HandlerConstruction(_) | Self::Internal(_))
    }
}

impl From<MetadataError> for AdmissionError {
    fn from(err: MetadataError) -> Self {
        Self::MetadataParse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AdmissionError>;
