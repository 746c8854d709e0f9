//! RSocket composite-metadata decoding.
//!
//! Each entry is a 1-byte discriminator (high bit set → 7-bit well-known mime
//! id, otherwise the length of an inline ASCII mime string minus one), a
//! 24-bit big-endian payload length, and the payload bytes.

use bytes::{Buf, Bytes};

// Well-known mime ids from the RSocket extension registry, limited to the
// entries a broker setup payload can carry.
const WELL_KNOWN_MIMES: &[(u8, &str)] = &[
    (0x05, crate::MIME_APPLICATION_JSON),
    (0x7C, crate::MIME_AUTHENTICATION),
    (0x7E, crate::MIME_ROUTING),
    (0x7F, crate::MIME_COMPOSITE_METADATA),
];

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("truncated metadata entry at offset {offset}")]
    Truncated { offset: usize },

    #[error("unknown well-known mime id 0x{id:02x} at offset {offset}")]
    UnknownWellKnownMime { id: u8, offset: usize },

    #[error("metadata entry '{mime}' is not valid UTF-8")]
    InvalidUtf8 { mime: String },
}

pub type Result<T> = std::result::Result<T, MetadataError>;

// ── Metadata kinds ───────────────────────────────────────────────────────────

/// Recognized composite-metadata entry kinds, keyed by mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataKind {
    /// App descriptor payload (`message/x.rsocket.application+json`).
    Application,
    /// Bearer token (`message/x.rsocket.authentication.bearer.v0`).
    BearerToken,
    Routing,
    DataMimeType,
    Unknown(String),
}

impl MetadataKind {
    pub fn from_mime(mime: &str) -> Self {
        match mime {
            crate::MIME_APP_METADATA => Self::Application,
            crate::MIME_BEARER_TOKEN => Self::BearerToken,
            crate::MIME_ROUTING => Self::Routing,
            crate::MIME_APPLICATION_JSON => Self::DataMimeType,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn mime(&self) -> &str {
        match self {
            Self::Application => crate::MIME_APP_METADATA,
            Self::BearerToken => crate::MIME_BEARER_TOKEN,
            Self::Routing => crate::MIME_ROUTING,
            Self::DataMimeType => crate::MIME_APPLICATION_JSON,
            Self::Unknown(mime) => mime,
        }
    }
}

// ── Composite metadata ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct MetadataEntry {
    mime: String,
    payload: Bytes,
}

/// Decoded composite metadata of one setup payload.
#[derive(Debug, Clone, Default)]
pub struct CompositeMetadata {
    entries: Vec<MetadataEntry>,
}

impl CompositeMetadata {
    /// Decode the full metadata section. Fails on the first malformed entry;
    /// later entries are not recovered.
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        let total = buf.len();
        let mut entries = Vec::new();

        while buf.has_remaining() {
            let offset = total - buf.remaining();
            let head = buf.get_u8();

            let mime = if head & 0x80 != 0 {
                let id = head & 0x7F;
                WELL_KNOWN_MIMES
                    .iter()
                    .find(|(known, _)| *known == id)
                    .map(|(_, mime)| (*mime).to_string())
                    .ok_or(MetadataError::UnknownWellKnownMime { id, offset })?
            } else {
                let len = head as usize + 1;
                if buf.remaining() < len {
                    return Err(MetadataError::Truncated { offset });
                }
                let raw = buf.copy_to_bytes(len);
                String::from_utf8(raw.to_vec()).map_err(|err| MetadataError::InvalidUtf8 {
                    mime: String::from_utf8_lossy(err.as_bytes()).into_owned(),
                })?
            };

            if buf.remaining() < 3 {
                return Err(MetadataError::Truncated { offset });
            }
            let payload_len = ((buf.get_u8() as usize) << 16)
                | ((buf.get_u8() as usize) << 8)
                | buf.get_u8() as usize;
            if buf.remaining() < payload_len {
                return Err(MetadataError::Truncated { offset });
            }
            let payload = buf.copy_to_bytes(payload_len);

            entries.push(MetadataEntry { mime, payload });
        }

        Ok(Self { entries })
    }

    pub fn contains(&self, kind: &MetadataKind) -> bool {
        self.get(kind).is_some()
    }

    /// First entry of the given kind, if present.
    pub fn get(&self, kind: &MetadataKind) -> Option<&Bytes> {
        self.entries
            .iter()
            .find(|e| e.mime == kind.mime())
            .map(|e| &e.payload)
    }

    /// First entry of the given kind as UTF-8 text.
    pub fn get_utf8(&self, kind: &MetadataKind) -> Result<Option<&str>> {
        match self.get(kind) {
            None => Ok(None),
            Some(payload) => std::str::from_utf8(payload)
                .map(Some)
                .map_err(|_| MetadataError::InvalidUtf8 {
                    mime: kind.mime().to_string(),
                }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Encoding (tests and embedding clients) ───────────────────────────────────

/// Append one composite-metadata entry to `out`.
///
/// Inline mime strings longer than 128 bytes are not representable and are
/// truncated to the wire maximum.
pub fn encode_entry(out: &mut Vec<u8>, mime: &str, payload: &[u8]) {
    debug_assert!(!mime.is_empty());
    match WELL_KNOWN_MIMES.iter().find(|(_, known)| *known == mime) {
        Some((id, _)) => out.push(0x80 | id),
        None => {
            let mime = &mime.as_bytes()[..mime.len().min(128)];
            out.push((mime.len() - 1) as u8);
            out.extend_from_slice(mime);
        },
    }
    out.push((payload.len() >> 16) as u8);
    out.push((payload.len() >> 8) as u8);
    out.push(payload.len() as u8);
    out.extend_from_slice(payload);
}
