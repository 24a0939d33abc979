//! Error kinds surfaced by the key acquisition pipeline.

use std::path::PathBuf;
use thiserror::Error;

const SNIPPET_LEN: usize = 512;

/// Errors that can occur while acquiring keys, downloading or decrypting a title.
#[derive(Debug, Error)]
pub enum Error {
    /// Credentials are missing, invalid or could not be parsed.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Key id is malformed after normalization.
    #[error("invalid key id: {0}")]
    InvalidKeyId(#[from] wv_pssh::Error),

    /// Title is not available in the caller's region.
    #[error("'{title}' is not available in region '{country}'")]
    RegionRestricted { title: String, country: String },

    /// Catalog rejected the session, fresh credentials are required.
    #[error("session expired, log in again ({status}): '{}'", snippet(.body))]
    SessionExpired { status: u16, body: String },

    /// Catalog answered but without a playable manifest url.
    #[error("no playable manifest url in catalog response: '{}'", snippet(.0))]
    ManifestUnavailable(String),

    /// Manifest carries no default key id marker.
    #[error("no default_KID marker found in manifest {url} (unencrypted or unsupported manifest)")]
    MissingEncryptionMetadata { url: String },

    /// Catalog request failed for a reason other than authentication.
    #[error("catalog request failed ({status}): '{}'", snippet(.body))]
    Catalog { status: u16, body: String },

    /// Key service request failed or its response held no key pairs.
    #[error("key exchange failed{}: '{}'", status_suffix(.status), snippet(.body))]
    KeyExchange { status: Option<u16>, body: String },

    /// Key service did not answer in time.
    #[error("key exchange timed out after {seconds} seconds")]
    KeyExchangeTimeout { seconds: u64 },

    /// Key service answered with an empty key list.
    #[error("key service returned no key pairs")]
    NoKeyPairs,

    /// Expected output of an external tool is missing.
    #[error("expected output {} is missing", .path.display())]
    DownloadVerification { path: PathBuf },

    /// A single audio or subtitle track could not be processed.
    #[error("track {track} skipped: {reason}")]
    TrackDecryption { track: String, reason: String },

    /// External tool could not be started or exited unsuccessfully.
    #[error("{program} {reason}")]
    Tool { program: String, reason: String },

    /// Run was interrupted by the user.
    #[error("interrupted by user")]
    Interrupted,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Upstream status and body retained for diagnostics, if any.
    pub fn upstream(&self) -> Option<(Option<u16>, &str)> {
        match self {
            Self::SessionExpired { status, body } | Self::Catalog { status, body } => {
                Some((Some(*status), body))
            }
            Self::KeyExchange { status, body } => Some((*status, body)),
            Self::ManifestUnavailable(body) => Some((None, body)),
            _ => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|x| format!(" ({})", x)).unwrap_or_default()
}

pub(crate) fn snippet(body: &str) -> String {
    let body = body.trim();

    match body.char_indices().nth(SNIPPET_LEN) {
        Some((end, _)) => format!("{}...", &body[..end]),
        None => body.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_truncates_long_bodies() {
        let body = "a".repeat(SNIPPET_LEN + 10);
        let text = Error::KeyExchange {
            status: Some(500),
            body: body.clone(),
        }
        .to_string();

        assert!(text.starts_with("key exchange failed (500): 'aaa"));
        assert!(text.ends_with("...'"));
        assert_eq!(
            Error::KeyExchange {
                status: Some(500),
                body
            }
            .upstream()
            .map(|x| x.1.len()),
            Some(SNIPPET_LEN + 10)
        );
    }

    #[test]
    fn test_key_exchange_without_status() {
        let text = Error::KeyExchange {
            status: None,
            body: "no keys".to_owned(),
        }
        .to_string();

        assert_eq!(text, "key exchange failed: 'no keys'");
    }
}
