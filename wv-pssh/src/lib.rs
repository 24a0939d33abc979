#![cfg_attr(docsrs, feature(doc_cfg))]

//! This crate builds widevine `PSSH` boxes from a single 128-bit content key id.
//!
//! Key ids are accepted in hex or uuid form and normalized by [`KeyId`].
//! The box itself is assembled by [`PsshBox`] in one of two payload layouts,
//! see [`PsshPayload`].
//!
//! # Example
//!
//! ```
//! use wv_pssh::{KeyId, PsshBox};
//!
//! let kid = KeyId::parse("12345678-1234-1234-1234-123456789012").unwrap();
//! let pssh = PsshBox::new(kid);
//!
//! assert_eq!(pssh.to_bytes().len(), 48);
//! println!("{}", pssh.to_base64());
//! ```

mod error;
mod kid;
mod pssh;

pub use error::Error;
pub use kid::{KeyId, normalize_kid};
pub use pssh::{PsshBox, PsshPayload, WIDEVINE_SYSTEM_ID};

/// A `Result` alias where the `Err` case is `wv_pssh::Error`.
pub type Result<T> = std::result::Result<T, Error>;
