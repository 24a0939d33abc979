//! Authenticated key acquisition for mubi titles.
//!
//! A run turns browser session cookies into api headers, resolves the secure
//! manifest of a title, builds a widevine pssh box from its default key id and
//! asks a remote key service for the content key. The resulting
//! `key_id=<kid>:key=<key>` string drives an external decrypter over the tracks
//! fetched by an external segment downloader.
//!
//! Network and process boundaries are traits ([`Catalog`], [`KeyService`],
//! [`MediaTools`], [`CredentialSource`]) so [`Pipeline`] can run against any
//! implementation of them.

mod commands;
pub mod catalog;
pub mod config;
pub mod cookie;
pub mod credentials;
pub mod error;
pub mod headers;
pub mod license;
mod logger;
pub mod pipeline;
pub mod search;
pub mod supplier;
pub mod tools;
mod utils;

#[doc(hidden)]
pub use commands::Args;
pub use catalog::{Catalog, CatalogClient};
pub use config::Config;
pub use credentials::CredentialSet;
pub use error::{Error, Result};
pub use headers::HeaderSet;
pub use license::{FormattedKey, KeyExchangeClient, KeyPair, KeyService, LicenseRequest};
pub use logger::Logger;
pub use pipeline::{Failure, KeyAcquisition, Outcome, Pipeline, State};
pub use search::Title;
pub use supplier::{CredentialSource, CredentialSupplier};
pub use tools::{ExternalTools, MediaTools};
pub use wv_pssh;
