//! Shared types for harvest.
//!
//! - [`HarvestConfig`]: run configuration loaded from `harvest.toml`
//! - [`ExtractionRecord`]: one scraped record, fields in page order
//! - [`SessionArtifact`]: persisted cookies and web storage

pub mod artifact;
pub mod config;
pub mod error;
pub mod record;

pub use artifact::{OriginStorage, SessionArtifact, StorageItem, StoredCookie};
pub use config::{
    BrowserSettings, Credentials, FieldSelectors, HarvestConfig, ListingSelectors,
    LoginSelectors, Secret, SelectorMap, Timing,
};
pub use error::ConfigError;
pub use record::{ExtractionRecord, ID_FIELD};
