//! Worker configuration: structural validation and the on-disk YAML file.
//!
//! The worker reads the same file; this side only guarantees that a run is
//! never started against a document with missing keys or out-of-domain values.

mod error;
mod schema;
mod store;

pub use error::{ConfigStoreError, ValidationError};
pub use schema::ValidatedConfig;
pub use store::ConfigStore;

#[cfg(test)]
pub(crate) use schema::{tests::SAMPLE as SAMPLE_CONFIG, validate};
