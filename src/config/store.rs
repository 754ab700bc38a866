//! Persistence of the worker configuration file.

use super::error::ConfigStoreError;
use super::schema::{validate, ValidatedConfig};
use serde_yaml::Value;
use std::path::{Path, PathBuf};

/// The single YAML configuration file shared with the worker.
///
/// Nothing is cached: every call reads the file again so edits made by
/// other tools are picked up on the next run.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the file without schema checks.
    pub fn load(&self) -> Result<Value, ConfigStoreError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| ConfigStoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn load_validated(&self) -> Result<ValidatedConfig, ConfigStoreError> {
        Ok(validate(self.load()?)?)
    }

    /// Replace the whole file with `yaml`, provided it parses and validates.
    ///
    /// The document is written as submitted; placeholder normalization only
    /// applies to the value handed back.
    pub fn replace_from_yaml(&self, yaml: &str) -> Result<ValidatedConfig, ConfigStoreError> {
        let document: Value = serde_yaml::from_str(yaml)?;
        let validated = validate(document.clone())?;
        self.write(&document)?;
        tracing::info!(path = %self.path.display(), "configuration updated");
        Ok(validated)
    }

    fn write(&self, document: &Value) -> Result<(), ConfigStoreError> {
        let text = serde_yaml::to_string(document)?;
        let write_err = |source| ConfigStoreError::Write {
            path: self.path.clone(),
            source,
        };
        // Write next to the target and rename so readers never see a half-written file.
        let tmp = self.path.with_extension("yaml.tmp");
        std::fs::write(&tmp, text).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(|source| {
            let _ = std::fs::remove_file(&tmp);
            write_err(source)
        })
    }
}
