use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bevy_utils::tracing::info;
use serde::{Deserialize, Serialize};

use crate::data::DataError;

pub const DEFAULT_CONFIG_PATH: &str = "./assets/data/kernel.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Reproducible runs need this. Without it each cycle draws an entropy seed
    /// (still recorded, so replay works).
    pub base_seed: Option<u32>,
    pub ledger_path: PathBuf,
    pub log_filter: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            base_seed: None,
            ledger_path: PathBuf::from("./civic_ledger.db"),
            log_filter: "info".to_string(),
        }
    }
}

/// A missing file yields defaults; a file that exists must parse.
pub fn load_kernel_config(path: impl AsRef<Path>) -> Result<KernelConfig, DataError> {
    let path = path.as_ref();
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "no kernel config, using defaults");
            return Ok(KernelConfig::default());
        }
        Err(source) => {
            return Err(DataError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };
    let config: KernelConfig = serde_json::from_str(&raw).map_err(|source| DataError::Json {
        path: path.display().to_string(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

impl KernelConfig {
    pub fn validate(&self) -> Result<(), DataError> {
        if self.ledger_path.as_os_str().is_empty() {
            return Err(DataError::Validation(
                "ledger_path cannot be empty".to_string(),
            ));
        }
        if self.log_filter.trim().is_empty() {
            return Err(DataError::Validation(
                "log_filter cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
