//! Configuration for the reconciliation engine

use serde::{Deserialize, Serialize};

/// Reconciliation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Expense store configuration
    pub store: expense_core::Config,

    /// Run a consistency audit of the touched scope after every expense
    /// pass (compares stored balances against the live obligation set)
    pub verify_reconciliation: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "reconciliation-engine".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            store: expense_core::Config::default(),
            verify_reconciliation: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("RECONCILE_DATA_DIR") {
            config.store.data_dir = std::path::PathBuf::from(data_dir);
        }

        if let Ok(verify) = std::env::var("RECONCILE_VERIFY") {
            config.verify_reconciliation = verify == "1" || verify.eq_ignore_ascii_case("true");
        }

        Ok(config)
    }
}
