//! Interpreter configuration.

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Interpreter configuration, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Restart ceiling; the request fails once `req.restarts` would exceed it.
    pub max_restarts: u32,

    /// Seed for the interpreter-owned random source (entropy when unset).
    pub seed: Option<u64>,

    /// `server.hostname`, also matched against `Fastly-FF` for loop detection.
    pub server_hostname: String,

    /// `server.identity`
    pub server_identity: String,

    /// `server.datacenter`
    pub datacenter: String,

    /// `server.region`
    pub region: String,

    /// Enable the `assert.*` testing functions.
    pub testing: bool,

    /// Pin `now` and `time.start` for reproducible runs.
    pub fixed_time: Option<DateTime<Utc>>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            seed: None,
            server_hostname: "edgevcl-local".to_string(),
            server_identity: "edgevcl-local".to_string(),
            datacenter: "LCL".to_string(),
            region: "US-East".to_string(),
            testing: false,
            fixed_time: None,
        }
    }
}

impl InterpreterConfig {
    /// Read a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: InterpreterConfig =
            serde_json::from_slice(&data).context("Failed to deserialize config")?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self).context("Failed to serialize config")?;
        fs::write(path, data)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("edgevcl.json");
        let config = InterpreterConfig {
            max_restarts: 5,
            seed: Some(42),
            testing: true,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(InterpreterConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: InterpreterConfig = serde_json::from_str(r#"{"seed": 1}"#).unwrap();
        assert_eq!(config.max_restarts, 3);
        assert_eq!(config.seed, Some(1));
        assert_eq!(config.server_hostname, "edgevcl-local");
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let error = InterpreterConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(error.to_string().contains("Failed to read config"));
    }
}
