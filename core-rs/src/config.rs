/**
 * config.rs
 * Registry configuration (portmesh.yaml, YAML format)
 *
 * Format:
 * ```yaml
 * services:
 *   - service: api-gateway
 *     startPort: 8000
 *   - service: auth-service
 *     startPort: 3001
 * maxAttempts: 100
 * configFile: .port-config.json
 * lock: false
 * ```
 *
 * Every key is optional; missing keys take the built-in defaults.
 */

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{RegistryError, Result};
use crate::port::allocator::DEFAULT_MAX_ATTEMPTS;
use crate::port::probe::validate_port;
use crate::port::service::{validate_service_name, PortConfig};

/// File name of the persisted service -> port map
pub const DEFAULT_CONFIG_FILE: &str = ".port-config.json";

/// File name looked up in the working directory when no config is given
pub const DEFAULT_REGISTRY_CONFIG: &str = "portmesh.yaml";

/// Built-in service list, in allocation order
pub const DEFAULT_SERVICES: &[(&str, u16)] = &[
    ("api-gateway", 8000),
    ("auth-service", 3001),
    ("property-service", 3002),
];

/// portmesh.yaml structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryConfig {
    /// Fixed service list used by `initialize_ports`
    pub services: Vec<PortConfig>,
    /// Candidates scanned per service
    pub max_attempts: u16,
    /// Persisted map file name, relative to the working directory
    pub config_file: String,
    /// Take an advisory lock around every mutation
    pub lock: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            services: DEFAULT_SERVICES
                .iter()
                .map(|(name, port)| PortConfig::new(*name, *port))
                .collect(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            config_file: DEFAULT_CONFIG_FILE.to_string(),
            lock: false,
        }
    }
}

impl RegistryConfig {
    /// Load and validate a YAML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: RegistryConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        debug!(path = %path.display(), services = config.services.len(), "loaded registry config");
        Ok(config)
    }

    /// Resolve the config for a working directory
    ///
    /// An explicit path must exist. Otherwise `portmesh.yaml` in `dir` is used
    /// if present, falling back to the defaults.
    pub fn load_or_default(dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let candidate = dir.join(DEFAULT_REGISTRY_CONFIG);
        if candidate.exists() {
            Self::load(candidate)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config as YAML
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;
        Ok(())
    }

    /// Path of the persisted port map for `dir`
    pub fn config_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.config_file)
    }

    /// Check names, ports and limits
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(RegistryError::Validation(
                "maxAttempts must be at least 1".to_string(),
            ));
        }

        if self.config_file.trim().is_empty() {
            return Err(RegistryError::Validation(
                "configFile must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            validate_service_name(&service.service)?;
            validate_port(service.start_port as u32)?;

            if !seen.insert(service.service.as_str()) {
                return Err(RegistryError::Validation(format!(
                    "Service '{}' declared more than once",
                    service.service
                )));
            }
        }

        Ok(())
    }
}
