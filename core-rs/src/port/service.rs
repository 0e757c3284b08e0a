//! Service names, port preferences and the assigned port map

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{RegistryError, Result};

/// Service name -> assigned port (.port-config.json format)
pub type ServicePorts = BTreeMap<String, u16>;

static SERVICE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("service name pattern"));

/// Preferred base port for one service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortConfig {
    pub service: String,
    pub start_port: u16,
}

impl PortConfig {
    pub fn new(service: impl Into<String>, start_port: u16) -> Self {
        PortConfig {
            service: service.into(),
            start_port,
        }
    }
}

/// Check a service name is a short identifier (e.g. "api-gateway")
pub fn validate_service_name(name: &str) -> Result<()> {
    if SERVICE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(RegistryError::Validation(format!(
            "Invalid service name '{}': expected letters, digits, '.', '_' or '-'",
            name
        )))
    }
}
