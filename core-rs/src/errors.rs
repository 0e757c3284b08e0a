//! Error types for portmesh core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No free port for service {service} in range [{start}, {end})")]
    PortExhaustion {
        service: String,
        start: u32,
        end: u32,
    },

    #[error("Failed to probe port {port}: {source}")]
    Probe {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Persisted port config unusable: {0}")]
    Persistence(String),

    #[error("No port assigned to service: {0}")]
    MissingAssignment(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
