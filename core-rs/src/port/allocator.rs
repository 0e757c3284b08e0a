/**
 * allocator.rs
 * Conflict-free port assignment for a batch of services
 *
 * Allocation strategy:
 * - Scan start_port, start_port+1, ... up to max_attempts candidates
 * - First candidate that is neither reserved nor in use wins
 * - In a batch, every port handed out earlier in the same call is reserved,
 *   because the owning service has not bound it yet and the OS still reports
 *   it free
 *
 * Example (all ports free):
 * - api-gateway  start=8000 → 8000
 * - helper       start=8000 → 8001 (8000 reserved by api-gateway)
 * - auth-service start=3001 → 3001
 */

use std::collections::HashSet;

use tracing::{debug, info};

use super::probe::{validate_port, PortProbe, TcpProbe};
use super::service::{validate_service_name, PortConfig, ServicePorts};
use crate::errors::{RegistryError, Result};

/// Candidates scanned per service before giving up
pub const DEFAULT_MAX_ATTEMPTS: u16 = 100;

const UNNAMED_SERVICE: &str = "<unnamed>";

/// Port Allocator - turns preferred base ports into distinct free ports
#[derive(Debug, Clone)]
pub struct PortAllocator<P: PortProbe = TcpProbe> {
    probe: P,
    max_attempts: u16,
}

impl PortAllocator<TcpProbe> {
    /// Allocator probing the real network stack
    pub fn new() -> Self {
        Self::with_probe(TcpProbe)
    }
}

impl Default for PortAllocator<TcpProbe> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PortProbe> PortAllocator<P> {
    pub fn with_probe(probe: P) -> Self {
        PortAllocator {
            probe,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override the per-service scan length used by batch allocation
    pub fn with_max_attempts(mut self, max_attempts: u16) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn max_attempts(&self) -> u16 {
        self.max_attempts
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Find the first free port in `[start_port, start_port + max_attempts)`
    ///
    /// # Errors
    /// - `Validation` if `max_attempts` is 0 or the scan runs past 65535
    /// - `Probe` if a bind fails for a reason other than "in use"
    /// - `PortExhaustion` if every candidate is taken
    pub fn find_free_port(&self, start_port: u16, max_attempts: u16) -> Result<u16> {
        self.find_free_port_excluding(UNNAMED_SERVICE, start_port, max_attempts, &HashSet::new())
    }

    /// Same scan as `find_free_port`, treating `reserved` ports as occupied
    ///
    /// # Arguments
    /// * `service` - Name reported in `PortExhaustion`
    /// * `reserved` - Ports already promised to someone else
    pub fn find_free_port_excluding(
        &self,
        service: &str,
        start_port: u16,
        max_attempts: u16,
        reserved: &HashSet<u16>,
    ) -> Result<u16> {
        if max_attempts == 0 {
            return Err(RegistryError::Validation(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        validate_port(start_port as u32)?;

        let start = start_port as u32;
        let end = start + max_attempts as u32;

        for candidate in start..end {
            let port = validate_port(candidate)?;

            if reserved.contains(&port) {
                debug!(service, port, "skipping port reserved earlier in batch");
                continue;
            }

            if self.probe.is_available(port)? {
                return Ok(port);
            }
        }

        Err(RegistryError::PortExhaustion {
            service: service.to_string(),
            start,
            end,
        })
    }

    /// Allocate one port per service, strictly in input order
    ///
    /// Earlier entries get first claim on their base port. Any failure
    /// aborts the whole batch and no partial map is returned.
    ///
    /// # Errors
    /// - `Validation` for a bad or duplicate service name
    /// - Anything `find_free_port_excluding` returns
    pub fn find_multiple_free_ports(&self, configs: &[PortConfig]) -> Result<ServicePorts> {
        let mut ports = ServicePorts::new();
        let mut reserved = HashSet::with_capacity(configs.len());

        for config in configs {
            validate_service_name(&config.service)?;

            if ports.contains_key(&config.service) {
                return Err(RegistryError::Validation(format!(
                    "Service '{}' listed twice in one allocation batch",
                    config.service
                )));
            }

            let port = self.find_free_port_excluding(
                &config.service,
                config.start_port,
                self.max_attempts,
                &reserved,
            )?;

            if port != config.start_port {
                info!(
                    service = %config.service,
                    preferred = config.start_port,
                    port,
                    "preferred port taken, assigned next free port"
                );
            } else {
                debug!(service = %config.service, port, "assigned preferred port");
            }

            reserved.insert(port);
            ports.insert(config.service.clone(), port);
        }

        Ok(ports)
    }
}
