/**
 * registry.rs
 * Persisted service -> port map shared by sibling processes
 *
 * The map lives in <working dir>/.port-config.json:
 * ```json
 * { "api-gateway": 8000, "auth-service": 3001 }
 * ```
 *
 * Persistence rules:
 * - Loaded once at construction; a missing or corrupt file means an empty map
 * - Every successful mutation rewrites (or removes) the file immediately
 * - No coordination between processes unless the lock is opted into: the
 *   last writer wins
 *
 * State machine:
 * - Uninitialized → (load) → Loaded → initialize_ports → Populated
 * - find_port_for_service: Loaded/Populated → Populated
 * - clear_port_config: any → Uninitialized
 */

use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::allocator::PortAllocator;
use super::lock::RegistryLock;
use super::probe::{validate_port, PortProbe, TcpProbe};
use super::service::{validate_service_name, PortConfig, ServicePorts};
use crate::config::RegistryConfig;
use crate::errors::{RegistryError, Result};

/// Lifecycle of a registry instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    Uninitialized,
    Loaded,
    Populated,
}

/// Service Registry - owns the persisted port map and its lookup API
pub struct ServiceRegistry<P: PortProbe = TcpProbe> {
    config_path: PathBuf,
    lock_path: Option<PathBuf>,
    services: Vec<PortConfig>,
    allocator: PortAllocator<P>,
    ports: ServicePorts,
    state: RegistryState,
}

impl ServiceRegistry<TcpProbe> {
    /// Create a registry for a working directory, probing real ports
    ///
    /// # Example
    /// ```no_run
    /// use portmesh_core::{RegistryConfig, ServiceRegistry};
    ///
    /// let mut registry = ServiceRegistry::new(".", &RegistryConfig::default())?;
    /// registry.initialize_ports()?;
    /// # Ok::<(), portmesh_core::RegistryError>(())
    /// ```
    pub fn new<D: AsRef<Path>>(dir: D, config: &RegistryConfig) -> Result<Self> {
        Self::with_probe(dir, config, TcpProbe)
    }
}

impl<P: PortProbe> ServiceRegistry<P> {
    /// Create a registry with a custom probe
    ///
    /// Never fails because of the persisted file; only an invalid `config`
    /// is an error.
    pub fn with_probe<D: AsRef<Path>>(dir: D, config: &RegistryConfig, probe: P) -> Result<Self> {
        config.validate()?;

        let config_path = config.config_path(dir.as_ref());
        let lock_path = config.lock.then(|| lock_path_for(&config_path));

        let mut registry = ServiceRegistry {
            config_path,
            lock_path,
            services: config.services.clone(),
            allocator: PortAllocator::with_probe(probe).with_max_attempts(config.max_attempts),
            ports: ServicePorts::new(),
            state: RegistryState::Uninitialized,
        };
        registry.reload();

        Ok(registry)
    }

    /// Re-read the persisted file, replacing the in-memory map
    ///
    /// A missing file gives an empty map. An unreadable or corrupt one also
    /// gives an empty map, with a warning.
    pub fn reload(&mut self) {
        self.ports = match Self::load_port_map(&self.config_path) {
            Ok(ports) => ports,
            Err(e) => {
                warn!(path = %self.config_path.display(), "{}; starting with empty port map", e);
                ServicePorts::new()
            }
        };
        self.state = RegistryState::Loaded;
    }

    /// Load the port map, `Persistence` on anything unusable
    fn load_port_map(path: &Path) -> Result<ServicePorts> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no persisted port config");
                return Ok(ServicePorts::new());
            }
            Err(e) => {
                return Err(RegistryError::Persistence(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let ports: ServicePorts = serde_json::from_str(&content).map_err(|e| {
            RegistryError::Persistence(format!("Invalid JSON in {}: {}", path.display(), e))
        })?;

        for (service, &port) in &ports {
            validate_service_name(service)
                .and_then(|_| validate_port(port as u32))
                .map_err(|e| {
                    RegistryError::Persistence(format!(
                        "Bad entry {}={} in {}: {}",
                        service,
                        port,
                        path.display(),
                        e
                    ))
                })?;
        }

        debug!(path = %path.display(), entries = ports.len(), "loaded persisted port config");
        Ok(ports)
    }

    /// Write the map through a private temp file in the same directory
    ///
    /// Each write gets its own temp file, so concurrent writers never share
    /// one; whichever rename lands last wins.
    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.ports)?;

        let dir = match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&self.config_path).map_err(|e| e.error)?;

        info!(path = %self.config_path.display(), entries = self.ports.len(), "wrote port config");
        Ok(())
    }

    fn lock(&self) -> Result<Option<RegistryLock>> {
        self.lock_path
            .as_deref()
            .map(RegistryLock::acquire)
            .transpose()
    }

    /// Allocate ports for the fixed service list and persist them
    ///
    /// A failure leaves the previous map and file untouched. The whole map is
    /// replaced: services a sibling added to the file are dropped, even with
    /// locking enabled (the lock serializes writers, it does not merge).
    ///
    /// # Errors
    /// `Validation`, `Probe` or `PortExhaustion` from the allocator, or an
    /// I/O error writing the file
    pub fn initialize_ports(&mut self) -> Result<ServicePorts> {
        let _lock = self.lock()?;

        let ports = self.allocator.find_multiple_free_ports(&self.services)?;
        let previous = std::mem::replace(&mut self.ports, ports);

        if let Err(e) = self.save() {
            self.ports = previous;
            return Err(e);
        }

        self.state = RegistryState::Populated;
        info!(services = self.ports.len(), "initialized service ports");
        Ok(self.ports.clone())
    }

    /// Allocate one more service, avoiding every port already in the map
    ///
    /// Returns the existing port without probing if the service already has
    /// one. With locking enabled the file is re-read under the lock first so
    /// another process's assignments are also avoided.
    pub fn find_port_for_service(&mut self, service: &str, start_port: u16) -> Result<u16> {
        validate_service_name(service)?;

        let lock = self.lock()?;
        if lock.is_some() {
            self.reload();
        }

        if let Some(&port) = self.ports.get(service) {
            debug!(service, port, "service already has a port");
            self.state = RegistryState::Populated;
            return Ok(port);
        }

        let reserved: HashSet<u16> = self.ports.values().copied().collect();
        let port = self.allocator.find_free_port_excluding(
            service,
            start_port,
            self.allocator.max_attempts(),
            &reserved,
        )?;

        self.ports.insert(service.to_string(), port);
        if let Err(e) = self.save() {
            self.ports.remove(service);
            return Err(e);
        }

        self.state = RegistryState::Populated;
        info!(service, port, "allocated port for service");
        Ok(port)
    }

    /// Forget every assignment and delete the persisted file
    pub fn clear_port_config(&mut self) -> Result<()> {
        let _lock = self.lock()?;

        match fs::remove_file(&self.config_path) {
            Ok(()) => info!(path = %self.config_path.display(), "removed port config"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.ports.clear();
        self.state = RegistryState::Uninitialized;
        Ok(())
    }

    /// Assigned port for a service
    pub fn get_port(&self, service: &str) -> Option<u16> {
        self.ports.get(service).copied()
    }

    /// Snapshot of every assignment
    pub fn get_all_ports(&self) -> ServicePorts {
        self.ports.clone()
    }

    /// `http://localhost:<port><path>` for a service
    ///
    /// # Errors
    /// `MissingAssignment` if the service has no port
    pub fn get_service_url(&self, service: &str, path: &str) -> Result<String> {
        let port = self
            .get_port(service)
            .ok_or_else(|| RegistryError::MissingAssignment(service.to_string()))?;
        Ok(format!("http://localhost:{}{}", port, path))
    }

    /// Human-readable table of assignments
    pub fn display_ports(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Service ports ({})", self.config_path.display());

        if self.ports.is_empty() {
            let _ = writeln!(out, "  No ports assigned.");
            return out;
        }

        let width = self
            .ports
            .keys()
            .map(|s| s.len())
            .max()
            .unwrap_or(0)
            .max("SERVICE".len());

        let _ = writeln!(out, "  {:<width$}  {:>5}  URL", "SERVICE", "PORT", width = width);
        for (service, port) in &self.ports {
            let _ = writeln!(
                out,
                "  {:<width$}  {:>5}  http://localhost:{}",
                service,
                port,
                port,
                width = width
            );
        }
        out
    }

    pub fn state(&self) -> RegistryState {
        self.state
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// The fixed service list `initialize_ports` allocates for
    pub fn services(&self) -> &[PortConfig] {
        &self.services
    }

    pub fn allocator(&self) -> &PortAllocator<P> {
        &self.allocator
    }
}

fn lock_path_for(config_path: &Path) -> PathBuf {
    let mut name = config_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    config_path.with_file_name(name)
}
