//! Integration tests for the registry lifecycle
//!
//! Tests the full lifecycle of the port map including:
//! - Batch allocation
//! - Persistence and reload by a sibling instance
//! - Single-service allocation
//! - Clearing and re-allocating

use portmesh_core::{
    PortConfig, PortProbe, RegistryConfig, RegistryError, RegistryState, Result, ServiceRegistry,
    TcpProbe,
};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::net::{Ipv4Addr, TcpListener};
use tempfile::TempDir;

/// Deterministic probe: only the listed ports are busy
#[derive(Default)]
struct BusyPorts(RefCell<HashSet<u16>>);

impl BusyPorts {
    fn with(ports: impl IntoIterator<Item = u16>) -> Self {
        BusyPorts(RefCell::new(ports.into_iter().collect()))
    }
}

impl PortProbe for BusyPorts {
    fn is_available(&self, port: u16) -> Result<bool> {
        Ok(!self.0.borrow().contains(&port))
    }
}

fn ephemeral_port() -> u16 {
    let holder = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
    holder.local_addr().unwrap().port()
}

fn config_with(services: &[(&str, u16)]) -> RegistryConfig {
    RegistryConfig {
        services: services
            .iter()
            .map(|(name, port)| PortConfig::new(*name, *port))
            .collect(),
        ..RegistryConfig::default()
    }
}

#[test]
fn test_complete_registry_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let config = RegistryConfig::default();

    // 1. Fresh registry
    let mut registry =
        ServiceRegistry::with_probe(temp_dir.path(), &config, BusyPorts::default()).unwrap();
    assert_eq!(registry.state(), RegistryState::Loaded);

    // 2. Initialize
    let ports = registry.initialize_ports().unwrap();
    assert_eq!(ports.len(), 3);
    assert_eq!(registry.state(), RegistryState::Populated);

    // 3. Sibling process sees the same map
    let sibling =
        ServiceRegistry::with_probe(temp_dir.path(), &config, BusyPorts::default()).unwrap();
    assert_eq!(sibling.get_all_ports(), ports);
    assert_eq!(
        sibling.get_service_url("api-gateway", "/health").unwrap(),
        "http://localhost:8000/health"
    );

    // 4. Add a late service
    let port = registry.find_port_for_service("booking-service", 3002).unwrap();
    assert_eq!(port, 3003);

    // 5. Clear
    registry.clear_port_config().unwrap();
    assert_eq!(registry.state(), RegistryState::Uninitialized);
    assert!(!temp_dir.path().join(".port-config.json").exists());

    let after_clear =
        ServiceRegistry::with_probe(temp_dir.path(), &config, BusyPorts::default()).unwrap();
    assert!(after_clear.get_all_ports().is_empty());
}

#[test]
fn test_spec_scenario_three_services_all_free() {
    let temp_dir = TempDir::new().unwrap();
    let mut registry = ServiceRegistry::with_probe(
        temp_dir.path(),
        &RegistryConfig::default(),
        BusyPorts::default(),
    )
    .unwrap();

    let ports = registry.initialize_ports().unwrap();

    let expected: Vec<(String, u16)> = vec![
        ("api-gateway".to_string(), 8000),
        ("auth-service".to_string(), 3001),
        ("property-service".to_string(), 3002),
    ];
    assert_eq!(ports.into_iter().collect::<Vec<_>>(), expected);
}

#[test]
fn test_identical_base_port_collision() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_with(&[("api-gateway", 8000), ("helper", 8000)]);
    let mut registry =
        ServiceRegistry::with_probe(temp_dir.path(), &config, BusyPorts::default()).unwrap();

    let ports = registry.initialize_ports().unwrap();

    assert_eq!(ports["api-gateway"], 8000);
    assert_eq!(ports["helper"], 8001);
}

#[test]
fn test_initialize_twice_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let config = RegistryConfig::default();

    let first = ServiceRegistry::with_probe(temp_dir.path(), &config, BusyPorts::with([8000]))
        .unwrap()
        .initialize_ports()
        .unwrap();
    let second = ServiceRegistry::with_probe(temp_dir.path(), &config, BusyPorts::with([8000]))
        .unwrap()
        .initialize_ports()
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first["api-gateway"], 8001);
}

#[test]
fn test_clear_then_initialize_allocates_fresh() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_with(&[("api-gateway", 8000)]);
    let mut registry =
        ServiceRegistry::with_probe(temp_dir.path(), &config, BusyPorts::default()).unwrap();

    // Prior assignment away from the base port
    registry.find_port_for_service("api-gateway", 8050).unwrap();
    assert_eq!(registry.get_port("api-gateway"), Some(8050));

    registry.clear_port_config().unwrap();
    let ports = registry.initialize_ports().unwrap();

    // 8050 is still free, but the fresh allocation starts from the base
    assert_eq!(ports["api-gateway"], 8000);
}

#[test]
fn test_exhaustion_aborts_initialize_and_keeps_file_absent() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_with(&[("api-gateway", 8000)]);
    let mut registry =
        ServiceRegistry::with_probe(temp_dir.path(), &config, BusyPorts::with(8000..8100)).unwrap();

    match registry.initialize_ports() {
        Err(RegistryError::PortExhaustion { service, start, end }) => {
            assert_eq!(service, "api-gateway");
            assert_eq!(start, 8000);
            assert_eq!(end, 8100);
        }
        other => panic!("Expected PortExhaustion, got {:?}", other),
    }

    assert!(!temp_dir.path().join(".port-config.json").exists());
    assert_eq!(registry.state(), RegistryState::Loaded);
}

#[test]
fn test_corrupt_file_recovers_with_empty_map() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join(".port-config.json"), "][ garbage").unwrap();

    let mut registry = ServiceRegistry::with_probe(
        temp_dir.path(),
        &RegistryConfig::default(),
        BusyPorts::default(),
    )
    .unwrap();
    assert!(registry.get_all_ports().is_empty());

    // Next write replaces the corrupt file
    registry.initialize_ports().unwrap();
    let content = fs::read_to_string(temp_dir.path().join(".port-config.json")).unwrap();
    assert!(serde_json::from_str::<serde_json::Value>(&content).is_ok());
}

#[test]
fn test_custom_config_file_name() {
    let temp_dir = TempDir::new().unwrap();
    let config = RegistryConfig {
        config_file: "ports.json".to_string(),
        ..RegistryConfig::default()
    };
    let mut registry =
        ServiceRegistry::with_probe(temp_dir.path(), &config, BusyPorts::default()).unwrap();

    registry.initialize_ports().unwrap();

    assert!(temp_dir.path().join("ports.json").exists());
    assert!(!temp_dir.path().join(".port-config.json").exists());
}

#[test]
fn test_real_probe_skips_held_port() {
    let holder = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
    let held = holder.local_addr().unwrap().port();

    let temp_dir = TempDir::new().unwrap();
    let config = config_with(&[("api-gateway", held)]);
    let mut registry = ServiceRegistry::with_probe(temp_dir.path(), &config, TcpProbe).unwrap();

    let ports = registry.initialize_ports().unwrap();

    assert!(ports["api-gateway"] > held);
    drop(holder);
}

#[test]
fn test_real_probe_batch_is_distinct() {
    let base = ephemeral_port();
    let temp_dir = TempDir::new().unwrap();
    let config = config_with(&[("one", base), ("two", base), ("three", base)]);
    let mut registry = ServiceRegistry::new(temp_dir.path(), &config).unwrap();

    let ports = registry.initialize_ports().unwrap();

    let distinct: HashSet<u16> = ports.values().copied().collect();
    assert_eq!(distinct.len(), 3);
    assert!(ports.values().all(|&p| p >= base));
}
