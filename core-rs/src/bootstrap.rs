//! Service startup glue: "what port am I" and "where is service X"
//!
//! Startup routines call `ServiceBootstrap::start` before opening their
//! listener. Allocation errors abort startup. A service the registry simply
//! has no entry for falls back to a hardcoded default port instead, and that
//! fallback is logged and recorded in `PortSource`.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::errors::{RegistryError, Result};
use crate::port::{PortProbe, ServiceRegistry};

/// Where a resolved port came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSource {
    Registry,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPort {
    pub port: u16,
    pub source: PortSource,
}

/// Hardcoded default port for a known service
pub fn fallback_port(service: &str) -> Option<u16> {
    match service {
        "api-gateway" => Some(8000),
        "auth-service" => Some(3001),
        "property-service" => Some(3002),
        _ => None,
    }
}

/// Own listen port: registry assignment first, then the hardcoded default
///
/// # Errors
/// `MissingAssignment` if neither exists
pub fn resolve_listen_port<P: PortProbe>(
    registry: &ServiceRegistry<P>,
    service: &str,
) -> Result<ResolvedPort> {
    if let Some(port) = registry.get_port(service) {
        return Ok(ResolvedPort {
            port,
            source: PortSource::Registry,
        });
    }

    match fallback_port(service) {
        Some(port) => {
            warn!(service, port, "no registry assignment, falling back to default port");
            Ok(ResolvedPort {
                port,
                source: PortSource::Fallback,
            })
        }
        None => Err(RegistryError::MissingAssignment(service.to_string())),
    }
}

/// Peer URL: registry assignment first, then the hardcoded default
pub fn resolve_peer_url<P: PortProbe>(
    registry: &ServiceRegistry<P>,
    service: &str,
    path: &str,
) -> Result<String> {
    match registry.get_service_url(service, path) {
        Ok(url) => Ok(url),
        Err(RegistryError::MissingAssignment(_)) => {
            let port = fallback_port(service)
                .ok_or_else(|| RegistryError::MissingAssignment(service.to_string()))?;
            warn!(service, port, "no registry assignment for peer, using default port");
            Ok(format!("http://localhost:{}{}", port, path))
        }
        Err(e) => Err(e),
    }
}

/// Resolved startup view for one service
#[derive(Debug, Clone)]
pub struct ServiceBootstrap {
    service: String,
    listen: ResolvedPort,
    peers: BTreeMap<String, String>,
}

impl ServiceBootstrap {
    /// Initialize the registry, then resolve ports for `service`
    ///
    /// # Errors
    /// Any `initialize_ports` failure is returned as-is; startup must stop.
    pub fn start<P: PortProbe>(registry: &mut ServiceRegistry<P>, service: &str) -> Result<Self> {
        registry.initialize_ports()?;
        Self::resolve(registry, service)
    }

    /// Resolve ports for `service` from the registry's current map
    pub fn resolve<P: PortProbe>(registry: &ServiceRegistry<P>, service: &str) -> Result<Self> {
        let listen = resolve_listen_port(registry, service)?;

        let mut names: Vec<String> = registry
            .services()
            .iter()
            .map(|c| c.service.clone())
            .collect();
        names.extend(registry.get_all_ports().into_keys());

        let mut peers = BTreeMap::new();
        for name in names {
            if name == service || peers.contains_key(&name) {
                continue;
            }
            match resolve_peer_url(registry, &name, "") {
                Ok(url) => {
                    peers.insert(name, url);
                }
                Err(e) => warn!(peer = %name, "skipping peer: {}", e),
            }
        }

        Ok(ServiceBootstrap {
            service: service.to_string(),
            listen,
            peers,
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn listen_port(&self) -> u16 {
        self.listen.port
    }

    pub fn port_source(&self) -> PortSource {
        self.listen.source
    }

    /// 0.0.0.0:<port>
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.listen.port))
    }

    /// Peer name -> base URL
    pub fn peers(&self) -> &BTreeMap<String, String> {
        &self.peers
    }

    pub fn peer_url(&self, peer: &str, path: &str) -> Option<String> {
        self.peers.get(peer).map(|base| format!("{}{}", base, path))
    }

    /// Open the real listener
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.listen_addr()).await?;
        info!(
            service = %self.service,
            port = self.listen.port,
            source = ?self.listen.source,
            "listening"
        );
        Ok(listener)
    }
}
