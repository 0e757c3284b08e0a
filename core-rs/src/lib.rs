//! # portmesh core - dynamic ports for cooperating local services
//!
//! A gateway and its backend services start as separate processes on one
//! machine. Each of them asks the registry "what port am I" before opening
//! its listener, and "where is service X" when calling a peer.
//!
//! ## Architecture
//!
//! ```text
//! ServiceBootstrap ──▶ ServiceRegistry ──▶ PortAllocator ──▶ PortProbe
//!                            │
//!                            ▼
//!                  <cwd>/.port-config.json   (shared by sibling processes)
//! ```
//!
//! The registry is an explicit value built once at process entry and passed
//! by reference; there is no global instance.

pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod logging;
pub mod port;

pub use bootstrap::{PortSource, ResolvedPort, ServiceBootstrap};
pub use config::RegistryConfig;
pub use errors::{RegistryError, Result};
pub use port::{
    PortAllocator, PortConfig, PortProbe, RegistryState, ServicePorts, ServiceRegistry, TcpProbe,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
