/**
 * port module
 * Dynamic port allocation and the persisted service registry
 */

pub mod allocator;
pub mod lock;
pub mod probe;
pub mod registry;
pub mod service;

pub use allocator::{PortAllocator, DEFAULT_MAX_ATTEMPTS};
pub use lock::RegistryLock;
pub use probe::{validate_port, PortProbe, TcpProbe};
pub use registry::{RegistryState, ServiceRegistry};
pub use service::{validate_service_name, PortConfig, ServicePorts};
