/**
 * probe.rs
 * Side-effect-free TCP port availability check
 *
 * A probe binds a listener on all interfaces and drops it immediately.
 * Only "address already in use" counts as unavailable; every other bind
 * failure is a configuration problem and goes back to the caller.
 *
 * The answer is stale the moment it is returned: another process may bind
 * the port before the real listener starts.
 */

use std::io::ErrorKind;
use std::net::{Ipv4Addr, TcpListener};

use tracing::debug;

use crate::errors::{RegistryError, Result};

/// Lowest valid TCP port
pub const MIN_PORT: u32 = 1;

/// Highest valid TCP port
pub const MAX_PORT: u32 = 65535;

/// Check that a port number lies in 1-65535
///
/// # Errors
/// Returns `Validation` for 0 or anything above 65535
pub fn validate_port(port: u32) -> Result<u16> {
    if !(MIN_PORT..=MAX_PORT).contains(&port) {
        return Err(RegistryError::Validation(format!(
            "Port {} outside valid range {}-{}",
            port, MIN_PORT, MAX_PORT
        )));
    }
    Ok(port as u16)
}

/// Answers "is this port bindable right now"
pub trait PortProbe {
    /// # Returns
    /// `Ok(true)` if free, `Ok(false)` if in use
    ///
    /// # Errors
    /// `Validation` for port 0, `Probe` for any bind failure other than "in use"
    fn is_available(&self, port: u16) -> Result<bool>;
}

/// Probe backed by a real bind+listen on 0.0.0.0
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

impl PortProbe for TcpProbe {
    fn is_available(&self, port: u16) -> Result<bool> {
        validate_port(port as u32)?;

        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)) {
            Ok(listener) => {
                drop(listener);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                debug!(port, "port in use");
                Ok(false)
            }
            Err(e) => Err(RegistryError::Probe { port, source: e }),
        }
    }
}
