//! Host port availability checks.

use crate::errors::LifecycleError;
use std::net::{Ipv4Addr, TcpListener};
use tracing::debug;

/// Checks whether a host port can be claimed.
pub(crate) trait PortProbe {
    /// Returns `true` if nothing is bound to `port` right now.
    fn is_available(&self, port: u16) -> bool;
}

/// Probes a port by binding it on all interfaces and releasing it right away.
///
/// A single bind attempt is authoritative. Another process can still claim the port between the
/// probe and the container start.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct TcpPortProbe;

impl PortProbe for TcpPortProbe {
    fn is_available(&self, port: u16) -> bool {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)) {
            Ok(listener) => {
                drop(listener);
                true
            }
            Err(e) => {
                debug!("Port {} is not available: {}", port, e);
                false
            }
        }
    }
}

/// Checks that a requested port lies in `1..=65535`.
pub(crate) fn validate_port(port: i64) -> Result<u16, LifecycleError> {
    match u16::try_from(port) {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(LifecycleError::InvalidPort(port.to_string())),
    }
}

/// Parses a port given as free text, e.g. on the command line.
///
/// Anything that is not an integer is rejected with the same error as an out-of-range port.
pub(crate) fn parse_port<S: AsRef<str>>(raw: S) -> Result<i64, LifecycleError> {
    raw.as_ref()
        .trim()
        .parse::<i64>()
        .map_err(|_| LifecycleError::InvalidPort(raw.as_ref().to_string()))
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
