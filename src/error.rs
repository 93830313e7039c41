//! Error taxonomy
//!
//! `ProbeError` covers per-probe failures, which are always folded into
//! probe/sample/watch state. `EngineError` is the small set of failures that
//! reach the caller.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Failure cause of a single probe primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,
    #[error("target unreachable")]
    Unreachable,
    #[error("connection refused")]
    ConnectionRefused,
    /// Raw ICMP sockets need elevated privileges on most platforms
    #[error("permission denied (raw socket requires elevated privileges)")]
    PermissionDenied,
    /// Target does not run a compatible bandwidth-echo service
    #[error("bandwidth probing unsupported by target")]
    Unsupported,
}

impl ProbeError {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeError::Timeout => "TIMEOUT",
            ProbeError::Unreachable => "UNREACHABLE",
            ProbeError::ConnectionRefused => "CONNECTION_REFUSED",
            ProbeError::PermissionDenied => "PERMISSION_DENIED",
            ProbeError::Unsupported => "UNSUPPORTED",
        }
    }

    /// Maps a socket-level error onto the probe taxonomy.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => ProbeError::PermissionDenied,
            io::ErrorKind::ConnectionRefused => ProbeError::ConnectionRefused,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ProbeError::Timeout,
            _ => ProbeError::Unreachable,
        }
    }
}

/// Engine-level failures surfaced to callers
#[derive(Debug, Error)]
pub enum EngineError {
    /// No usable local network interface (or the sweep could not start)
    #[error("discovery failed: {0}")]
    DiscoveryFailed(String),

    /// Malformed address or address range
    #[error("invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("{0} is not on the watchlist")]
    NotWatched(std::net::IpAddr),
}

impl EngineError {
    pub fn invalid_target(target: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_probe_causes() {
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        let other = io::Error::other("no route to host");

        assert_eq!(ProbeError::from_io(&denied), ProbeError::PermissionDenied);
        assert_eq!(ProbeError::from_io(&refused), ProbeError::ConnectionRefused);
        assert_eq!(ProbeError::from_io(&other), ProbeError::Unreachable);
    }

    #[test]
    fn probe_error_serializes_as_screaming_case() {
        let json = serde_json::to_string(&ProbeError::PermissionDenied).unwrap();
        assert_eq!(json, "\"PERMISSION_DENIED\"");
    }

    #[test]
    fn invalid_target_message_names_target() {
        let err = EngineError::invalid_target("10.0.0.300", "bad octet");
        assert!(err.to_string().contains("10.0.0.300"));
    }
}
