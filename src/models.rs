//! Data models for the monitoring engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::error::ProbeError;
use crate::network::DeviceClass;

/// Last-known reachability of a device in the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    Online,
    Offline,
    Unknown,
}

impl Reachability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reachability::Online => "online",
            Reachability::Offline => "offline",
            Reachability::Unknown => "unknown",
        }
    }
}

/// One network endpoint seen by discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub address: IpAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    pub class: DeviceClass,
    pub state: Reachability,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub open_ports: Vec<u16>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Device {
    /// Minimal record for an address nobody has described yet.
    pub fn new(address: IpAddr) -> Self {
        let now = Utc::now();
        Self {
            address,
            mac: None,
            name: default_device_name(address),
            vendor: None,
            class: DeviceClass::Unknown,
            state: Reachability::Unknown,
            open_ports: Vec::new(),
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn is_online(&self) -> bool {
        self.state == Reachability::Online
    }
}

/// `Device-<last octet>` placeholder used until a hostname is known
pub fn default_device_name(address: IpAddr) -> String {
    match address {
        IpAddr::V4(v4) => format!("Device-{}", v4.octets()[3]),
        IpAddr::V6(v6) => format!("Device-{:x}", v6.segments()[7]),
    }
}

/// What a probe exercised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "port", rename_all = "snake_case")]
pub enum ProbeKind {
    Icmp,
    TcpPort(u16),
    Bandwidth,
}

/// Outcome of one primitive probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub target: IpAddr,
    pub kind: ProbeKind,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProbeError>,
}

impl ProbeResult {
    pub fn from_outcome(
        target: IpAddr,
        kind: ProbeKind,
        outcome: Result<Duration, ProbeError>,
    ) -> Self {
        let timestamp = Utc::now();
        match outcome {
            Ok(rtt) => Self {
                target,
                kind,
                timestamp,
                success: true,
                rtt: Some(rtt),
                error: None,
            },
            Err(error) => Self {
                target,
                kind,
                timestamp,
                success: false,
                rtt: None,
                error: Some(error),
            },
        }
    }

    pub fn rtt_ms(&self) -> Option<f64> {
        self.rtt.map(|d| d.as_nanos() as f64 / 1_000_000.0)
    }
}

/// Direction of a bandwidth measurement, seen from this host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

/// Result of one bandwidth sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthEstimate {
    pub direction: Direction,
    pub bytes: u64,
    pub elapsed: Duration,
    pub mbps: f64,
}

impl BandwidthEstimate {
    pub fn new(direction: Direction, bytes: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let mbps = if secs > 0.0 {
            (bytes as f64 * 8.0) / secs / 1_000_000.0
        } else {
            0.0
        };
        Self {
            direction,
            bytes,
            elapsed,
            mbps,
        }
    }
}

/// Aggregate of one sampling window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub target: IpAddr,
    pub timestamp: DateTime<Utc>,
    /// Mean RTT of successful probes; absent when nothing answered
    pub latency_ms: Option<f64>,
    /// Mean absolute difference of consecutive successful RTTs
    pub jitter_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<BandwidthEstimate>,
    /// Why a requested bandwidth measurement produced nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_error: Option<ProbeError>,
    pub packet_loss: f64,
    pub attempts: u32,
    pub successes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ProbeError>,
}

impl PerformanceSample {
    /// True when at least one probe in the window answered.
    pub fn any_success(&self) -> bool {
        self.successes > 0
    }
}

/// Health of a watched device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown,
    Online,
    Degraded,
    Offline,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Unknown => "unknown",
            HealthState::Online => "online",
            HealthState::Degraded => "degraded",
            HealthState::Offline => "offline",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A watched device plus its supervision state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub device: Device,
    pub interval: Duration,
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub last_transition: DateTime<Utc>,
    pub ticks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sample_at: Option<DateTime<Utc>>,
}

impl WatchEntry {
    pub fn new(device: Device, interval: Duration) -> Self {
        Self {
            device,
            interval,
            state: HealthState::Unknown,
            consecutive_failures: 0,
            last_transition: Utc::now(),
            ticks: 0,
            last_sample_at: None,
        }
    }

    pub fn address(&self) -> IpAddr {
        self.device.address
    }
}

/// Local interface the engine scans from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub ip: Ipv4Addr,
    pub mac: String,
    pub prefix_len: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_name_uses_last_octet() {
        let ip: IpAddr = "192.168.1.42".parse().unwrap();
        assert_eq!(default_device_name(ip), "Device-42");
    }

    #[test]
    fn probe_result_failure_has_no_rtt() {
        let ip: IpAddr = "192.0.2.1".parse().unwrap();
        let result = ProbeResult::from_outcome(ip, ProbeKind::Icmp, Err(ProbeError::Timeout));
        assert!(!result.success);
        assert!(result.rtt.is_none());
        assert_eq!(result.error, Some(ProbeError::Timeout));
    }

    #[test]
    fn bandwidth_estimate_converts_to_megabits() {
        let estimate =
            BandwidthEstimate::new(Direction::Download, 1_250_000, Duration::from_secs(1));
        assert!((estimate.mbps - 10.0).abs() < 1e-9);
    }

    #[test]
    fn new_device_state_is_unknown() {
        let device = Device::new("10.0.0.5".parse().unwrap());
        assert_eq!(device.state, Reachability::Unknown);
        assert_eq!(device.class, DeviceClass::Unknown);
        assert!(!device.is_online());
    }

    #[test]
    fn probe_kind_serializes_port() {
        let json = serde_json::to_string(&ProbeKind::TcpPort(80)).unwrap();
        assert!(json.contains("\"tcp_port\""));
        assert!(json.contains("80"));
    }
}
