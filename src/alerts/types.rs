//! Alert event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::error::ProbeError;
use crate::models::{Device, HealthState, PerformanceSample};

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "LOW",
            AlertSeverity::Medium => "MEDIUM",
            AlertSeverity::High => "HIGH",
        }
    }

    /// Severity of entering `state`
    pub fn for_state(state: HealthState) -> Self {
        match state {
            HealthState::Offline => AlertSeverity::High,
            HealthState::Degraded => AlertSeverity::Medium,
            HealthState::Online | HealthState::Unknown => AlertSeverity::Low,
        }
    }
}

/// Device identity carried by an alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDevice {
    pub address: IpAddr,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

impl From<&Device> for AlertDevice {
    fn from(device: &Device) -> Self {
        Self {
            address: device.address,
            name: device.name.clone(),
            mac: device.mac.clone(),
        }
    }
}

/// A health-state transition of a watched device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub device: AlertDevice,
    pub previous: HealthState,
    pub current: HealthState,
    pub timestamp: DateTime<Utc>,
    /// Sample that caused the transition
    pub trigger: PerformanceSample,
    pub severity: AlertSeverity,
    pub message: String,
    /// Raw probe failure behind the transition, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<ProbeError>,
}

impl AlertEvent {
    pub fn transition(
        device: &Device,
        previous: HealthState,
        current: HealthState,
        trigger: PerformanceSample,
    ) -> Self {
        let message = describe(device, previous, current, &trigger);
        Self {
            device: AlertDevice::from(device),
            previous,
            current,
            timestamp: Utc::now(),
            cause: trigger.last_error,
            trigger,
            severity: AlertSeverity::for_state(current),
            message,
        }
    }

    pub fn address(&self) -> IpAddr {
        self.device.address
    }
}

fn describe(
    device: &Device,
    previous: HealthState,
    current: HealthState,
    trigger: &PerformanceSample,
) -> String {
    let who = format!("{} ({})", device.name, device.address);
    match current {
        HealthState::Offline => format!(
            "{} went offline after {} failed probes",
            who, trigger.attempts
        ),
        HealthState::Degraded => format!(
            "{} degraded: {:.0}% loss, latency {}",
            who,
            trigger.packet_loss * 100.0,
            trigger
                .latency_ms
                .map(|l| format!("{:.1} ms", l))
                .unwrap_or_else(|| "n/a".to_string())
        ),
        HealthState::Online if previous == HealthState::Unknown => format!("{} is online", who),
        HealthState::Online => format!("{} recovered from {}", who, previous),
        HealthState::Unknown => format!("{} state unknown", who),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_sample(device: &Device) -> PerformanceSample {
        PerformanceSample {
            target: device.address,
            timestamp: Utc::now(),
            latency_ms: None,
            jitter_ms: None,
            bandwidth: None,
            bandwidth_error: None,
            packet_loss: 1.0,
            attempts: 5,
            successes: 0,
            last_error: Some(ProbeError::Timeout),
        }
    }

    #[test]
    fn offline_alert_is_high_and_keeps_cause() {
        let device = Device::new("192.0.2.8".parse().unwrap());
        let sample = failed_sample(&device);
        let event = AlertEvent::transition(&device, HealthState::Online, HealthState::Offline, sample);

        assert_eq!(event.severity, AlertSeverity::High);
        assert_eq!(event.cause, Some(ProbeError::Timeout));
        assert!(event.message.contains("went offline"));
        assert_eq!(event.device.name, "Device-8");
    }

    #[test]
    fn recovery_names_previous_state() {
        let device = Device::new("192.0.2.8".parse().unwrap());
        let mut sample = failed_sample(&device);
        sample.successes = 5;
        sample.packet_loss = 0.0;
        sample.last_error = None;
        let event = AlertEvent::transition(&device, HealthState::Offline, HealthState::Online, sample);

        assert_eq!(event.severity, AlertSeverity::Low);
        assert!(event.message.contains("recovered from offline"));
    }

    #[test]
    fn severity_serializes_as_variant_name() {
        let json = serde_json::to_string(&AlertSeverity::Medium).unwrap();
        assert_eq!(json, "\"Medium\"");
        assert_eq!(AlertSeverity::Medium.as_str(), "MEDIUM");
    }
}
