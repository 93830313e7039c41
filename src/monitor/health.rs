//! Health state machine for watched devices

use crate::config::MonitorSettings;
use crate::models::{HealthState, PerformanceSample};

/// Limits that decide healthy versus degraded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    pub failure_threshold: u32,
    pub max_loss_ratio: f64,
    pub max_latency_ms: f64,
}

impl HealthThresholds {
    /// Whether a partially or fully successful sample is within limits
    pub fn is_healthy(&self, sample: &PerformanceSample) -> bool {
        sample.any_success()
            && sample.packet_loss <= self.max_loss_ratio
            && sample.latency_ms.is_none_or(|l| l <= self.max_latency_ms)
    }
}

impl From<&MonitorSettings> for HealthThresholds {
    fn from(settings: &MonitorSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            max_loss_ratio: settings.max_loss_ratio,
            max_latency_ms: settings.max_latency_ms,
        }
    }
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self::from(&MonitorSettings::default())
    }
}

/// Result of feeding one sample to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthUpdate {
    pub state: HealthState,
    pub consecutive_failures: u32,
}

impl HealthUpdate {
    pub fn changed_from(&self, previous: HealthState) -> bool {
        self.state != previous
    }
}

/// Next state after `sample`
///
/// A sample where every probe failed only bumps the failure counter; the
/// device goes `Offline` when the counter reaches the threshold. Any answer
/// resets the counter. `Unknown` becomes `Online` on the first answer;
/// `Online` drops to `Degraded` on an answer outside the limits; `Degraded`
/// and `Offline` return to `Online` on an answer within them.
pub fn evaluate_health(
    current: HealthState,
    consecutive_failures: u32,
    sample: &PerformanceSample,
    thresholds: &HealthThresholds,
) -> HealthUpdate {
    if !sample.any_success() {
        let failures = consecutive_failures.saturating_add(1);
        let state = if failures >= thresholds.failure_threshold {
            HealthState::Offline
        } else {
            current
        };
        return HealthUpdate {
            state,
            consecutive_failures: failures,
        };
    }

    let healthy = thresholds.is_healthy(sample);
    let state = match current {
        HealthState::Unknown => HealthState::Online,
        HealthState::Online if healthy => HealthState::Online,
        HealthState::Online => HealthState::Degraded,
        HealthState::Degraded | HealthState::Offline if healthy => HealthState::Online,
        other => other,
    };

    HealthUpdate {
        state,
        consecutive_failures: 0,
    }
}
