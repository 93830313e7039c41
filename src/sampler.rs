//! Performance sampler - latency, jitter and loss over a short probe window

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use crate::config::{ProbeSettings, SamplerSettings};
use crate::error::ProbeError;
use crate::models::{Device, Direction, PerformanceSample, ProbeKind, ProbeResult};
use crate::scanner::Prober;

/// Mean of the successful round-trip times, in milliseconds
pub fn mean_latency(rtts_ms: &[f64]) -> Option<f64> {
    if rtts_ms.is_empty() {
        return None;
    }
    Some(rtts_ms.iter().sum::<f64>() / rtts_ms.len() as f64)
}

/// Mean absolute difference between consecutive RTTs
///
/// Needs at least two measurements; a single RTT carries no variation.
pub fn mean_jitter(rtts_ms: &[f64]) -> Option<f64> {
    if rtts_ms.len() < 2 {
        return None;
    }
    let total: f64 = rtts_ms.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    Some(total / (rtts_ms.len() - 1) as f64)
}

/// Failed over attempted; zero attempts count as total loss
pub fn loss_ratio(attempts: u32, successes: u32) -> f64 {
    if attempts == 0 {
        return 1.0;
    }
    f64::from(attempts.saturating_sub(successes)) / f64::from(attempts)
}

/// Folds probe outcomes into one `PerformanceSample`
pub fn summarize(target: IpAddr, results: &[ProbeResult]) -> PerformanceSample {
    let rtts: Vec<f64> = results.iter().filter_map(ProbeResult::rtt_ms).collect();
    let attempts = results.len() as u32;
    let successes = results.iter().filter(|r| r.success).count() as u32;

    PerformanceSample {
        target,
        timestamp: results.first().map(|r| r.timestamp).unwrap_or_else(Utc::now),
        latency_ms: mean_latency(&rtts),
        jitter_ms: mean_jitter(&rtts),
        bandwidth: None,
        bandwidth_error: None,
        packet_loss: loss_ratio(attempts, successes),
        attempts,
        successes,
        last_error: results.iter().rev().find_map(|r| r.error),
    }
}

/// Issues spaced probes against one device and aggregates them
///
/// Once ICMP turns out to need privileges the sampler switches to TCP-connect
/// RTT for good.
pub struct PerformanceSampler {
    prober: Arc<dyn Prober>,
    probe: ProbeSettings,
    settings: SamplerSettings,
    icmp_denied: AtomicBool,
}

impl PerformanceSampler {
    pub fn new(prober: Arc<dyn Prober>, probe: ProbeSettings, settings: SamplerSettings) -> Self {
        Self {
            prober,
            probe,
            settings,
            icmp_denied: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }

    pub fn uses_tcp_fallback(&self) -> bool {
        self.icmp_denied.load(Ordering::Relaxed)
    }

    /// Longest a single probe may take, ICMP or the full TCP fallback sweep
    pub fn probe_timeout(&self) -> Duration {
        let tcp = self.probe.tcp_timeout * self.settings.fallback_ports.len().max(1) as u32;
        self.probe.ping_timeout.max(tcp)
    }

    /// Upper bound on one `sample` call with the configured count and interval
    pub fn worst_case_duration(&self) -> Duration {
        self.settings.worst_case_duration(self.probe_timeout())
    }

    /// Upper bound on the bandwidth step of `sample_with_bandwidth`
    ///
    /// Connect and echo check each get a TCP timeout before the transfer runs.
    pub fn bandwidth_cost(&self) -> Duration {
        self.probe.tcp_timeout * 2 + self.probe.bandwidth_duration
    }

    /// Sample with the configured count and interval
    pub async fn sample_default(&self, device: &Device) -> PerformanceSample {
        self.sample(device, self.settings.sample_count, self.settings.sample_interval)
            .await
    }

    /// `sample_count` sequential probes spaced by `interval`
    pub async fn sample(&self, device: &Device, sample_count: u32, interval: Duration) -> PerformanceSample {
        let count = sample_count.max(1);
        let mut results = Vec::with_capacity(count as usize);

        for i in 0..count {
            if i > 0 && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            results.push(self.probe_once(device.address).await);
        }

        let sample = summarize(device.address, &results);
        crate::log_debug!(
            "Sampled {}: latency={:?} jitter={:?} loss={:.2}",
            device.address,
            sample.latency_ms,
            sample.jitter_ms,
            sample.packet_loss
        );
        sample
    }

    /// `sample` followed by one bandwidth measurement
    pub async fn sample_with_bandwidth(
        &self,
        device: &Device,
        sample_count: u32,
        interval: Duration,
        direction: Direction,
    ) -> PerformanceSample {
        let mut sample = self.sample(device, sample_count, interval).await;

        match self
            .prober
            .sample_bandwidth(device.address, self.probe.bandwidth_duration, direction)
            .await
        {
            Ok(estimate) => sample.bandwidth = Some(estimate),
            Err(e) => {
                crate::log_debug!("Bandwidth sample for {} failed: {}", device.address, e);
                sample.bandwidth_error = Some(e);
            }
        }

        sample
    }

    /// One latency probe: ICMP, or TCP connect once ICMP is known to be denied
    pub async fn probe_once(&self, address: IpAddr) -> ProbeResult {
        if !self.uses_tcp_fallback() {
            match self.prober.ping_once(address, self.probe.ping_timeout).await {
                Err(ProbeError::PermissionDenied) => self.switch_to_tcp(),
                outcome => return ProbeResult::from_outcome(address, ProbeKind::Icmp, outcome),
            }
        }

        self.tcp_probe(address).await
    }

    fn switch_to_tcp(&self) {
        if !self.icmp_denied.swap(true, Ordering::Relaxed) {
            crate::log_warn!(
                "ICMP not permitted; sampling with TCP connect on ports {:?}",
                self.settings.fallback_ports
            );
        }
    }

    /// Handshake RTT on the first fallback port that answers
    ///
    /// A refusal is an answer from the host, so its elapsed time is an RTT too.
    async fn tcp_probe(&self, address: IpAddr) -> ProbeResult {
        let mut last_error = ProbeError::Unreachable;

        for &port in &self.settings.fallback_ports {
            let start = Instant::now();
            match self.prober.check_port(address, port, self.probe.tcp_timeout).await {
                Ok(rtt) => return ProbeResult::from_outcome(address, ProbeKind::TcpPort(port), Ok(rtt)),
                Err(ProbeError::ConnectionRefused) => {
                    return ProbeResult::from_outcome(
                        address,
                        ProbeKind::TcpPort(port),
                        Ok(start.elapsed()),
                    );
                }
                Err(e) => last_error = e,
            }
        }

        let port = self.settings.fallback_ports.first().copied().unwrap_or(0);
        ProbeResult::from_outcome(address, ProbeKind::TcpPort(port), Err(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;

    use crate::models::BandwidthEstimate;

    /// Replays a fixed list of ping outcomes
    struct ReplayProber {
        pings: Mutex<VecDeque<Result<Duration, ProbeError>>>,
        tcp_calls: AtomicU32,
    }

    impl ReplayProber {
        fn new(pings: Vec<Result<Duration, ProbeError>>) -> Self {
            Self {
                pings: Mutex::new(pings.into()),
                tcp_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Prober for ReplayProber {
        async fn ping_once(&self, _: IpAddr, _: Duration) -> Result<Duration, ProbeError> {
            self.pings
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ProbeError::Timeout))
        }

        async fn check_port(&self, _: IpAddr, _: u16, _: Duration) -> Result<Duration, ProbeError> {
            self.tcp_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Duration::from_millis(4))
        }

        async fn sample_bandwidth(
            &self,
            _: IpAddr,
            _: Duration,
            _: Direction,
        ) -> Result<BandwidthEstimate, ProbeError> {
            Err(ProbeError::Unsupported)
        }
    }

    fn ms(v: u64) -> Result<Duration, ProbeError> {
        Ok(Duration::from_millis(v))
    }

    fn device() -> Device {
        Device::new("192.0.2.10".parse().unwrap())
    }

    fn sampler(prober: Arc<ReplayProber>) -> PerformanceSampler {
        PerformanceSampler::new(prober, ProbeSettings::default(), SamplerSettings::default())
    }

    #[test]
    fn constant_rtt_has_zero_jitter() {
        assert_eq!(mean_jitter(&[10.0, 10.0, 10.0, 10.0, 10.0]), Some(0.0));
    }

    #[test]
    fn jitter_is_mean_absolute_difference() {
        // |20-10| + |15-20| = 15 over 2 gaps
        assert_eq!(mean_jitter(&[10.0, 20.0, 15.0]), Some(7.5));
    }

    #[test]
    fn three_of_five_is_forty_percent_loss() {
        assert_eq!(loss_ratio(5, 3), 0.4);
    }

    #[tokio::test(start_paused = true)]
    async fn all_failures_report_absent_latency() {
        let prober = Arc::new(ReplayProber::new(vec![Err(ProbeError::Timeout); 5]));
        let sample = sampler(prober)
            .sample(&device(), 5, Duration::from_millis(200))
            .await;

        assert_eq!(sample.latency_ms, None);
        assert_eq!(sample.jitter_ms, None);
        assert_eq!(sample.packet_loss, 1.0);
        assert_eq!(sample.last_error, Some(ProbeError::Timeout));
        assert!(!sample.any_success());
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_run_aggregates_successes_only() {
        let prober = Arc::new(ReplayProber::new(vec![
            ms(10),
            Err(ProbeError::Timeout),
            ms(10),
            Err(ProbeError::Unreachable),
            ms(10),
        ]));
        let sample = sampler(prober)
            .sample(&device(), 5, Duration::from_millis(200))
            .await;

        assert_eq!(sample.attempts, 5);
        assert_eq!(sample.successes, 3);
        assert_eq!(sample.packet_loss, 0.4);
        assert_eq!(sample.latency_ms, Some(10.0));
        assert_eq!(sample.jitter_ms, Some(0.0));
        assert_eq!(sample.last_error, Some(ProbeError::Unreachable));
    }

    #[tokio::test(start_paused = true)]
    async fn permission_denied_switches_to_tcp() {
        let prober = Arc::new(ReplayProber::new(vec![Err(ProbeError::PermissionDenied)]));
        let sampler = sampler(Arc::clone(&prober));

        let sample = sampler.sample(&device(), 3, Duration::ZERO).await;

        assert!(sampler.uses_tcp_fallback());
        assert_eq!(sample.successes, 3);
        assert_eq!(prober.tcp_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn bandwidth_failure_keeps_cause() {
        let prober = Arc::new(ReplayProber::new(vec![ms(5)]));
        let sample = sampler(prober)
            .sample_with_bandwidth(&device(), 1, Duration::ZERO, Direction::Download)
            .await;

        assert!(sample.bandwidth.is_none());
        assert_eq!(sample.bandwidth_error, Some(ProbeError::Unsupported));
        assert_eq!(sample.successes, 1);
    }
}
