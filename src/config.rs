//! Configuration constants and runtime tunables for the monitoring engine

use std::time::Duration;

// ====== Probe Configuration ======

/// Timeout for each ICMP echo request
pub const PING_TIMEOUT: Duration = Duration::from_millis(800);

/// TCP connect timeout
pub const TCP_PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// TCP port of the bandwidth-echo service on monitored targets (RFC 862 echo)
pub const BANDWIDTH_PORT: u16 = 7;

/// Default length of one bandwidth measurement
pub const BANDWIDTH_DURATION: Duration = Duration::from_secs(2);

// ====== Discovery Configuration ======

/// Maximum concurrent per-address probes during a sweep
pub const MAX_CONCURRENT_PINGS: usize = 200;

/// Maximum hosts in one sweep (254 covers a typical /24)
pub const MAX_SCAN_HOSTS: usize = 254;

/// Common ports tried when ICMP is blocked or not permitted
pub const TCP_PROBE_PORTS: &[u16] = &[22, 80, 443, 445, 3389];

/// Extra ports checked on live hosts to help classification
pub const CLASSIFICATION_PORTS: &[u16] = &[22, 80, 443, 554, 631, 5000, 9100, 62078];

/// Upper bound on one full sweep
pub const SCAN_BUDGET: Duration = Duration::from_secs(30);

/// How long to wait for an ARP reply when the kernel cache has no entry
pub const ARP_REPLY_WAIT: Duration = Duration::from_millis(300);

// ====== Sampler Configuration ======

/// Echo requests per sampling window
pub const SAMPLE_COUNT: u32 = 5;

/// Spacing between echo requests within a window
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

// ====== Monitoring Configuration ======

/// Default monitoring interval in seconds
pub const DEFAULT_MONITOR_INTERVAL: u64 = 60;

/// Minimum monitoring interval in seconds
pub const MIN_MONITOR_INTERVAL: u64 = 5;

/// Maximum monitoring interval in seconds
pub const MAX_MONITOR_INTERVAL: u64 = 3600;

/// Consecutive failed ticks before an entry is declared offline
pub const FAILURE_THRESHOLD: u32 = 3;

/// Packet-loss ratio above which a responding device is degraded
pub const MAX_LOSS_RATIO: f64 = 0.2;

/// Mean latency (ms) above which a responding device is degraded
pub const MAX_LATENCY_MS: f64 = 250.0;

/// Maximum ticks sampling at the same time across the whole watchlist
pub const MAX_CONCURRENT_TICKS: usize = 32;

/// Interval of the background inventory re-scan (the dashboard refreshed every 5 minutes)
pub const INVENTORY_RESCAN_INTERVAL: u64 = 300;

// ====== Metrics / Alerts ======

/// Samples retained per device
pub const HISTORY_CAPACITY: usize = 512;

/// Buffered alerts per stream subscriber before it starts lagging
pub const ALERT_STREAM_CAPACITY: usize = 256;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse_u64(name: &str, default: u64, min: u64, max: u64) -> u64 {
    match env_var(name).and_then(|v| v.parse::<u64>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

fn env_parse_u32(name: &str, default: u32, min: u32, max: u32) -> u32 {
    match env_var(name).and_then(|v| v.parse::<u32>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

fn env_parse_usize(name: &str, default: usize, min: usize, max: usize) -> usize {
    match env_var(name).and_then(|v| v.parse::<usize>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

fn env_parse_u16(name: &str, default: u16, min: u16, max: u16) -> u16 {
    match env_var(name).and_then(|v| v.parse::<u16>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

fn env_parse_f64(name: &str, default: f64, min: f64, max: f64) -> f64 {
    match env_var(name).and_then(|v| v.parse::<f64>().ok()) {
        Some(v) if v.is_finite() => v.clamp(min, max),
        _ => default,
    }
}

fn env_parse_millis(name: &str, default: Duration, min: u64, max: u64) -> Duration {
    Duration::from_millis(env_parse_u64(name, default.as_millis() as u64, min, max))
}

/// Parses a comma-separated port list, e.g. `22,80,443`.
pub fn parse_port_list(raw: &str) -> Vec<u16> {
    raw.split(',')
        .filter_map(|p| p.trim().parse::<u16>().ok())
        .filter(|p| *p > 0)
        .collect()
}

fn env_port_list(name: &str, default: &[u16]) -> Vec<u16> {
    if let Some(raw) = env_var(name) {
        let ports = parse_port_list(&raw);
        if !ports.is_empty() {
            return ports;
        }
    }
    default.to_vec()
}

/// Probe primitive settings
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSettings {
    pub ping_timeout: Duration,
    pub tcp_timeout: Duration,
    pub bandwidth_port: u16,
    pub bandwidth_duration: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            ping_timeout: PING_TIMEOUT,
            tcp_timeout: TCP_PROBE_TIMEOUT,
            bandwidth_port: BANDWIDTH_PORT,
            bandwidth_duration: BANDWIDTH_DURATION,
        }
    }
}

impl ProbeSettings {
    /// Env: `LANPULSE_PING_TIMEOUT_MS`, `LANPULSE_TCP_PROBE_TIMEOUT_MS`,
    /// `LANPULSE_BANDWIDTH_PORT`, `LANPULSE_BANDWIDTH_DURATION_MS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ping_timeout: env_parse_millis(
                "LANPULSE_PING_TIMEOUT_MS",
                defaults.ping_timeout,
                50,
                10_000,
            ),
            tcp_timeout: env_parse_millis(
                "LANPULSE_TCP_PROBE_TIMEOUT_MS",
                defaults.tcp_timeout,
                50,
                10_000,
            ),
            bandwidth_port: env_parse_u16(
                "LANPULSE_BANDWIDTH_PORT",
                defaults.bandwidth_port,
                1,
                u16::MAX,
            ),
            bandwidth_duration: env_parse_millis(
                "LANPULSE_BANDWIDTH_DURATION_MS",
                defaults.bandwidth_duration,
                100,
                60_000,
            ),
        }
    }
}

/// Discovery sweep settings
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverySettings {
    pub concurrency: usize,
    pub max_hosts: usize,
    pub fallback_ports: Vec<u16>,
    pub classification_ports: Vec<u16>,
    pub scan_budget: Duration,
    pub resolve_hostnames: bool,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            concurrency: MAX_CONCURRENT_PINGS,
            max_hosts: MAX_SCAN_HOSTS,
            fallback_ports: TCP_PROBE_PORTS.to_vec(),
            classification_ports: CLASSIFICATION_PORTS.to_vec(),
            scan_budget: SCAN_BUDGET,
            resolve_hostnames: true,
        }
    }
}

impl DiscoverySettings {
    /// Env: `LANPULSE_MAX_CONCURRENT_PINGS`, `LANPULSE_MAX_SCAN_HOSTS`,
    /// `LANPULSE_TCP_PROBE_PORTS`, `LANPULSE_SCAN_BUDGET_MS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: env_parse_usize(
                "LANPULSE_MAX_CONCURRENT_PINGS",
                defaults.concurrency,
                1,
                4096,
            ),
            max_hosts: env_parse_usize("LANPULSE_MAX_SCAN_HOSTS", defaults.max_hosts, 1, 65_536),
            fallback_ports: env_port_list("LANPULSE_TCP_PROBE_PORTS", TCP_PROBE_PORTS),
            classification_ports: defaults.classification_ports,
            scan_budget: env_parse_millis(
                "LANPULSE_SCAN_BUDGET_MS",
                defaults.scan_budget,
                500,
                600_000,
            ),
            resolve_hostnames: defaults.resolve_hostnames,
        }
    }
}

/// Performance sampler settings
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerSettings {
    pub sample_count: u32,
    pub sample_interval: Duration,
    /// Ports used for TCP-connect RTT when ICMP is not permitted
    pub fallback_ports: Vec<u16>,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            sample_count: SAMPLE_COUNT,
            sample_interval: SAMPLE_INTERVAL,
            fallback_ports: TCP_PROBE_PORTS.to_vec(),
        }
    }
}

impl SamplerSettings {
    /// Env: `LANPULSE_SAMPLE_COUNT`, `LANPULSE_SAMPLE_INTERVAL_MS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sample_count: env_parse_u32("LANPULSE_SAMPLE_COUNT", defaults.sample_count, 1, 100),
            sample_interval: env_parse_millis(
                "LANPULSE_SAMPLE_INTERVAL_MS",
                defaults.sample_interval,
                0,
                10_000,
            ),
            fallback_ports: env_port_list("LANPULSE_TCP_PROBE_PORTS", TCP_PROBE_PORTS),
        }
    }

    /// Wall-clock upper bound of one sampling window.
    pub fn worst_case_duration(&self, probe_timeout: Duration) -> Duration {
        let count = self.sample_count.max(1);
        probe_timeout * count + self.sample_interval * (count - 1)
    }
}

/// Health thresholds and scheduling limits for the watchlist
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub default_interval: Duration,
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub failure_threshold: u32,
    pub max_loss_ratio: f64,
    pub max_latency_ms: f64,
    pub max_concurrent_ticks: usize,
    /// Measure bandwidth on every tick (off by default, it costs a few seconds per tick)
    pub measure_bandwidth: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(DEFAULT_MONITOR_INTERVAL),
            min_interval: Duration::from_secs(MIN_MONITOR_INTERVAL),
            max_interval: Duration::from_secs(MAX_MONITOR_INTERVAL),
            failure_threshold: FAILURE_THRESHOLD,
            max_loss_ratio: MAX_LOSS_RATIO,
            max_latency_ms: MAX_LATENCY_MS,
            max_concurrent_ticks: MAX_CONCURRENT_TICKS,
            measure_bandwidth: false,
        }
    }
}

impl MonitorSettings {
    /// Env: `LANPULSE_DEFAULT_MONITOR_INTERVAL`, `LANPULSE_MIN_MONITOR_INTERVAL`,
    /// `LANPULSE_MAX_MONITOR_INTERVAL`, `LANPULSE_FAILURE_THRESHOLD`,
    /// `LANPULSE_MAX_LOSS_RATIO`, `LANPULSE_MAX_LATENCY_MS`, `LANPULSE_MAX_CONCURRENT_TICKS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_interval: Duration::from_secs(env_parse_u64(
                "LANPULSE_DEFAULT_MONITOR_INTERVAL",
                DEFAULT_MONITOR_INTERVAL,
                1,
                86_400,
            )),
            min_interval: Duration::from_secs(env_parse_u64(
                "LANPULSE_MIN_MONITOR_INTERVAL",
                MIN_MONITOR_INTERVAL,
                1,
                86_400,
            )),
            max_interval: Duration::from_secs(env_parse_u64(
                "LANPULSE_MAX_MONITOR_INTERVAL",
                MAX_MONITOR_INTERVAL,
                1,
                86_400,
            )),
            failure_threshold: env_parse_u32(
                "LANPULSE_FAILURE_THRESHOLD",
                defaults.failure_threshold,
                1,
                100,
            ),
            max_loss_ratio: env_parse_f64(
                "LANPULSE_MAX_LOSS_RATIO",
                defaults.max_loss_ratio,
                0.0,
                1.0,
            ),
            max_latency_ms: env_parse_f64(
                "LANPULSE_MAX_LATENCY_MS",
                defaults.max_latency_ms,
                1.0,
                60_000.0,
            ),
            max_concurrent_ticks: env_parse_usize(
                "LANPULSE_MAX_CONCURRENT_TICKS",
                defaults.max_concurrent_ticks,
                1,
                1024,
            ),
            measure_bandwidth: defaults.measure_bandwidth,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub probe: ProbeSettings,
    pub discovery: DiscoverySettings,
    pub sampler: SamplerSettings,
    pub monitor: MonitorSettings,
    pub history_capacity: usize,
    pub alert_stream_capacity: usize,
}

impl EngineConfig {
    /// Builds a config from defaults overridden by `LANPULSE_*` env vars.
    pub fn from_env() -> Self {
        Self {
            probe: ProbeSettings::from_env(),
            discovery: DiscoverySettings::from_env(),
            sampler: SamplerSettings::from_env(),
            monitor: MonitorSettings::from_env(),
            history_capacity: env_parse_usize(
                "LANPULSE_HISTORY_CAPACITY",
                HISTORY_CAPACITY,
                1,
                1_000_000,
            ),
            alert_stream_capacity: env_parse_usize(
                "LANPULSE_ALERT_STREAM_CAPACITY",
                ALERT_STREAM_CAPACITY,
                1,
                65_536,
            ),
        }
    }

    pub fn with_probe(mut self, probe: ProbeSettings) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_discovery(mut self, discovery: DiscoverySettings) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerSettings) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_monitor(mut self, monitor: MonitorSettings) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            probe: ProbeSettings::default(),
            discovery: DiscoverySettings::default(),
            sampler: SamplerSettings::default(),
            monitor: MonitorSettings::default(),
            history_capacity: HISTORY_CAPACITY,
            alert_stream_capacity: ALERT_STREAM_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_port_list_skips_garbage_and_zero() {
        assert_eq!(parse_port_list("22, 80,abc,0,443"), vec![22, 80, 443]);
        assert!(parse_port_list("").is_empty());
    }

    #[test]
    fn worst_case_duration_counts_timeouts_and_gaps() {
        let sampler = SamplerSettings {
            sample_count: 5,
            sample_interval: Duration::from_millis(200),
            fallback_ports: vec![80],
        };
        assert_eq!(
            sampler.worst_case_duration(Duration::from_millis(800)),
            Duration::from_millis(4000 + 800)
        );
    }

    #[test]
    fn default_config_has_nonzero_capacities() {
        let config = EngineConfig::default();
        assert_eq!(config.history_capacity, HISTORY_CAPACITY);
        assert_eq!(config.alert_stream_capacity, ALERT_STREAM_CAPACITY);
        assert_eq!(config.monitor.failure_threshold, FAILURE_THRESHOLD);
    }
}
