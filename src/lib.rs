//! lanpulse: local network discovery, performance sampling and health monitoring
//!
//! This crate provides:
//! - ICMP, TCP-connect and bandwidth probe primitives
//! - Bounded concurrent discovery sweeps with device classification
//! - Latency, jitter and loss sampling with TCP fallback when ICMP is denied
//! - Per-device watch tasks driving a health state machine
//! - Alert fan-out to callbacks and broadcast streams
//! - Bounded per-device sample history

pub mod alerts;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod network;
pub mod sampler;
pub mod scanner;

pub use alerts::{AlertDevice, AlertDispatcher, AlertEvent, AlertHandler, AlertSeverity, SubscriptionId};
pub use config::{
    DiscoverySettings, EngineConfig, MonitorSettings, ProbeSettings, SamplerSettings,
};
pub use discovery::DiscoveryScanner;
pub use engine::MonitorEngine;
pub use error::{EngineError, EngineResult, ProbeError};
pub use metrics::{MetricsStore, TimeWindow, history_json};
pub use models::*;
pub use monitor::{
    EventCallback, HealthThresholds, InventoryEvent, InventoryWatcher, MonitorScheduler,
    MonitoringStatus, TickOutcome, evaluate_health,
};
pub use network::{AddressRange, DeviceClass, LocalNetwork, SystemNetwork, classify_device};
pub use sampler::{PerformanceSampler, loss_ratio, mean_jitter, mean_latency};
pub use scanner::{NetworkProber, Prober};

// Re-export logging macros for use across crate
pub use crate::logging::macros;
