//! Scanner module - ICMP, TCP and bandwidth probe primitives

mod bandwidth;
mod icmp;
mod tcp;

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

use crate::config::ProbeSettings;
use crate::error::ProbeError;
use crate::models::{BandwidthEstimate, Direction};

pub use bandwidth::sample_bandwidth;
pub use icmp::IcmpPinger;
pub use tcp::check_port;

/// Probe primitives used by discovery, the sampler and the scheduler
///
/// Every call is one bounded attempt; retries and aggregation happen above.
#[async_trait]
pub trait Prober: Send + Sync {
    /// ICMP echo round-trip
    async fn ping_once(&self, address: IpAddr, timeout: Duration) -> Result<Duration, ProbeError>;

    /// TCP handshake round-trip
    async fn check_port(
        &self,
        address: IpAddr,
        port: u16,
        timeout: Duration,
    ) -> Result<Duration, ProbeError>;

    async fn sample_bandwidth(
        &self,
        address: IpAddr,
        duration: Duration,
        direction: Direction,
    ) -> Result<BandwidthEstimate, ProbeError>;
}

/// `Prober` that talks to the real network
pub struct NetworkProber {
    icmp: IcmpPinger,
    settings: ProbeSettings,
}

impl NetworkProber {
    pub fn new(settings: ProbeSettings) -> Self {
        Self {
            icmp: IcmpPinger::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }
}

impl Default for NetworkProber {
    fn default() -> Self {
        Self::new(ProbeSettings::default())
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn ping_once(&self, address: IpAddr, timeout: Duration) -> Result<Duration, ProbeError> {
        self.icmp.ping_once(address, timeout).await
    }

    async fn check_port(
        &self,
        address: IpAddr,
        port: u16,
        timeout: Duration,
    ) -> Result<Duration, ProbeError> {
        check_port(address, port, timeout).await
    }

    async fn sample_bandwidth(
        &self,
        address: IpAddr,
        duration: Duration,
        direction: Direction,
    ) -> Result<BandwidthEstimate, ProbeError> {
        sample_bandwidth(
            address,
            self.settings.bandwidth_port,
            duration,
            direction,
            self.settings.tcp_timeout,
        )
        .await
    }
}
