#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lanpulse::{
    BandwidthEstimate, Direction, EngineConfig, InterfaceInfo, LocalNetwork, MonitorEngine,
    ProbeError, Prober, SamplerSettings,
};

/// How a scripted host answers one probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Answer {
    Reply(Duration),
    Fail(ProbeError),
    /// Never completes; only the caller's timeout ends it
    Hang,
    /// Alternates reply and timeout, starting with a reply
    Flap(Duration),
}

impl Answer {
    async fn resolve(self, calls: u32) -> Result<Duration, ProbeError> {
        match self {
            Answer::Reply(rtt) => Ok(rtt),
            Answer::Fail(e) => Err(e),
            Answer::Hang => std::future::pending().await,
            Answer::Flap(rtt) if calls % 2 == 0 => Ok(rtt),
            Answer::Flap(_) => Err(ProbeError::Timeout),
        }
    }
}

/// Prober driven by per-address scripts; unscripted targets time out
#[derive(Default)]
pub struct ScriptedProber {
    icmp: Mutex<HashMap<IpAddr, Answer>>,
    tcp: Mutex<HashMap<(IpAddr, u16), Answer>>,
    default_tcp: Mutex<HashMap<IpAddr, Answer>>,
    /// Extra time every ping takes
    ping_delay: Mutex<Duration>,
    /// Extra time every port check takes
    port_delay: Mutex<Duration>,
    pub pings: AtomicU32,
    in_flight: AtomicU32,
    peak_in_flight: AtomicU32,
    /// Current and peak calls in flight per target
    per_target: Mutex<HashMap<IpAddr, (u32, u32)>>,
}

/// Marks one prober call in flight until dropped, cancellation included
struct InFlight<'a> {
    prober: &'a ScriptedProber,
    address: IpAddr,
}

impl<'a> InFlight<'a> {
    fn enter(prober: &'a ScriptedProber, address: IpAddr) -> Self {
        let now = prober.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        prober.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        {
            let mut targets = prober.per_target.lock().unwrap();
            let slot = targets.entry(address).or_insert((0, 0));
            slot.0 += 1;
            slot.1 = slot.1.max(slot.0);
        }
        Self { prober, address }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.prober.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Ok(mut targets) = self.prober.per_target.lock()
            && let Some(slot) = targets.get_mut(&self.address)
        {
            slot.0 -= 1;
        }
    }
}

impl ScriptedProber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ping(&self, ip: &str, answer: Answer) {
        self.icmp.lock().unwrap().insert(addr(ip), answer);
    }

    pub fn port(&self, ip: &str, port: u16, answer: Answer) {
        self.tcp.lock().unwrap().insert((addr(ip), port), answer);
    }

    /// Answer for every port without a specific script
    pub fn all_ports(&self, ip: &str, answer: Answer) {
        self.default_tcp.lock().unwrap().insert(addr(ip), answer);
    }

    pub fn set_ping_delay(&self, delay: Duration) {
        *self.ping_delay.lock().unwrap() = delay;
    }

    pub fn set_port_delay(&self, delay: Duration) {
        *self.port_delay.lock().unwrap() = delay;
    }

    /// Most prober calls (pings and port checks) ever in flight at once
    pub fn peak_in_flight(&self) -> u32 {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Most prober calls ever in flight at once against `ip`
    pub fn peak_for(&self, ip: &str) -> u32 {
        self.per_target
            .lock()
            .unwrap()
            .get(&addr(ip))
            .map_or(0, |slot| slot.1)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn ping_once(&self, address: IpAddr, _timeout: Duration) -> Result<Duration, ProbeError> {
        let _in_flight = InFlight::enter(self, address);
        let calls = self.pings.fetch_add(1, Ordering::SeqCst);
        let answer = self
            .icmp
            .lock()
            .unwrap()
            .get(&address)
            .copied()
            .unwrap_or(Answer::Fail(ProbeError::Timeout));
        let delay = *self.ping_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        answer.resolve(calls).await
    }

    async fn check_port(
        &self,
        address: IpAddr,
        port: u16,
        _timeout: Duration,
    ) -> Result<Duration, ProbeError> {
        let _in_flight = InFlight::enter(self, address);
        let specific = self.tcp.lock().unwrap().get(&(address, port)).copied();
        let answer = specific
            .or_else(|| self.default_tcp.lock().unwrap().get(&address).copied())
            .unwrap_or(Answer::Fail(ProbeError::Timeout));
        let delay = *self.port_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        answer.resolve(0).await
    }

    async fn sample_bandwidth(
        &self,
        _address: IpAddr,
        _duration: Duration,
        _direction: Direction,
    ) -> Result<BandwidthEstimate, ProbeError> {
        Err(ProbeError::Unsupported)
    }
}

/// Host network with a fixed interface and gateway
pub struct FakeNetwork {
    pub interface: Option<InterfaceInfo>,
    pub gateway: Option<Ipv4Addr>,
    pub macs: HashMap<Ipv4Addr, String>,
    pub names: HashMap<IpAddr, String>,
}

impl FakeNetwork {
    pub fn lan() -> Self {
        Self {
            interface: Some(InterfaceInfo {
                name: "eth0".to_string(),
                ip: "192.0.2.100".parse().unwrap(),
                mac: "02:00:5e:00:00:64".to_string(),
                prefix_len: 24,
            }),
            gateway: Some("192.0.2.1".parse().unwrap()),
            macs: HashMap::new(),
            names: HashMap::new(),
        }
    }

    pub fn without_interface() -> Self {
        Self {
            interface: None,
            ..Self::lan()
        }
    }
}

impl LocalNetwork for FakeNetwork {
    fn local_interface(&self) -> anyhow::Result<InterfaceInfo> {
        self.interface
            .clone()
            .ok_or_else(|| anyhow::anyhow!("No valid network interface found"))
    }

    fn default_gateway(&self) -> Option<Ipv4Addr> {
        self.gateway
    }

    fn hardware_address(&self, _interface: &InterfaceInfo, ip: Ipv4Addr) -> Option<String> {
        self.macs.get(&ip).cloned()
    }

    fn hostname(&self, ip: IpAddr) -> Option<String> {
        self.names.get(&ip).cloned()
    }
}

pub fn addr(ip: &str) -> IpAddr {
    ip.parse().unwrap()
}

/// Config with instant sampling: `count` probes, no spacing
pub fn fast_config(count: u32) -> EngineConfig {
    EngineConfig::default().with_sampler(SamplerSettings {
        sample_count: count,
        sample_interval: Duration::ZERO,
        ..SamplerSettings::default()
    })
}

pub fn engine(config: EngineConfig, prober: Arc<ScriptedProber>, network: FakeNetwork) -> MonitorEngine {
    MonitorEngine::with_components(config, prober, Arc::new(network))
}
