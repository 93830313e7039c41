//! Discovery scanner - bounded concurrent sweep of an address range
//!
//! Each address gets one ICMP echo; anything other than a reply falls back to
//! TCP handshakes on a few common ports. Responsive hosts are then enriched
//! with ARP, OUI, reverse-DNS and open-port data and classified. The whole
//! sweep runs under a wall-clock budget; addresses still pending when it
//! expires count as not answering.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::{DiscoverySettings, ProbeSettings};
use crate::error::{EngineError, EngineResult, ProbeError};
use crate::models::{Device, InterfaceInfo, ProbeKind, Reachability, default_device_name};
use crate::network::{
    AddressRange, DNS_TIMEOUT, DeviceClass, LocalNetwork, classify_device, lookup_vendor_info,
};
use crate::scanner::Prober;

/// Extra time granted on top of the summed probe timeouts for one address
const PER_ADDRESS_SLACK: Duration = Duration::from_millis(100);

/// How a live address answered
#[derive(Debug, Clone)]
struct Liveness {
    address: Ipv4Addr,
    via: ProbeKind,
    /// Fallback ports that completed a handshake
    open_ports: Vec<u16>,
}

/// Sweeps address ranges and keeps the resulting device inventory
pub struct DiscoveryScanner {
    prober: Arc<dyn Prober>,
    network: Arc<dyn LocalNetwork>,
    probe: ProbeSettings,
    settings: DiscoverySettings,
    known: RwLock<HashMap<IpAddr, Device>>,
}

impl DiscoveryScanner {
    pub fn new(
        prober: Arc<dyn Prober>,
        network: Arc<dyn LocalNetwork>,
        probe: ProbeSettings,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            prober,
            network,
            probe,
            settings,
            known: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    /// Every device seen so far, sorted by address
    pub fn inventory(&self) -> Vec<Device> {
        let known = match self.known.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut devices: Vec<Device> = known.values().cloned().collect();
        devices.sort_by_key(|d| d.address);
        devices
    }

    /// Last known record for one address
    pub fn device(&self, address: IpAddr) -> Option<Device> {
        let known = match self.known.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        known.get(&address).cloned()
    }

    /// Resolves the interface the engine scans from
    pub async fn local_interface(&self) -> EngineResult<InterfaceInfo> {
        let network = Arc::clone(&self.network);
        tokio::task::spawn_blocking(move || network.local_interface())
            .await
            .map_err(|e| EngineError::DiscoveryFailed(format!("interface lookup task failed: {}", e)))?
            .map_err(|e| EngineError::DiscoveryFailed(format!("{:#}", e)))
    }

    /// Usable interfaces, best first
    pub async fn interfaces(&self) -> Vec<InterfaceInfo> {
        let network = Arc::clone(&self.network);
        tokio::task::spawn_blocking(move || network.interfaces())
            .await
            .unwrap_or_else(|e| {
                crate::log_warn!("Interface listing task failed: {}", e);
                Vec::new()
            })
    }

    /// Range covering the local interface's subnet, capped to `max_hosts`
    /// addresses centered on the local address
    pub async fn default_range(&self) -> EngineResult<AddressRange> {
        let interface = self.local_interface().await?;
        let subnet = AddressRange::local_subnet(&interface)?;
        if subnet.host_count() <= self.settings.max_hosts as u64 {
            return Ok(subnet);
        }

        let window = subnet.addresses_around(interface.ip, self.settings.max_hosts);
        match (window.first(), window.last()) {
            (Some(start), Some(end)) => Ok(AddressRange::Span {
                start: *start,
                end: *end,
            }),
            _ => Ok(subnet),
        }
    }

    /// Sweeps `range` with at most `concurrency` addresses in flight
    ///
    /// Returns responsive hosts plus previously known in-range devices that
    /// did not answer (marked offline), sorted by address.
    pub async fn scan(&self, range: &AddressRange, concurrency: usize) -> EngineResult<Vec<Device>> {
        let interface = self.local_interface().await?;
        let addresses = range.addresses(self.settings.max_hosts)?;
        let started = Instant::now();
        let deadline = started + self.settings.scan_budget;

        crate::log_info!(
            "Scanning {} ({} addresses) from {} [{}], concurrency {}",
            range,
            addresses.len(),
            interface.ip,
            interface.name,
            concurrency
        );

        let gateway = {
            let network = Arc::clone(&self.network);
            tokio::task::spawn_blocking(move || network.default_gateway())
                .await
                .unwrap_or_else(|e| {
                    crate::log_warn!("Gateway lookup task failed: {}", e);
                    None
                })
        };

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let live = self.sweep(&addresses, &semaphore, deadline).await;

        crate::log_info!(
            "{} of {} addresses answered in {:?}",
            live.len(),
            addresses.len(),
            started.elapsed()
        );

        let found = self
            .enrich(&live, &interface, gateway, &semaphore, deadline)
            .await;
        let devices = self.merge_into_inventory(range, found);

        crate::log_debug!("Scan of {} finished in {:?}", range, started.elapsed());
        Ok(devices)
    }

    /// Liveness phase: one bounded probe sequence per address
    async fn sweep(
        &self,
        addresses: &[Ipv4Addr],
        semaphore: &Arc<Semaphore>,
        deadline: Instant,
    ) -> Vec<Liveness> {
        let per_address = self.per_address_timeout();
        let mut tasks = JoinSet::new();

        for &address in addresses {
            let prober = Arc::clone(&self.prober);
            let semaphore = Arc::clone(semaphore);
            let ping_timeout = self.probe.ping_timeout;
            let tcp_timeout = self.probe.tcp_timeout;
            let ports = self.settings.fallback_ports.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                let probe = probe_address(
                    prober.as_ref(),
                    address,
                    ping_timeout,
                    tcp_timeout,
                    &ports,
                );
                match tokio::time::timeout(per_address, probe).await {
                    Ok(answer) => answer,
                    Err(_) => {
                        crate::log_trace!("{} exceeded its probe window", address);
                        None
                    }
                }
            });
        }

        let mut live = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(Some(answer)))) => live.push(answer),
                Ok(Some(Ok(None))) => {}
                Ok(Some(Err(e))) => crate::log_debug!("Probe task failed: {}", e),
                Ok(None) => break,
                Err(_) => {
                    crate::log_warn!(
                        "Scan budget of {:?} exhausted; {} addresses left unanswered",
                        self.settings.scan_budget,
                        tasks.len()
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        live
    }

    /// Enrichment phase: ports, ARP, DNS and classification for live hosts
    async fn enrich(
        &self,
        live: &[Liveness],
        interface: &InterfaceInfo,
        gateway: Option<Ipv4Addr>,
        semaphore: &Arc<Semaphore>,
        deadline: Instant,
    ) -> Vec<Device> {
        // Placeholders survive if the budget runs out mid-enrichment
        let mut devices: HashMap<Ipv4Addr, Device> = live
            .iter()
            .map(|l| {
                let mut device = Device::new(IpAddr::V4(l.address));
                device.state = Reachability::Online;
                device.open_ports = l.open_ports.clone();
                (l.address, device)
            })
            .collect();

        let mut tasks = JoinSet::new();
        for answer in live {
            let answer = answer.clone();
            let prober = Arc::clone(&self.prober);
            let network = Arc::clone(&self.network);
            let semaphore = Arc::clone(semaphore);
            let interface = interface.clone();
            let ports = self.settings.classification_ports.clone();
            let tcp_timeout = self.probe.tcp_timeout;
            let resolve = self.settings.resolve_hostnames;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                Some(
                    describe_host(
                        prober,
                        network,
                        answer,
                        &interface,
                        gateway,
                        &ports,
                        tcp_timeout,
                        resolve,
                    )
                    .await,
                )
            });
        }

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(Some(device)))) => {
                    if let IpAddr::V4(v4) = device.address {
                        devices.insert(v4, device);
                    }
                }
                Ok(Some(Ok(None))) => {}
                Ok(Some(Err(e))) => crate::log_debug!("Enrichment task failed: {}", e),
                Ok(None) => break,
                Err(_) => {
                    crate::log_warn!(
                        "Scan budget exhausted during enrichment; {} hosts keep basic details",
                        tasks.len()
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        // Placeholders still need a gateway check
        for device in devices.values_mut() {
            if Some(device.address) == gateway.map(IpAddr::V4) {
                device.class = DeviceClass::Router;
            }
        }

        devices.into_values().collect()
    }

    /// Folds one scan's results into the inventory and returns the scan view
    fn merge_into_inventory(&self, range: &AddressRange, mut found: Vec<Device>) -> Vec<Device> {
        let responsive: Vec<IpAddr> = found.iter().map(|d| d.address).collect();
        let mut known = match self.known.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        for device in found.iter_mut() {
            if let Some(previous) = known.get(&device.address) {
                device.first_seen = previous.first_seen;
                if device.mac.is_none() {
                    device.mac = previous.mac.clone();
                    device.vendor = device.vendor.take().or_else(|| previous.vendor.clone());
                }
            }
            known.insert(device.address, device.clone());
        }

        let mut result = found;
        for device in known.values_mut() {
            let in_range = match device.address {
                IpAddr::V4(v4) => range.contains(v4),
                IpAddr::V6(_) => false,
            };
            if in_range && !responsive.contains(&device.address) {
                if device.state != Reachability::Offline {
                    crate::log_debug!("{} ({}) no longer answers", device.address, device.name);
                }
                device.state = Reachability::Offline;
                result.push(device.clone());
            }
        }

        result.sort_by_key(|d| d.address);
        result
    }

    fn per_address_timeout(&self) -> Duration {
        let fallback = self.probe.tcp_timeout * self.settings.fallback_ports.len() as u32;
        self.probe.ping_timeout + fallback + PER_ADDRESS_SLACK
    }
}

/// ICMP first, then TCP handshakes on the fallback ports
///
/// A refused connection proves the host is up even though the port is closed.
async fn probe_address(
    prober: &dyn Prober,
    address: Ipv4Addr,
    ping_timeout: Duration,
    tcp_timeout: Duration,
    fallback_ports: &[u16],
) -> Option<Liveness> {
    let target = IpAddr::V4(address);

    match prober.ping_once(target, ping_timeout).await {
        Ok(_) => {
            return Some(Liveness {
                address,
                via: ProbeKind::Icmp,
                open_ports: Vec::new(),
            });
        }
        Err(e) => crate::log_trace!("{} ICMP: {}; trying TCP", address, e),
    }

    for &port in fallback_ports {
        match prober.check_port(target, port, tcp_timeout).await {
            Ok(_) => {
                return Some(Liveness {
                    address,
                    via: ProbeKind::TcpPort(port),
                    open_ports: vec![port],
                });
            }
            Err(ProbeError::ConnectionRefused) => {
                return Some(Liveness {
                    address,
                    via: ProbeKind::TcpPort(port),
                    open_ports: Vec::new(),
                });
            }
            Err(_) => {}
        }
    }

    None
}

/// Builds the full device record for one live host
#[allow(clippy::too_many_arguments)]
async fn describe_host(
    prober: Arc<dyn Prober>,
    network: Arc<dyn LocalNetwork>,
    answer: Liveness,
    interface: &InterfaceInfo,
    gateway: Option<Ipv4Addr>,
    classification_ports: &[u16],
    tcp_timeout: Duration,
    resolve_hostnames: bool,
) -> Device {
    let address = answer.address;
    let target = IpAddr::V4(address);

    // Sequential under the caller's permit: one connection per host in flight
    let mut open_ports = answer.open_ports.clone();
    for &port in classification_ports {
        if open_ports.contains(&port) {
            continue;
        }
        if prober.check_port(target, port, tcp_timeout).await.is_ok() {
            open_ports.push(port);
        }
    }
    open_ports.sort_unstable();

    let mac = if address == interface.ip {
        Some(interface.mac.clone())
    } else {
        let network = Arc::clone(&network);
        let interface = interface.clone();
        tokio::task::spawn_blocking(move || network.hardware_address(&interface, address))
            .await
            .ok()
            .flatten()
    };

    let hostname = if resolve_hostnames {
        let network = Arc::clone(&network);
        let lookup = tokio::task::spawn_blocking(move || network.hostname(target));
        match tokio::time::timeout(DNS_TIMEOUT, lookup).await {
            Ok(Ok(name)) => name,
            _ => None,
        }
    } else {
        None
    };

    let vendor = mac
        .as_deref()
        .and_then(|m| lookup_vendor_info(m).vendor);
    let is_gateway = gateway == Some(address);
    let class = classify_device(vendor.as_deref(), hostname.as_deref(), &open_ports, is_gateway);

    crate::log_debug!(
        "{} up via {:?}: mac={:?} name={:?} class={}",
        address,
        answer.via,
        mac,
        hostname,
        class.as_str()
    );

    let now = Utc::now();
    Device {
        address: target,
        name: hostname.unwrap_or_else(|| default_device_name(target)),
        mac,
        vendor,
        class,
        state: Reachability::Online,
        open_ports,
        first_seen: now,
        last_seen: now,
    }
}
