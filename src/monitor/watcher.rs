//! Background inventory watcher
//!
//! Rescans a range on a fixed interval and reports devices that appeared,
//! disappeared, came back or moved to another address. Events go to a
//! caller-supplied callback.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::events::{InventoryEvent, MonitoringStatus};
use crate::config::{INVENTORY_RESCAN_INTERVAL, MAX_MONITOR_INTERVAL, MIN_MONITOR_INTERVAL};
use crate::discovery::DiscoveryScanner;
use crate::models::Device;
use crate::network::AddressRange;

const OFFLINE_RETENTION_SECS: u64 = 3600;

/// Event callback type
pub type EventCallback = Arc<dyn Fn(InventoryEvent) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct OfflineDevice {
    device: Device,
    since: Instant,
}

/// Hardware address when known, otherwise the IP
fn identity(device: &Device) -> String {
    device
        .mac
        .clone()
        .unwrap_or_else(|| device.address.to_string())
}

/// Periodic rescans with change detection
pub struct InventoryWatcher {
    scanner: Arc<DiscoveryScanner>,
    is_running: Arc<AtomicBool>,
    /// Bumped on every start/stop so a stale loop exits
    generation: Arc<AtomicU64>,
    interval_seconds: Arc<Mutex<u64>>,
    scan_count: Arc<AtomicU32>,
    last_scan_time: Arc<Mutex<Option<DateTime<Utc>>>>,
    previous_devices: Arc<Mutex<HashMap<String, Device>>>,
    offline_devices: Arc<Mutex<HashMap<String, OfflineDevice>>>,
    devices_total: Arc<AtomicU32>,
}

impl InventoryWatcher {
    pub fn new(scanner: Arc<DiscoveryScanner>) -> Self {
        Self {
            scanner,
            is_running: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            interval_seconds: Arc::new(Mutex::new(INVENTORY_RESCAN_INTERVAL)),
            scan_count: Arc::new(AtomicU32::new(0)),
            last_scan_time: Arc::new(Mutex::new(None)),
            previous_devices: Arc::new(Mutex::new(HashMap::new())),
            offline_devices: Arc::new(Mutex::new(HashMap::new())),
            devices_total: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Start rescanning `range` (the local subnet when `None`)
    ///
    /// Starting an already running watcher only updates the interval.
    pub async fn start(
        &self,
        range: Option<AddressRange>,
        interval: Option<u64>,
        callback: EventCallback,
    ) {
        let interval_secs = interval
            .unwrap_or(INVENTORY_RESCAN_INTERVAL)
            .clamp(MIN_MONITOR_INTERVAL, MAX_MONITOR_INTERVAL);

        *self.interval_seconds.lock().await = interval_secs;
        if self.is_running.swap(true, Ordering::SeqCst) {
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.scan_count.store(0, Ordering::SeqCst);

        callback(InventoryEvent::MonitoringStarted {
            interval_seconds: interval_secs,
        });

        let scanner = Arc::clone(&self.scanner);
        let is_running = Arc::clone(&self.is_running);
        let current_generation = Arc::clone(&self.generation);
        let scan_count = Arc::clone(&self.scan_count);
        let last_scan_time = Arc::clone(&self.last_scan_time);
        let previous_devices = Arc::clone(&self.previous_devices);
        let offline_devices = Arc::clone(&self.offline_devices);
        let interval_seconds = Arc::clone(&self.interval_seconds);
        let devices_total = Arc::clone(&self.devices_total);

        let active = move || {
            is_running.load(Ordering::SeqCst)
                && current_generation.load(Ordering::SeqCst) == generation
        };

        tokio::spawn(async move {
            crate::log_info!(
                "Inventory watch started (interval: {}s)",
                interval_secs
            );

            while active() {
                let current_scan = scan_count.fetch_add(1, Ordering::SeqCst) + 1;
                callback(InventoryEvent::ScanStarted {
                    scan_number: current_scan,
                });

                let start = Instant::now();
                let outcome = match range {
                    Some(range) => scanner.scan(&range, scanner.settings().concurrency).await,
                    None => match scanner.default_range().await {
                        Ok(range) => scanner.scan(&range, scanner.settings().concurrency).await,
                        Err(e) => Err(e),
                    },
                };

                // A stop during the scan suppresses its events
                if !active() {
                    break;
                }

                match outcome {
                    Ok(devices) => {
                        let duration = start.elapsed().as_millis() as u64;
                        *last_scan_time.lock().await = Some(Utc::now());
                        devices_total.store(devices.len() as u32, Ordering::SeqCst);

                        let events = {
                            let mut prev = previous_devices.lock().await;
                            let mut offline = offline_devices.lock().await;
                            detect_inventory_changes(&mut prev, &mut offline, &devices)
                        };
                        for event in events {
                            callback(event);
                        }

                        let online = devices.iter().filter(|d| d.is_online()).count();
                        callback(InventoryEvent::ScanCompleted {
                            scan_number: current_scan,
                            hosts_found: online,
                            duration_ms: duration,
                        });
                        crate::log_debug!(
                            "Scan #{} complete: {} hosts in {}ms",
                            current_scan,
                            online,
                            duration
                        );
                    }
                    Err(e) => {
                        crate::log_warn!("Scan #{} failed: {}", current_scan, e);
                        callback(InventoryEvent::MonitoringError {
                            message: e.to_string(),
                        });
                    }
                }

                // One-second steps so stop takes effect quickly
                let wait = *interval_seconds.lock().await;
                for _ in 0..wait {
                    if !active() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }

            crate::log_info!("Inventory watch stopped");
            callback(InventoryEvent::MonitoringStopped);
        });
    }

    pub fn stop(&self) {
        if self.is_running.swap(false, Ordering::SeqCst) {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> MonitoringStatus {
        let online = self.previous_devices.lock().await.len();
        MonitoringStatus {
            is_running: self.is_running(),
            interval_seconds: *self.interval_seconds.lock().await,
            scan_count: self.scan_count.load(Ordering::SeqCst),
            last_scan_time: *self.last_scan_time.lock().await,
            devices_online: online,
            devices_total: self.devices_total.load(Ordering::SeqCst) as usize,
        }
    }
}

/// Compares a scan with the previous online set and returns the changes
///
/// `previous_online` is replaced by the current online set. Devices that
/// vanished move to `offline_devices` (kept for an hour) so a later return is
/// reported as "came online" rather than "new".
pub fn detect_inventory_changes(
    previous_online: &mut HashMap<String, Device>,
    offline_devices: &mut HashMap<String, OfflineDevice>,
    current: &[Device],
) -> Vec<InventoryEvent> {
    let now = Instant::now();
    offline_devices.retain(|_, snap| now.duration_since(snap.since).as_secs() <= OFFLINE_RETENTION_SECS);

    let online: Vec<&Device> = current.iter().filter(|d| d.is_online()).collect();
    let current_ids: HashMap<String, &Device> = online.iter().map(|d| (identity(d), *d)).collect();
    let mut events = Vec::new();

    for (id, prev_device) in previous_online.iter() {
        if !current_ids.contains_key(id) {
            crate::log_debug!("Device offline: {} ({})", prev_device.address, id);
            events.push(InventoryEvent::went_offline(prev_device));
            offline_devices.insert(
                id.clone(),
                OfflineDevice {
                    device: prev_device.clone(),
                    since: now,
                },
            );
        }
    }

    let mut next_online: HashMap<String, Device> = HashMap::with_capacity(online.len());

    for device in online {
        let id = identity(device);
        if let Some(prev_device) = previous_online.get(&id) {
            if prev_device.address != device.address
                && let Some(mac) = &device.mac
            {
                events.push(InventoryEvent::DeviceAddressChanged {
                    mac: mac.clone(),
                    old_address: prev_device.address,
                    new_address: device.address,
                });
            }
        } else if let Some(was_offline) = offline_devices.remove(&id) {
            crate::log_debug!("Device back online: {} ({})", device.address, id);
            events.push(InventoryEvent::came_online(device));

            if was_offline.device.address != device.address
                && let Some(mac) = &device.mac
            {
                events.push(InventoryEvent::DeviceAddressChanged {
                    mac: mac.clone(),
                    old_address: was_offline.device.address,
                    new_address: device.address,
                });
            }
        } else {
            crate::log_debug!("New device: {} ({})", device.address, id);
            events.push(InventoryEvent::discovered(device));
        }

        next_online.insert(id, device.clone());
    }

    *previous_online = next_online;
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Reachability;

    fn online(ip: &str, mac: Option<&str>) -> Device {
        let mut device = Device::new(ip.parse().unwrap());
        device.mac = mac.map(str::to_string);
        device.state = Reachability::Online;
        device
    }

    #[test]
    fn first_scan_reports_everything_as_new() {
        let mut prev = HashMap::new();
        let mut offline = HashMap::new();
        let events = detect_inventory_changes(
            &mut prev,
            &mut offline,
            &[online("192.0.2.1", Some("aa:bb:cc:00:00:01")), online("192.0.2.2", None)],
        );

        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| matches!(e, InventoryEvent::NewDeviceDiscovered { .. })));
        assert_eq!(prev.len(), 2);
    }

    #[test]
    fn vanished_then_returning_device_is_not_new() {
        let mut prev = HashMap::new();
        let mut offline = HashMap::new();
        let device = online("192.0.2.5", Some("aa:bb:cc:00:00:05"));

        detect_inventory_changes(&mut prev, &mut offline, std::slice::from_ref(&device));
        let gone = detect_inventory_changes(&mut prev, &mut offline, &[]);
        assert!(matches!(gone[0], InventoryEvent::DeviceWentOffline { .. }));

        let back = detect_inventory_changes(&mut prev, &mut offline, &[device]);
        assert!(matches!(back[0], InventoryEvent::DeviceCameOnline { .. }));
        assert!(offline.is_empty());
    }

    #[test]
    fn offline_marked_devices_count_as_absent() {
        let mut prev = HashMap::new();
        let mut offline = HashMap::new();
        let mut device = online("192.0.2.9", None);
        detect_inventory_changes(&mut prev, &mut offline, std::slice::from_ref(&device));

        device.state = Reachability::Offline;
        let events = detect_inventory_changes(&mut prev, &mut offline, &[device]);
        assert!(matches!(events[0], InventoryEvent::DeviceWentOffline { .. }));
    }

    #[test]
    fn moved_mac_reports_address_change() {
        let mut prev = HashMap::new();
        let mut offline = HashMap::new();
        let mac = Some("aa:bb:cc:00:00:07");
        detect_inventory_changes(&mut prev, &mut offline, &[online("192.0.2.7", mac)]);

        let events = detect_inventory_changes(&mut prev, &mut offline, &[online("192.0.2.17", mac)]);
        assert_eq!(
            events,
            vec![InventoryEvent::DeviceAddressChanged {
                mac: "aa:bb:cc:00:00:07".to_string(),
                old_address: "192.0.2.7".parse().unwrap(),
                new_address: "192.0.2.17".parse().unwrap(),
            }]
        );
    }
}
