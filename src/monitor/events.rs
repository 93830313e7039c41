//! Inventory watch events
//!
//! Emitted by the periodic inventory rescan, for UI-style consumers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::models::Device;
use crate::network::DeviceClass;

/// Inventory changes and watch lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum InventoryEvent {
    MonitoringStarted { interval_seconds: u64 },

    MonitoringStopped,

    ScanStarted { scan_number: u32 },

    ScanCompleted {
        scan_number: u32,
        hosts_found: usize,
        duration_ms: u64,
    },

    NewDeviceDiscovered {
        address: IpAddr,
        mac: Option<String>,
        name: String,
        class: DeviceClass,
    },

    DeviceWentOffline {
        address: IpAddr,
        mac: Option<String>,
        name: String,
    },

    DeviceCameOnline {
        address: IpAddr,
        mac: Option<String>,
        name: String,
    },

    /// Same hardware address seen at a new IP
    DeviceAddressChanged {
        mac: String,
        old_address: IpAddr,
        new_address: IpAddr,
    },

    MonitoringError { message: String },
}

impl InventoryEvent {
    pub fn came_online(device: &Device) -> Self {
        InventoryEvent::DeviceCameOnline {
            address: device.address,
            mac: device.mac.clone(),
            name: device.name.clone(),
        }
    }

    pub fn went_offline(device: &Device) -> Self {
        InventoryEvent::DeviceWentOffline {
            address: device.address,
            mac: device.mac.clone(),
            name: device.name.clone(),
        }
    }

    pub fn discovered(device: &Device) -> Self {
        InventoryEvent::NewDeviceDiscovered {
            address: device.address,
            mac: device.mac.clone(),
            name: device.name.clone(),
            class: device.class,
        }
    }
}

/// Inventory watch status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringStatus {
    pub is_running: bool,
    pub interval_seconds: u64,
    pub scan_count: u32,
    pub last_scan_time: Option<DateTime<Utc>>,
    pub devices_online: usize,
    pub devices_total: usize,
}

impl Default for MonitoringStatus {
    fn default() -> Self {
        Self {
            is_running: false,
            interval_seconds: crate::config::INVENTORY_RESCAN_INTERVAL,
            scan_count: 0,
            last_scan_time: None,
            devices_online: 0,
            devices_total: 0,
        }
    }
}
