//! Device Class Inference Module
//!
//! Best-effort classification from vendor names, hostnames, and open ports.
//! Every input combination maps onto the closed `DeviceClass` set; anything
//! unrecognised is `Unknown`.

use serde::{Deserialize, Serialize};

/// Device class enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Router,
    Server,
    Desktop,
    Laptop,
    Phone,
    Printer,
    Camera,
    Unknown,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Router => "router",
            DeviceClass::Server => "server",
            DeviceClass::Desktop => "desktop",
            DeviceClass::Laptop => "laptop",
            DeviceClass::Phone => "phone",
            DeviceClass::Printer => "printer",
            DeviceClass::Camera => "camera",
            DeviceClass::Unknown => "unknown",
        }
    }
}

/// Infer device class from vendor name
pub fn class_from_vendor(vendor: &str) -> Option<DeviceClass> {
    let vendor_lower = vendor.to_lowercase();

    // Network equipment vendors
    if contains_any(
        &vendor_lower,
        &[
            "cisco",
            "juniper",
            "mikrotik",
            "ubiquiti",
            "netgear",
            "tp-link",
            "d-link",
            "linksys",
            "arcadyan",
            "sagemcom",
            "avm",
        ],
    ) {
        return Some(DeviceClass::Router);
    }

    // Printers before PCs: "hp" would otherwise swallow HP printers
    if contains_any(
        &vendor_lower,
        &["canon", "epson", "brother", "xerox", "ricoh", "lexmark", "kyocera"],
    ) {
        return Some(DeviceClass::Printer);
    }

    if contains_any(
        &vendor_lower,
        &["hikvision", "dahua", "axis", "wyze", "arlo", "reolink"],
    ) {
        return Some(DeviceClass::Camera);
    }

    if contains_any(
        &vendor_lower,
        &[
            "apple", "samsung", "xiaomi", "huawei", "oppo", "vivo", "oneplus", "realme",
            "motorola",
        ],
    ) {
        return Some(DeviceClass::Phone);
    }

    if contains_any(
        &vendor_lower,
        &["supermicro", "ibm", "oracle", "vmware", "synology", "qnap"],
    ) {
        return Some(DeviceClass::Server);
    }

    if contains_any(
        &vendor_lower,
        &["dell", "lenovo", "hewlett", "acer", "asustek", "msi", "gigabyte", "intel"],
    ) {
        return Some(DeviceClass::Desktop);
    }

    None
}

/// Infer device class from hostname patterns
pub fn class_from_hostname(hostname: &str) -> Option<DeviceClass> {
    let hostname_lower = hostname.to_lowercase();

    if contains_any(&hostname_lower, &["router", "gateway", "gw-", "rt-"]) {
        return Some(DeviceClass::Router);
    }
    if contains_any(&hostname_lower, &["server", "srv", "nas", "db-", "web-"]) {
        return Some(DeviceClass::Server);
    }
    if contains_any(&hostname_lower, &["printer", "print", "prn-", "mfp-"]) {
        return Some(DeviceClass::Printer);
    }
    if contains_any(
        &hostname_lower,
        &["camera", "cam-", "ipcam", "cctv", "nvr", "dvr"],
    ) {
        return Some(DeviceClass::Camera);
    }
    if contains_any(
        &hostname_lower,
        &["iphone", "android", "phone", "mobile", "galaxy", "pixel"],
    ) {
        return Some(DeviceClass::Phone);
    }
    if contains_any(
        &hostname_lower,
        &["laptop", "notebook", "macbook", "thinkpad", "surface"],
    ) {
        return Some(DeviceClass::Laptop);
    }
    if contains_any(&hostname_lower, &["desktop", "workstation", "pc-", "-pc"]) {
        return Some(DeviceClass::Desktop);
    }

    None
}

/// Infer device class from open ports
pub fn class_from_ports(ports: &[u16]) -> Option<DeviceClass> {
    if ports.contains(&9100) || ports.contains(&631) {
        return Some(DeviceClass::Printer);
    }

    // RTSP
    if ports.contains(&554) || ports.contains(&8554) {
        return Some(DeviceClass::Camera);
    }

    // iOS lockdown/sync service
    if ports.contains(&62078) {
        return Some(DeviceClass::Phone);
    }

    if (ports.contains(&22) && ports.contains(&80) && ports.contains(&443))
        || ports.contains(&5000)
        || ports.contains(&5001)
    {
        return Some(DeviceClass::Server);
    }

    if ports.contains(&3389) || ports.contains(&445) {
        return Some(DeviceClass::Desktop);
    }

    None
}

/// Classify a device using all available information
///
/// The gateway wins outright, then vendor (most reliable), hostname, ports.
pub fn classify_device(
    vendor: Option<&str>,
    hostname: Option<&str>,
    ports: &[u16],
    is_gateway: bool,
) -> DeviceClass {
    if is_gateway {
        return DeviceClass::Router;
    }

    if let Some(v) = vendor
        && let Some(class) = class_from_vendor(v)
    {
        return class;
    }

    if let Some(h) = hostname
        && let Some(class) = class_from_hostname(h)
    {
        return class;
    }

    class_from_ports(ports).unwrap_or(DeviceClass::Unknown)
}

fn contains_any(s: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| s.contains(p))
}
