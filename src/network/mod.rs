//! Network module - local interface, gateway, ARP, DNS, vendor and device classification

mod arp;
mod device;
mod dns;
mod interface;
mod neighbors;
mod subnet;
mod vendor;

use anyhow::Result;
use std::net::{IpAddr, Ipv4Addr};

use crate::config::ARP_REPLY_WAIT;
use crate::models::InterfaceInfo;

pub use arp::{arp_request, reply_from, resolve_hardware_address};
pub use device::{
    DeviceClass, class_from_hostname, class_from_ports, class_from_vendor, classify_device,
};
pub use dns::{DNS_TIMEOUT, reverse_lookup};
pub use interface::{find_valid_interface, interface_score, list_valid_interfaces};
pub use neighbors::{
    default_gateway, find_mac_in_text, lookup_arp_cache, parse_ip_route, parse_proc_arp,
    parse_proc_route, parse_route_print,
};
pub use subnet::{AddressRange, is_special_address};
pub use vendor::{VendorInfo, is_locally_administered, lookup_vendor_info};

/// What the host knows about its own link
///
/// Discovery reads interface, gateway, ARP and name information through this
/// seam; all methods may block and are called from the blocking pool.
pub trait LocalNetwork: Send + Sync {
    /// Interface the engine scans from; an error means discovery cannot run
    fn local_interface(&self) -> Result<InterfaceInfo>;

    /// Every usable interface, best first
    fn interfaces(&self) -> Vec<InterfaceInfo> {
        self.local_interface().into_iter().collect()
    }

    fn default_gateway(&self) -> Option<Ipv4Addr>;

    /// MAC address of a neighbour reachable through `interface`
    fn hardware_address(&self, interface: &InterfaceInfo, ip: Ipv4Addr) -> Option<String>;

    /// Reverse-DNS display name
    fn hostname(&self, ip: IpAddr) -> Option<String>;
}

/// `LocalNetwork` backed by the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNetwork;

impl LocalNetwork for SystemNetwork {
    fn local_interface(&self) -> Result<InterfaceInfo> {
        find_valid_interface()
    }

    fn interfaces(&self) -> Vec<InterfaceInfo> {
        list_valid_interfaces()
    }

    fn default_gateway(&self) -> Option<Ipv4Addr> {
        match default_gateway() {
            Ok(gateway) => gateway,
            Err(e) => {
                crate::log_debug!("Default gateway lookup failed: {:#}", e);
                None
            }
        }
    }

    /// Kernel cache first, then one ARP request on the wire
    fn hardware_address(&self, interface: &InterfaceInfo, ip: Ipv4Addr) -> Option<String> {
        match lookup_arp_cache(ip) {
            Ok(Some(mac)) => return Some(mac),
            Ok(None) => {}
            Err(e) => crate::log_debug!("ARP cache lookup for {} failed: {:#}", ip, e),
        }

        match resolve_hardware_address(interface, ip, ARP_REPLY_WAIT) {
            Ok(mac) => mac,
            Err(e) => {
                crate::log_debug!("ARP request for {} failed: {:#}", ip, e);
                None
            }
        }
    }

    fn hostname(&self, ip: IpAddr) -> Option<String> {
        reverse_lookup(ip)
    }
}
