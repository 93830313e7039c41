//! Network interface detection and selection

use anyhow::{Result, anyhow};
use pnet::datalink;
use pnet::util::MacAddr;
use std::net::{IpAddr, Ipv4Addr};

use crate::models::InterfaceInfo;

fn is_virtual_adapter_name(name_lower: &str) -> bool {
    name_lower.contains("hyper-v")
        || name_lower.contains("vmware")
        || name_lower.contains("virtualbox")
        || name_lower.contains("docker")
        || name_lower.contains("vethernet")
        || name_lower.contains("wsl")
        || name_lower.starts_with("veth")
        || name_lower.starts_with("br-")
}

fn is_link_local(ip: &Ipv4Addr) -> bool {
    ip.octets()[0] == 169 && ip.octets()[1] == 254
}

fn collect_candidate_interfaces(pnet_interfaces: &[datalink::NetworkInterface]) -> Vec<InterfaceInfo> {
    let mut candidates = Vec::new();

    for pnet_if in pnet_interfaces {
        if pnet_if.is_loopback() {
            continue;
        }

        // Npcap may report usable Windows adapters as down.
        let has_usable_ipv4 = pnet_if.ips.iter().any(|ip_network| match ip_network.ip() {
            IpAddr::V4(ipv4) => {
                !ipv4.is_unspecified() && ip_network.prefix() > 0 && !is_link_local(&ipv4)
            }
            IpAddr::V6(_) => false,
        });
        if !pnet_if.is_up() && !(cfg!(target_os = "windows") && has_usable_ipv4) {
            crate::log_debug!("Skipping down adapter: {}", pnet_if.name);
            continue;
        }

        let mac = match pnet_if.mac {
            Some(m) if m != MacAddr::zero() => m,
            _ => continue,
        };

        let name_lower = pnet_if.name.to_lowercase();
        if is_virtual_adapter_name(&name_lower) {
            crate::log_debug!("Skipping virtual adapter: {}", pnet_if.name);
            continue;
        }

        for ip_network in &pnet_if.ips {
            if let IpAddr::V4(ipv4) = ip_network.ip() {
                if ipv4.is_unspecified() || ip_network.prefix() == 0 || is_link_local(&ipv4) {
                    continue;
                }

                candidates.push(InterfaceInfo {
                    name: pnet_if.name.clone(),
                    ip: ipv4,
                    mac: mac.to_string(),
                    prefix_len: ip_network.prefix(),
                });
            }
        }
    }

    candidates.sort_by_key(|c| std::cmp::Reverse(interface_score(&c.ip)));
    candidates
}

/// Finds the best IPv4 interface with a hardware address
///
/// Physical adapters on typical LAN ranges are preferred.
pub fn find_valid_interface() -> Result<InterfaceInfo> {
    let pnet_interfaces = datalink::interfaces();

    crate::log_debug!("Scanning {} network interfaces...", pnet_interfaces.len());

    if let Some(best) = collect_candidate_interfaces(&pnet_interfaces).into_iter().next() {
        crate::log_debug!(
            "Selected interface: {} (IP: {}/{}, MAC: {})",
            best.name,
            best.ip,
            best.prefix_len,
            best.mac
        );
        return Ok(best);
    }

    crate::log_warn!("No valid interface found. Available interfaces:");
    for pnet_if in &pnet_interfaces {
        crate::log_warn!(
            "  - {} (loopback: {}, mac: {:?}, ips: {:?})",
            pnet_if.name,
            pnet_if.is_loopback(),
            pnet_if.mac,
            pnet_if.ips
        );
    }

    Err(anyhow!(
        "No valid IPv4 network interface found. Ensure you have an active network connection."
    ))
}

/// Valid interfaces in priority order
pub fn list_valid_interfaces() -> Vec<InterfaceInfo> {
    let mut seen = Vec::new();
    collect_candidate_interfaces(&datalink::interfaces())
        .into_iter()
        .filter(|c| {
            if seen.contains(&c.name) {
                false
            } else {
                seen.push(c.name.clone());
                true
            }
        })
        .collect()
}

/// Scores an IP address for interface selection priority
pub fn interface_score(ip: &Ipv4Addr) -> u32 {
    let octets = ip.octets();
    match octets[0] {
        192 if octets[1] == 168 => 100, // home/office LAN
        10 => 90,
        172 if (16..=31).contains(&octets[1]) => 50, // often container bridges
        _ => 70,
    }
}
