//! Address-resolution cache and default-route lookups
//!
//! Reads the kernel tables directly on Linux and falls back to the `arp` /
//! `ip route` / `route print` tools elsewhere.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::process::Command;

const PROC_NET_ARP: &str = "/proc/net/arp";
const PROC_NET_ROUTE: &str = "/proc/net/route";

/// ARP flag for a completed entry
const ATF_COM: u32 = 0x2;

/// Parses `/proc/net/arp` into IP -> MAC, skipping incomplete entries.
pub fn parse_proc_arp(contents: &str) -> HashMap<Ipv4Addr, String> {
    let mut table = HashMap::new();

    for line in contents.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }

        let Ok(ip) = fields[0].parse::<Ipv4Addr>() else {
            continue;
        };
        let flags = u32::from_str_radix(fields[2].trim_start_matches("0x"), 16).unwrap_or(0);
        let mac = fields[3];

        if flags & ATF_COM == 0 || mac == "00:00:00:00:00:00" {
            continue;
        }
        table.insert(ip, mac.to_ascii_lowercase());
    }

    table
}

/// Finds the first MAC-shaped token in `arp` tool output.
///
/// Accepts both `aa:bb:..` (Unix) and `aa-bb-..` (Windows) notation and
/// returns it colon-separated in lowercase.
pub fn find_mac_in_text(text: &str) -> Option<String> {
    text.split(|c: char| c.is_whitespace() || c == '(' || c == ')' || c == '[' || c == ']')
        .find_map(normalize_mac)
}

fn normalize_mac(token: &str) -> Option<String> {
    let parts: Vec<&str> = token.split([':', '-']).collect();
    if parts.len() != 6 {
        return None;
    }
    let mut octets = Vec::with_capacity(6);
    for part in parts {
        if part.is_empty() || part.len() > 2 || !part.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        octets.push(format!("{:0>2}", part.to_ascii_lowercase()));
    }
    let mac = octets.join(":");
    if mac == "00:00:00:00:00:00" || mac == "ff:ff:ff:ff:ff:ff" {
        return None;
    }
    Some(mac)
}

/// Parses `/proc/net/route` and returns the gateway of the default route.
///
/// Destination and gateway columns are little-endian hex.
pub fn parse_proc_route(contents: &str) -> Option<Ipv4Addr> {
    for line in contents.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 || fields[1] != "00000000" {
            continue;
        }
        let Ok(raw) = u32::from_str_radix(fields[2], 16) else {
            continue;
        };
        if raw == 0 {
            continue;
        }
        return Some(Ipv4Addr::from(raw.to_le_bytes()));
    }
    None
}

/// Parses `ip route show default` output (`default via 192.168.1.1 dev eth0`).
pub fn parse_ip_route(output: &str) -> Option<Ipv4Addr> {
    output.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            if token == "via" {
                return tokens.next().and_then(|t| t.parse().ok());
            }
        }
        None
    })
}

/// Parses Windows `route print 0.0.0.0` output.
pub fn parse_route_print(output: &str) -> Option<Ipv4Addr> {
    output.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 3 && fields[0] == "0.0.0.0" && fields[1] == "0.0.0.0" {
            fields[2].parse().ok()
        } else {
            None
        }
    })
}

fn run_tool(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("Failed to run {}", program))?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Default gateway of this host
pub fn default_gateway() -> Result<Option<Ipv4Addr>> {
    if cfg!(target_os = "linux")
        && let Ok(contents) = std::fs::read_to_string(PROC_NET_ROUTE)
        && let Some(gateway) = parse_proc_route(&contents)
    {
        return Ok(Some(gateway));
    }

    if cfg!(target_os = "windows") {
        let output = run_tool("route", &["print", "0.0.0.0"])?;
        return Ok(parse_route_print(&output));
    }

    if cfg!(target_os = "macos") {
        let output = run_tool("route", &["-n", "get", "default"])?;
        return Ok(output
            .lines()
            .find_map(|l| l.trim().strip_prefix("gateway:"))
            .and_then(|g| g.trim().parse().ok()));
    }

    let output = run_tool("ip", &["route", "show", "default"])?;
    Ok(parse_ip_route(&output))
}

/// Hardware address of `ip` from the local ARP cache, if resolved
pub fn lookup_arp_cache(ip: Ipv4Addr) -> Result<Option<String>> {
    if cfg!(target_os = "linux")
        && let Ok(contents) = std::fs::read_to_string(PROC_NET_ARP)
    {
        return Ok(parse_proc_arp(&contents).remove(&ip));
    }

    let ip_text = ip.to_string();
    let flag = if cfg!(target_os = "windows") { "-a" } else { "-n" };
    let output = run_tool("arp", &[flag, &ip_text])?;
    Ok(find_mac_in_text(&output))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROC_ARP: &str = "\
IP address       HW type     Flags       HW address            Mask     Device
192.168.1.1      0x1         0x2         AA:BB:CC:DD:EE:01     *        wlan0
192.168.1.23     0x1         0x0         00:00:00:00:00:00     *        wlan0
192.168.1.40     0x1         0x2         3c:22:fb:10:20:30     *        wlan0
";

    const PROC_ROUTE: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
wlan0\t0001A8C0\t00000000\t0001\t0\t0\t600\t00FFFFFF\t0\t0\t0
wlan0\t00000000\t0101A8C0\t0003\t0\t0\t600\t00000000\t0\t0\t0
";

    #[test]
    fn proc_arp_keeps_only_complete_entries() {
        let table = parse_proc_arp(PROC_ARP);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get(&"192.168.1.1".parse::<Ipv4Addr>().unwrap()).map(String::as_str),
            Some("aa:bb:cc:dd:ee:01")
        );
        assert!(!table.contains_key(&"192.168.1.23".parse::<Ipv4Addr>().unwrap()));
    }

    #[test]
    fn proc_route_decodes_little_endian_gateway() {
        assert_eq!(parse_proc_route(PROC_ROUTE), Some("192.168.1.1".parse().unwrap()));
        assert_eq!(parse_proc_route("Iface\tDestination\tGateway\n"), None);
    }

    #[test]
    fn ip_route_default_via() {
        let out = "default via 10.0.0.1 dev eth0 proto dhcp metric 100\n";
        assert_eq!(parse_ip_route(out), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(parse_ip_route("10.0.0.0/24 dev eth0 scope link\n"), None);
    }

    #[test]
    fn route_print_default_row() {
        let out = "\
Network Destination        Netmask          Gateway       Interface  Metric
          0.0.0.0          0.0.0.0      192.168.0.1    192.168.0.20     35
";
        assert_eq!(parse_route_print(out), Some("192.168.0.1".parse().unwrap()));
    }

    #[test]
    fn mac_found_in_unix_and_windows_arp_output() {
        let unix = "? (192.168.1.40) at 3c:22:fb:10:20:30 on en0 ifscope [ethernet]";
        let windows = "  192.168.1.40          3c-22-fb-10-20-30     dynamic";
        let macos_short = "? (192.168.1.40) at 3c:22:fb:1:2:30 on en0";

        assert_eq!(find_mac_in_text(unix).as_deref(), Some("3c:22:fb:10:20:30"));
        assert_eq!(find_mac_in_text(windows).as_deref(), Some("3c:22:fb:10:20:30"));
        assert_eq!(find_mac_in_text(macos_short).as_deref(), Some("3c:22:fb:01:02:30"));
        assert_eq!(find_mac_in_text("192.168.1.40 (incomplete)"), None);
    }
}
