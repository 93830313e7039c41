//! Address ranges and subnet utilities

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};
use crate::models::InterfaceInfo;

/// Checks if an IP address is a network or broadcast address
///
/// /31 and /32 have neither (RFC 3021).
pub fn is_special_address(ip: Ipv4Addr, subnet: &Ipv4Network) -> bool {
    subnet.prefix() < 31 && (ip == subnet.network() || ip == subnet.broadcast())
}

/// A set of IPv4 addresses to sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AddressRange {
    /// CIDR block; network and broadcast addresses are skipped
    Cidr { network: Ipv4Network },
    /// Inclusive span of addresses
    Span { start: Ipv4Addr, end: Ipv4Addr },
}

impl AddressRange {
    /// Parses `a.b.c.d/nn`, `a.b.c.d-e.f.g.h`, `a.b.c.d-nn` or a single address.
    pub fn parse(raw: &str) -> EngineResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(EngineError::invalid_target(raw, "empty address range"));
        }

        if raw.contains('/') {
            let network: Ipv4Network = raw
                .parse()
                .map_err(|e| EngineError::invalid_target(raw, format!("{}", e)))?;
            // Normalise host bits away: 192.168.1.77/24 sweeps 192.168.1.0/24
            let network = Ipv4Network::new(network.network(), network.prefix())
                .map_err(|e| EngineError::invalid_target(raw, format!("{}", e)))?;
            return Ok(AddressRange::Cidr { network });
        }

        if let Some((left, right)) = raw.split_once('-') {
            let start = parse_ipv4(raw, left)?;
            let right = right.trim();
            let end = if right.contains('.') {
                parse_ipv4(raw, right)?
            } else {
                // Short form: 192.168.1.10-20
                let last: u8 = right
                    .parse()
                    .map_err(|_| EngineError::invalid_target(raw, "bad range end"))?;
                let o = start.octets();
                Ipv4Addr::new(o[0], o[1], o[2], last)
            };
            if u32::from(end) < u32::from(start) {
                return Err(EngineError::invalid_target(raw, "range end precedes start"));
            }
            return Ok(AddressRange::Span { start, end });
        }

        let single = parse_ipv4(raw, raw)?;
        Ok(AddressRange::Span {
            start: single,
            end: single,
        })
    }

    /// Range covering the interface's own subnet
    pub fn local_subnet(interface: &InterfaceInfo) -> EngineResult<Self> {
        let network = Ipv4Network::new(interface.ip, interface.prefix_len)
            .and_then(|n| Ipv4Network::new(n.network(), interface.prefix_len))
            .map_err(|e| EngineError::invalid_target(interface.ip.to_string(), format!("{}", e)))?;
        Ok(AddressRange::Cidr { network })
    }

    /// Number of addresses a sweep would probe
    pub fn host_count(&self) -> u64 {
        match self {
            AddressRange::Cidr { network } => {
                let total = 1u64 << (32 - u32::from(network.prefix()));
                if network.prefix() < 31 { total - 2 } else { total }
            }
            AddressRange::Span { start, end } => {
                u64::from(u32::from(*end)) - u64::from(u32::from(*start)) + 1
            }
        }
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        match self {
            AddressRange::Cidr { network } => {
                network.contains(ip) && !is_special_address(ip, network)
            }
            AddressRange::Span { start, end } => {
                let value = u32::from(ip);
                value >= u32::from(*start) && value <= u32::from(*end)
            }
        }
    }

    /// Expands the range into individual addresses, refusing more than `max_hosts`
    pub fn addresses(&self, max_hosts: usize) -> EngineResult<Vec<Ipv4Addr>> {
        let count = self.host_count();
        if count > max_hosts as u64 {
            return Err(EngineError::invalid_target(
                self.to_string(),
                format!("{} addresses exceeds the limit of {}", count, max_hosts),
            ));
        }

        Ok(match self {
            AddressRange::Cidr { network } => network
                .iter()
                .filter(|ip| !is_special_address(*ip, network))
                .collect(),
            AddressRange::Span { start, end } => (u32::from(*start)..=u32::from(*end))
                .map(Ipv4Addr::from)
                .collect(),
        })
    }

    /// Like `addresses`, but large ranges shrink to a window centered on `center`
    pub fn addresses_around(&self, center: Ipv4Addr, max_hosts: usize) -> Vec<Ipv4Addr> {
        let all_ips: Vec<Ipv4Addr> = match self {
            AddressRange::Cidr { network } if network.prefix() < 16 => {
                // Never materialise a /8; a /16 window is plenty to center on
                let anchor = Ipv4Network::new(center, 16)
                    .and_then(|n| Ipv4Network::new(n.network(), 16))
                    .unwrap_or(*network);
                return AddressRange::Cidr { network: anchor }.addresses_around(center, max_hosts);
            }
            AddressRange::Cidr { network } => network
                .iter()
                .filter(|ip| !is_special_address(*ip, network))
                .collect(),
            AddressRange::Span { start, end } => (u32::from(*start)..=u32::from(*end))
                .take(1 << 16)
                .map(Ipv4Addr::from)
                .collect(),
        };

        if all_ips.len() <= max_hosts {
            return all_ips;
        }

        crate::log_warn!(
            "Range {} has {} hosts, limiting scan to {} hosts",
            self,
            all_ips.len(),
            max_hosts
        );

        let center_index = all_ips
            .iter()
            .position(|ip| *ip == center)
            .unwrap_or(all_ips.len() / 2);
        let half_window = max_hosts / 2;

        let mut start = center_index.saturating_sub(half_window);
        if start + max_hosts > all_ips.len() {
            start = all_ips.len().saturating_sub(max_hosts);
        }

        all_ips.into_iter().skip(start).take(max_hosts).collect()
    }
}

fn parse_ipv4(raw: &str, part: &str) -> EngineResult<Ipv4Addr> {
    part.trim()
        .parse::<Ipv4Addr>()
        .map_err(|e| EngineError::invalid_target(raw, format!("{}", e)))
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressRange::Cidr { network } => write!(f, "{}", network),
            AddressRange::Span { start, end } if start == end => write!(f, "{}", start),
            AddressRange::Span { start, end } => write!(f, "{}-{}", start, end),
        }
    }
}

impl FromStr for AddressRange {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AddressRange::parse(s)
    }
}

#[cfg(test)]
#[path = "subnet_tests.rs"]
mod subnet_tests;
