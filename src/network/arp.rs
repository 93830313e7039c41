//! Single-target ARP resolution over the datalink layer
//!
//! Used when the kernel cache has no entry for a host that just answered a
//! probe. Opening the channel needs raw-socket privileges (Npcap on
//! Windows); without them resolution fails and the host keeps no MAC.

use anyhow::{Result, anyhow};
use pnet::datalink::{self, Channel};
use pnet::packet::Packet;
use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::util::MacAddr;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use crate::models::InterfaceInfo;

const BROADCAST_MAC: MacAddr = MacAddr(0xff, 0xff, 0xff, 0xff, 0xff, 0xff);

/// Ethernet header plus ARP payload
const FRAME_LEN: usize = 42;
const ETHERNET_HEADER_LEN: usize = 14;

/// Receive poll step; the overall wait is the caller's
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Broadcast who-has frame for `target_ip`
pub fn arp_request(source_mac: MacAddr, source_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; FRAME_LEN];

    {
        let mut ethernet = MutableEthernetPacket::new(&mut buffer[..ETHERNET_HEADER_LEN])
            .ok_or_else(|| anyhow!("Failed to construct Ethernet packet buffer"))?;
        ethernet.set_destination(BROADCAST_MAC);
        ethernet.set_source(source_mac);
        ethernet.set_ethertype(EtherTypes::Arp);
    }

    {
        let mut arp = MutableArpPacket::new(&mut buffer[ETHERNET_HEADER_LEN..])
            .ok_or_else(|| anyhow!("Failed to construct ARP packet buffer"))?;
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(ArpOperations::Request);
        arp.set_sender_hw_addr(source_mac);
        arp.set_sender_proto_addr(source_ip);
        arp.set_target_hw_addr(MacAddr::zero());
        arp.set_target_proto_addr(target_ip);
    }

    Ok(buffer)
}

/// Sender MAC of `frame` when it is an ARP reply from `target`
pub fn reply_from(frame: &[u8], target: Ipv4Addr) -> Option<MacAddr> {
    let ethernet = EthernetPacket::new(frame)?;
    if ethernet.get_ethertype() != EtherTypes::Arp {
        return None;
    }
    let arp = ArpPacket::new(ethernet.payload())?;
    if arp.get_operation() == ArpOperations::Reply && arp.get_sender_proto_addr() == target {
        Some(arp.get_sender_hw_addr())
    } else {
        None
    }
}

/// Asks `target` for its hardware address and waits up to `wait` for the reply
///
/// `Ok(None)` means the request went out but nobody answered in time.
pub fn resolve_hardware_address(
    interface: &InterfaceInfo,
    target: Ipv4Addr,
    wait: Duration,
) -> Result<Option<String>> {
    let source_mac: MacAddr = interface
        .mac
        .parse()
        .map_err(|e| anyhow!("Invalid MAC {} on {}: {:?}", interface.mac, interface.name, e))?;
    let pnet_interface = datalink::interfaces()
        .into_iter()
        .find(|candidate| candidate.name == interface.name)
        .ok_or_else(|| anyhow!("Interface {} is gone", interface.name))?;

    let config = datalink::Config {
        read_timeout: Some(READ_TIMEOUT),
        ..Default::default()
    };
    let (mut tx, mut rx) = match datalink::channel(&pnet_interface, config) {
        Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
        Ok(_) => return Err(anyhow!("Unsupported channel type on {}", interface.name)),
        Err(e) => {
            return Err(anyhow!(
                "Failed to open datalink channel on {}: {}",
                interface.name,
                e
            ));
        }
    };

    let request = arp_request(source_mac, interface.ip, target)?;
    match tx.send_to(&request, None) {
        Some(Ok(())) => {}
        Some(Err(e)) => return Err(anyhow!("Failed to send ARP request for {}: {}", target, e)),
        None => return Err(anyhow!("Datalink sender rejected the ARP request for {}", target)),
    }

    let deadline = Instant::now() + wait;
    while Instant::now() < deadline {
        match rx.next() {
            Ok(frame) => {
                if let Some(mac) = reply_from(frame, target) {
                    crate::log_debug!("ARP {} -> {}", target, mac);
                    return Ok(Some(mac.to_string()));
                }
            }
            // Read timeouts surface as errors on some platforms
            Err(_) => std::thread::sleep(Duration::from_micros(50)),
        }
    }

    Ok(None)
}
