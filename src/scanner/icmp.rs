//! ICMP echo probing

use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence, SurgeError};
use tokio::sync::OnceCell;

use crate::error::ProbeError;

/// Echo payload size (matches the classic 64-byte ping)
const PAYLOAD_LEN: usize = 56;

/// Grace on top of the caller timeout before the outer guard fires
const TIMEOUT_SLACK: Duration = Duration::from_millis(50);

/// Generates a ping identifier from the clock
fn rand_id() -> u16 {
    use std::time::SystemTime;
    let duration = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    ((duration.as_nanos() % 0xFFFF) as u16).wrapping_add(1)
}

fn map_surge_error(err: &SurgeError) -> ProbeError {
    match err {
        SurgeError::Timeout { .. } => ProbeError::Timeout,
        SurgeError::IOError(e) => match ProbeError::from_io(e) {
            // Refusal has no meaning for ICMP; treat as no route
            ProbeError::ConnectionRefused => ProbeError::Unreachable,
            other => other,
        },
        _ => ProbeError::Unreachable,
    }
}

/// Lazily-opened ICMP sockets, one per address family
///
/// Socket creation fails without raw-socket privileges; that failure is
/// remembered and reported as `PermissionDenied` on every call so callers
/// can fall back to TCP.
#[derive(Default)]
pub struct IcmpPinger {
    v4: OnceCell<Result<Client, ProbeError>>,
    v6: OnceCell<Result<Client, ProbeError>>,
    sequence: AtomicU16,
}

impl IcmpPinger {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client(&self, address: &IpAddr) -> Result<Client, ProbeError> {
        let (cell, kind) = match address {
            IpAddr::V4(_) => (&self.v4, ICMP::V4),
            IpAddr::V6(_) => (&self.v6, ICMP::V6),
        };

        cell.get_or_init(|| async move {
            let config = Config::builder().kind(kind).build();
            Client::new(&config).map_err(|e| {
                let cause = ProbeError::from_io(&e);
                crate::log_warn!("ICMP client unavailable ({}): {}", cause, e);
                cause
            })
        })
        .await
        .clone()
    }

    /// Sends one echo request and waits for its reply
    pub async fn ping_once(&self, address: IpAddr, timeout: Duration) -> Result<Duration, ProbeError> {
        let client = self.client(&address).await?;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let payload = [0u8; PAYLOAD_LEN];

        let attempt = async {
            let mut pinger = client.pinger(address, PingIdentifier(rand_id())).await;
            pinger.timeout(timeout);
            pinger.ping(PingSequence(sequence), &payload).await
        };

        match tokio::time::timeout(timeout + TIMEOUT_SLACK, attempt).await {
            Ok(Ok((_packet, rtt))) => Ok(rtt),
            Ok(Err(e)) => {
                crate::log_trace!("ICMP echo to {} failed: {}", address, e);
                Err(map_surge_error(&e))
            }
            Err(_) => Err(ProbeError::Timeout),
        }
    }
}
