//! Bandwidth sampling against a TCP echo service
//!
//! The target must run an echo service (RFC 862 or compatible). A short
//! handshake verifies the echo before measuring; anything else is
//! `Unsupported`.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::error::ProbeError;
use crate::models::{BandwidthEstimate, Direction};

const HANDSHAKE: &[u8] = b"lanpulse-bandwidth-probe";
const CHUNK_LEN: usize = 16 * 1024;

async fn connect(target: SocketAddr, timeout: Duration) -> Result<TcpStream, ProbeError> {
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(match ProbeError::from_io(&e) {
            ProbeError::ConnectionRefused => ProbeError::Unsupported,
            ProbeError::Timeout => ProbeError::Timeout,
            _ => ProbeError::Unreachable,
        }),
        Err(_) => Err(ProbeError::Timeout),
    }
}

async fn verify_echo(stream: &mut TcpStream, timeout: Duration) -> Result<(), ProbeError> {
    let exchange = async {
        stream.write_all(HANDSHAKE).await?;
        let mut reply = vec![0u8; HANDSHAKE.len()];
        stream.read_exact(&mut reply).await?;
        Ok::<_, std::io::Error>(reply)
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(Ok(reply)) if reply == HANDSHAKE => Ok(()),
        // Wrong bytes, early EOF or silence: not an echo service
        _ => Err(ProbeError::Unsupported),
    }
}

/// Streams data through the echo service for `duration`
///
/// `Upload` reports bytes written, `Download` bytes echoed back. Both halves
/// run together so the service never stalls on a full send buffer.
pub async fn sample_bandwidth(
    address: IpAddr,
    port: u16,
    duration: Duration,
    direction: Direction,
    connect_timeout: Duration,
) -> Result<BandwidthEstimate, ProbeError> {
    let target = SocketAddr::new(address, port);
    let mut stream = connect(target, connect_timeout).await?;
    verify_echo(&mut stream, connect_timeout).await?;

    let (mut reader, mut writer) = stream.into_split();
    let start = Instant::now();
    let deadline = start + duration;
    let chunk = vec![0xA5u8; CHUNK_LEN];

    let send = async {
        let mut sent = 0u64;
        while let Ok(Ok(())) = tokio::time::timeout_at(deadline, writer.write_all(&chunk)).await {
            sent += chunk.len() as u64;
        }
        sent
    };

    let receive = async {
        let mut received = 0u64;
        let mut buffer = vec![0u8; CHUNK_LEN];
        while let Ok(Ok(n)) = tokio::time::timeout_at(deadline, reader.read(&mut buffer)).await {
            if n == 0 {
                break;
            }
            received += n as u64;
        }
        received
    };

    let (sent, received) = tokio::join!(send, receive);
    let elapsed = start.elapsed();

    let bytes = match direction {
        Direction::Upload => sent,
        Direction::Download => received,
    };

    if bytes == 0 {
        return Err(ProbeError::Timeout);
    }

    crate::log_debug!(
        "Bandwidth {:?} to {}: {} bytes in {:?}",
        direction,
        target,
        bytes,
        elapsed
    );

    Ok(BandwidthEstimate::new(direction, bytes, elapsed))
}
