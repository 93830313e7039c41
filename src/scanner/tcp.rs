//! TCP connect probing

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

use crate::error::ProbeError;

/// Completes one TCP handshake against `address:port` and returns its duration
pub async fn check_port(address: IpAddr, port: u16, timeout: Duration) -> Result<Duration, ProbeError> {
    let target = SocketAddr::new(address, port);
    let start = Instant::now();

    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(_stream)) => Ok(start.elapsed()),
        Ok(Err(e)) => {
            crate::log_trace!("TCP connect to {} failed: {}", target, e);
            Err(match ProbeError::from_io(&e) {
                // Connect never needs privileges; EACCES here means a local firewall rule
                ProbeError::PermissionDenied => ProbeError::Unreachable,
                other => other,
            })
        }
        Err(_) => Err(ProbeError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_local_port_succeeds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let rtt = check_port("127.0.0.1".parse().unwrap(), port, Duration::from_secs(2)).await;
        assert!(rtt.is_ok());
    }

    #[tokio::test]
    async fn closed_local_port_is_refused() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = check_port("127.0.0.1".parse().unwrap(), port, Duration::from_secs(2)).await;
        assert_eq!(result, Err(ProbeError::ConnectionRefused));
    }
}
