//! Reverse DNS lookup for display names

use dns_lookup::lookup_addr;
use std::net::IpAddr;
use std::time::Duration;

/// Upper bound on one reverse lookup (they are synchronous and run on the blocking pool)
pub const DNS_TIMEOUT: Duration = Duration::from_millis(2000);

/// Perform a reverse DNS lookup for a single address
pub fn reverse_lookup(ip: IpAddr) -> Option<String> {
    match lookup_addr(&ip) {
        // Resolvers without a PTR record echo the address back
        Ok(hostname) if hostname != ip.to_string() => Some(hostname),
        Ok(_) => None,
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_lookup_localhost() {
        let result = reverse_lookup("127.0.0.1".parse().unwrap());
        // Usually "localhost"; CI sandboxes may have no resolver at all
        if let Some(name) = result {
            assert_ne!(name, "127.0.0.1");
        }
    }
}
