//! MAC Address Vendor Lookup using the OUI database

use mac_oui::Oui;
use std::sync::OnceLock;

/// OUI database, loaded on first lookup
static OUI_DB: OnceLock<Option<Oui>> = OnceLock::new();

fn oui_db() -> Option<&'static Oui> {
    OUI_DB
        .get_or_init(|| match Oui::default() {
            Ok(db) => Some(db),
            Err(e) => {
                crate::log_warn!("OUI database unavailable: {}", e);
                None
            }
        })
        .as_ref()
}

/// Vendor lookup result with randomization detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorInfo {
    pub vendor: Option<String>,
    pub is_randomized: bool,
}

/// Check if a MAC address is locally administered (randomized/virtual)
///
/// Bit 1 (0x02) of the first octet is the U/L bit.
pub fn is_locally_administered(mac: &str) -> bool {
    let first_octet: String = mac
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .take(2)
        .collect();

    if first_octet.len() < 2 {
        return false;
    }

    u8::from_str_radix(&first_octet, 16)
        .map(|byte| byte & 0x02 != 0)
        .unwrap_or(false)
}

/// Look up the manufacturer for a MAC address
///
/// Randomized addresses carry no meaningful OUI, so they skip the database.
pub fn lookup_vendor_info(mac: &str) -> VendorInfo {
    if is_locally_administered(mac) {
        return VendorInfo {
            vendor: None,
            is_randomized: true,
        };
    }

    let vendor = oui_db()
        .and_then(|db| db.lookup_by_mac(mac).ok().flatten())
        .map(|entry| entry.company_name.clone());

    VendorInfo {
        vendor,
        is_randomized: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locally_administered() {
        assert!(is_locally_administered("5a:05:d7:51:07:81"));
        assert!(is_locally_administered("d2:81:c8:45:6b:71"));

        assert!(!is_locally_administered("34:4a:c3:22:6f:90"));
        assert!(!is_locally_administered("00:1C:B3:00:00:00"));
        assert!(!is_locally_administered(""));
    }

    #[test]
    fn randomized_mac_has_no_vendor() {
        let info = lookup_vendor_info("de:b2:52:65:8c:55");
        assert!(info.is_randomized);
        assert!(info.vendor.is_none());
    }
}
