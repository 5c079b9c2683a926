// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Names of platform objects derived from allocated values

use crate::constants::{DNS_SUFFIX, GATEWAY_SUFFIX, SECTOR_PREFIX};
use ipnet::Ipv4Net;

/// Platform identifier of the zone and virtual network of the Sector holding `tag`.
#[must_use]
pub fn sector_id(tag: u32) -> String {
    format!("{SECTOR_PREFIX}{tag}")
}

/// Tag encoded in a Sector platform identifier, if `id` is one.
#[must_use]
pub fn sector_tag(id: &str) -> Option<u32> {
    let digits = id.strip_prefix(SECTOR_PREFIX)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[must_use]
pub fn gateway_hostname(tag: u32) -> String {
    format!("{}{GATEWAY_SUFFIX}", sector_id(tag))
}

#[must_use]
pub fn dns_hostname(tag: u32) -> String {
    format!("{}{DNS_SUFFIX}", sector_id(tag))
}

/// Platform identifier of a subnet of virtual network `vnet`.
#[must_use]
pub fn subnet_id(vnet: &str, cidr: &Ipv4Net) -> String {
    format!("{vnet}-{}", cidr.to_string().replace('/', "-"))
}

/// Valid object names: lowercase alphanumerics and inner dashes, 1 to 63 characters.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Valid host names: dot-separated labels that are valid names.
#[must_use]
pub fn is_valid_hostname(name: &str) -> bool {
    name.len() <= 253 && name.split('.').all(is_valid_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(sector_id(1001), "sec1001");
        assert_eq!(gateway_hostname(1001), "sec1001-gw");
        assert_eq!(dns_hostname(4242), "sec4242-dns");
        assert_eq!(
            subnet_id("sec1001", &"172.16.0.0/16".parse().unwrap()),
            "sec1001-172.16.0.0-16"
        );
    }

    #[test]
    fn tag_from_id() {
        assert_eq!(sector_tag("sec1001"), Some(1001));
        assert_eq!(sector_tag("sec"), None);
        assert_eq!(sector_tag("sec10a"), None);
        assert_eq!(sector_tag("bkpln"), None);
    }

    #[test]
    fn name_validity() {
        assert!(is_valid_name("web-tier"));
        assert!(!is_valid_name("Web"));
        assert!(!is_valid_name("-web"));
        assert!(!is_valid_name(""));
        assert!(is_valid_hostname("db.internal"));
        assert!(!is_valid_hostname("db..internal"));
    }
}
