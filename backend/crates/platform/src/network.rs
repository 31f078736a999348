//! IPv4 allowlist matching
//!
//! Entries are either a bare IPv4 literal (exact match) or `addr/prefix`
//! (CIDR match). Anything that does not parse as a dotted-quad IPv4 address
//! never matches.

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

const MAPPED_V6_PREFIX: &str = "::ffff:";

/// Trim and strip the IPv4-mapped IPv6 prefix
pub fn normalize_ip(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.get(..MAPPED_V6_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(MAPPED_V6_PREFIX) => {
            &trimmed[MAPPED_V6_PREFIX.len()..]
        }
        _ => trimmed,
    }
}

/// Parse a normalized dotted-quad IPv4 address
pub fn parse_ipv4(raw: &str) -> Option<Ipv4Addr> {
    normalize_ip(raw).parse().ok()
}

/// Parse an allowlist entry into a network; a bare address becomes a /32
pub fn parse_entry(entry: &str) -> Option<Ipv4Net> {
    let entry = entry.trim();
    match entry.split_once('/') {
        None => parse_ipv4(entry).map(Ipv4Net::from),
        Some((addr, prefix)) => {
            let prefix = prefix.trim();
            if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let prefix: u8 = prefix.parse().ok()?;
            Ipv4Net::new(parse_ipv4(addr)?, prefix).ok()
        }
    }
}

/// Whether `entry` is usable in an allowlist
pub fn is_valid_entry(entry: &str) -> bool {
    parse_entry(entry).is_some()
}

/// Whether `candidate` is admitted by a single allowlist entry
pub fn is_allowed(candidate: &str, entry: &str) -> bool {
    let Some(candidate) = parse_ipv4(candidate) else {
        return false;
    };
    parse_entry(entry).is_some_and(|net| net.contains(&candidate))
}

/// Whether `candidate` is admitted by any entry
pub fn matches_any<I, S>(candidate: &str, entries: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let Some(candidate) = parse_ipv4(candidate) else {
        return false;
    };
    entries
        .into_iter()
        .filter_map(|entry| parse_entry(entry.as_ref()))
        .any(|net| net.contains(&candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cidr_membership() {
        assert!(is_allowed("10.0.0.5", "10.0.0.0/24"));
        assert!(!is_allowed("10.0.1.5", "10.0.0.0/24"));
        // host bits in the entry are ignored
        assert!(is_allowed("10.0.0.200", "10.0.0.77/24"));
    }

    #[test]
    fn test_exact_match() {
        assert!(is_allowed("192.168.1.10", "192.168.1.10"));
        assert!(!is_allowed("192.168.1.11", "192.168.1.10"));
        assert!(is_allowed(" 192.168.1.10 ", "192.168.1.10 "));
    }

    #[test]
    fn test_mapped_ipv6_candidate() {
        assert!(is_allowed("::ffff:10.0.0.5", "10.0.0.0/24"));
        assert!(is_allowed("::FFFF:192.168.1.10", "192.168.1.10"));
    }

    #[test]
    fn test_prefix_edges() {
        assert!(is_allowed("8.8.8.8", "0.0.0.0/0"));
        assert!(is_allowed("10.0.0.5", "10.0.0.5/32"));
        assert!(!is_allowed("10.0.0.6", "10.0.0.5/32"));
    }

    #[test]
    fn test_malformed_never_matches() {
        assert!(!is_allowed("10.0.0.5", "10.0.0.0/33"));
        assert!(!is_allowed("10.0.0.5", "10.0.0.0/"));
        assert!(!is_allowed("10.0.0.5", "10.0.0.0/2a"));
        assert!(!is_allowed("10.0.0.5", "10.0.0.0/+24"));
        assert!(!is_allowed("10.0.0.5", "10.0.0/24"));
        assert!(!is_allowed("10.0.0.5", "10.0.0.256"));
        assert!(!is_allowed("10.0.0", "10.0.0.0/24"));
        assert!(!is_allowed("2001:db8::1", "0.0.0.0/0"));
        assert!(!is_allowed("", ""));
    }

    #[test]
    fn test_matches_any_skips_bad_entries() {
        let list = ["garbage", "172.16.0.0/12", "10.0.0.1"];
        assert!(matches_any("172.20.1.1", list));
        assert!(matches_any("10.0.0.1", list));
        assert!(!matches_any("10.0.0.2", list));
        assert!(!matches_any("10.0.0.1", Vec::<String>::new()));
    }

    #[test]
    fn test_entry_validation() {
        assert!(is_valid_entry("10.0.0.0/8"));
        assert!(is_valid_entry("1.2.3.4"));
        assert!(!is_valid_entry("1.2.3.4/-1"));
        assert!(!is_valid_entry("example.com"));
    }
}
