//! Reachability URLs surfaced to callers: loopback, private-range LAN
//! addresses, and the HTTPS domain URL when SSL is configured.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// RFC 1918 private ranges: `10.*`, `172.16-31.*`, `192.168.*`.
pub fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    match octets {
        [10, ..] => true,
        [172, b, ..] => (16..=31).contains(&b),
        [192, 168, ..] => true,
        _ => false,
    }
}

/// Best-effort LAN interface address, discovered by routing a UDP socket
/// toward a public address (no packet is sent). Only private-range
/// addresses are reported.
pub fn lan_address() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if is_private_ipv4(ip) => Some(ip),
        _ => None,
    }
}

/// The URLs at which a station's internet channel can be reached.
pub fn reachable_urls(http_port: u16, ssl: Option<(&str, u16)>) -> Vec<String> {
    let mut urls = vec![format!("http://127.0.0.1:{http_port}")];
    if let Some(lan) = lan_address() {
        urls.push(format!("http://{lan}:{http_port}"));
    }
    if let Some((domain, https_port)) = ssl {
        urls.push(format!("https://{domain}:{https_port}"));
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_ranges() {
        assert!(is_private_ipv4("10.0.0.1".parse().unwrap()));
        assert!(is_private_ipv4("172.16.0.1".parse().unwrap()));
        assert!(is_private_ipv4("172.31.255.1".parse().unwrap()));
        assert!(is_private_ipv4("192.168.1.10".parse().unwrap()));

        assert!(!is_private_ipv4("172.32.0.1".parse().unwrap()));
        assert!(!is_private_ipv4("172.15.0.1".parse().unwrap()));
        assert!(!is_private_ipv4("8.8.8.8".parse().unwrap()));
        assert!(!is_private_ipv4("192.169.0.1".parse().unwrap()));
    }

    #[test]
    fn test_urls_include_loopback_and_ssl_domain() {
        let urls = reachable_urls(3456, Some(("station.example.org", 3457)));
        assert!(urls.contains(&"http://127.0.0.1:3456".to_string()));
        assert!(urls.contains(&"https://station.example.org:3457".to_string()));
    }

    #[test]
    fn test_urls_without_ssl() {
        let urls = reachable_urls(3456, None);
        assert!(!urls.iter().any(|u| u.starts_with("https://")));
    }
}
