use get_if_addrs::get_if_addrs;
use std::net::{IpAddr, UdpSocket};

/// Best-effort guess of the LAN address this host is reachable on.
///
/// Cast endpoints pull media from us, so the media URLs we hand them must
/// carry a routable address, not 127.0.0.1. Opening a UDP socket towards a
/// public address never sends a packet but lets the kernel pick the
/// outbound interface.
pub fn guess_local_ip() -> String {
    match UdpSocket::bind("0.0.0.0:0") {
        Ok(socket) => {
            if socket.connect("8.8.8.8:80").is_ok() {
                if let Ok(local_addr) = socket.local_addr() {
                    return local_addr.ip().to_string();
                }
            }
            "127.0.0.1".to_string()
        }
        Err(_) => "127.0.0.1".to_string(),
    }
}

/// Non-loopback IPv4 addresses of all interfaces, used for multicast joins.
pub fn list_lan_ipv4() -> Vec<std::net::Ipv4Addr> {
    let mut out = Vec::new();
    if let Ok(interfaces) = get_if_addrs() {
        for iface in interfaces {
            if let IpAddr::V4(ipv4) = iface.ip() {
                if !ipv4.is_loopback() {
                    out.push(ipv4);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guess_local_ip_returns_parseable_address() {
        let ip = guess_local_ip();
        assert!(ip.parse::<IpAddr>().is_ok());
    }
}
