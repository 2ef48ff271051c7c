use super::{SSDP_MULTICAST_ADDR, SSDP_PORT};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// SSDP events a control point cares about.
#[derive(Debug, Clone)]
pub enum SsdpEvent {
    /// Unicast HTTP/200 answer to our M-SEARCH.
    SearchResponse {
        st: String,
        usn: String,
        location: String,
        from: SocketAddr,
    },
    /// Multicast NOTIFY ssdp:alive announcement.
    Alive {
        nt: String,
        usn: String,
        location: String,
        from: SocketAddr,
    },
}

impl SsdpEvent {
    /// The LOCATION header, whichever message carried it.
    pub fn location(&self) -> &str {
        match self {
            SsdpEvent::SearchResponse { location, .. } => location,
            SsdpEvent::Alive { location, .. } => location,
        }
    }

    /// The search target / notification type.
    pub fn target(&self) -> &str {
        match self {
            SsdpEvent::SearchResponse { st, .. } => st,
            SsdpEvent::Alive { nt, .. } => nt,
        }
    }
}

/// SSDP client: sends M-SEARCH and receives responses on an ephemeral port.
pub struct SsdpClient {
    socket: Arc<UdpSocket>,
}

impl SsdpClient {
    pub fn new() -> std::io::Result<Self> {
        let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;

        let bind_addr: SocketAddr = "0.0.0.0:0".parse().unwrap();
        socket2.bind(&bind_addr.into())?;

        let socket: UdpSocket = socket2.into();
        socket.set_read_timeout(Some(Duration::from_secs(5)))?;
        socket.set_multicast_loop_v4(true)?;

        // Join the group on every LAN interface so NOTIFY announcements
        // reach us too; failures are per-interface and non-fatal.
        for iface in get_if_addrs::get_if_addrs()? {
            if let std::net::IpAddr::V4(ipv4) = iface.ip() {
                if !ipv4.is_loopback() {
                    match socket.join_multicast_v4(&SSDP_MULTICAST_ADDR.parse().unwrap(), &ipv4) {
                        Ok(()) => debug!("SSDP: joined {} on {}", SSDP_MULTICAST_ADDR, ipv4),
                        Err(e) => {
                            warn!("SSDP: failed to join {} on {}: {}", SSDP_MULTICAST_ADDR, ipv4, e)
                        }
                    }
                }
            }
        }

        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Sends one M-SEARCH datagram for the given search target.
    pub fn send_msearch(&self, st: &str, mx: u32) -> std::io::Result<()> {
        let mx = mx.max(1);
        let msg = format!(
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: {}:{}\r\n\
             MAN: \"ssdp:discover\"\r\n\
             MX: {}\r\n\
             ST: {}\r\n\
             \r\n",
            SSDP_MULTICAST_ADDR, SSDP_PORT, mx, st
        );

        let addr: SocketAddr = format!("{}:{}", SSDP_MULTICAST_ADDR, SSDP_PORT)
            .parse()
            .unwrap();

        match self.socket.send_to(msg.as_bytes(), addr) {
            Ok(_) => {
                debug!("M-SEARCH sent (ST={}, MX={})", st, mx);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to send M-SEARCH: {}", e);
                Err(e)
            }
        }
    }

    /// Receive loop. Each datagram is parsed and handed to `on_event`; the
    /// socket's 5s read timeout keeps the loop responsive to `stop`.
    pub fn run_event_loop<F>(&self, stop: &AtomicBool, mut on_event: F)
    where
        F: FnMut(SsdpEvent),
    {
        let mut buf = [0u8; 8192];
        while !stop.load(Ordering::Relaxed) {
            match self.socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    let data = String::from_utf8_lossy(&buf[..n]);
                    if let Some(event) = parse_message(&data, from) {
                        trace!("SSDP event from {}: {:?}", from, event);
                        on_event(event);
                    }
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    warn!("SSDP client read error: {}", e);
                }
            }
        }
        debug!("SSDP receive loop stopped");
    }
}

fn parse_message(data: &str, from: SocketAddr) -> Option<SsdpEvent> {
    let mut lines = data.lines();
    let first_line = lines.next()?.trim();
    let upper = first_line.to_ascii_uppercase();
    let headers = parse_headers(lines);

    if upper.starts_with("HTTP/") && upper.contains(" 200 ") {
        handle_search_response(&headers, from)
    } else if upper.starts_with("NOTIFY ") {
        handle_notify(&headers, from)
    } else {
        // M-SEARCH from another control point, or something malformed.
        None
    }
}

fn handle_search_response(headers: &HashMap<String, String>, from: SocketAddr) -> Option<SsdpEvent> {
    let st = headers.get("ST")?.to_string();
    let usn = headers.get("USN").cloned().unwrap_or_default();
    let location = match headers.get("LOCATION") {
        Some(loc) => loc.to_string(),
        None => {
            trace!("M-SEARCH response from {} missing LOCATION, ignoring", from);
            return None;
        }
    };

    Some(SsdpEvent::SearchResponse {
        st,
        usn,
        location,
        from,
    })
}

fn handle_notify(headers: &HashMap<String, String>, from: SocketAddr) -> Option<SsdpEvent> {
    let nts = headers.get("NTS")?.to_ascii_lowercase();
    if nts != "ssdp:alive" {
        // The directory is additive within a run; byebye is irrelevant.
        return None;
    }
    let nt = headers.get("NT")?.to_string();
    let usn = headers.get("USN").cloned().unwrap_or_default();
    let location = headers.get("LOCATION")?.to_string();

    Some(SsdpEvent::Alive {
        nt,
        usn,
        location,
        from,
    })
}

fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        // Split on the first ':' only; values may contain ':'.
        if let Some(colon_pos) = line.find(':') {
            let (name, value_with_colon) = line.split_at(colon_pos);
            let value = &value_with_colon[1..];
            let name = name.trim().to_ascii_uppercase();
            let value = value.trim().to_string();
            if !name.is_empty() && !value.is_empty() {
                headers.insert(name, value);
            }
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "10.0.0.9:1900".parse().unwrap()
    }

    #[test]
    fn parses_search_response_case_insensitively() {
        let msg = "HTTP/1.1 200 OK\r\n\
                   Cache-Control: max-age=1800\r\n\
                   location: http://10.0.0.9:52235/dmr/description.xml\r\n\
                   ST: urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
                   USN: uuid:abc::urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
                   \r\n";
        let event = parse_message(msg, addr()).unwrap();
        assert_eq!(
            event.location(),
            "http://10.0.0.9:52235/dmr/description.xml"
        );
        assert_eq!(event.target(), "urn:schemas-upnp-org:device:MediaRenderer:1");
    }

    #[test]
    fn parses_notify_alive() {
        let msg = "NOTIFY * HTTP/1.1\r\n\
                   NT: urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
                   NTS: ssdp:alive\r\n\
                   USN: uuid:abc\r\n\
                   LOCATION: http://10.0.0.9:52235/description.xml\r\n\
                   \r\n";
        let event = parse_message(msg, addr()).unwrap();
        assert!(matches!(event, SsdpEvent::Alive { .. }));
    }

    #[test]
    fn ignores_byebye_and_msearch() {
        let byebye = "NOTIFY * HTTP/1.1\r\n\
                      NT: urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
                      NTS: ssdp:byebye\r\n\
                      USN: uuid:abc\r\n\
                      \r\n";
        assert!(parse_message(byebye, addr()).is_none());

        let msearch = "M-SEARCH * HTTP/1.1\r\n\
                       HOST: 239.255.255.250:1900\r\n\
                       ST: ssdp:all\r\n\
                       \r\n";
        assert!(parse_message(msearch, addr()).is_none());
    }

    #[test]
    fn response_without_location_is_skipped() {
        let msg = "HTTP/1.1 200 OK\r\n\
                   ST: urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
                   \r\n";
        assert!(parse_message(msg, addr()).is_none());
    }
}
