//! SSDP discovery responder.
//!
//! Joins the SSDP multicast group and answers M-SEARCH queries for the
//! Redfish service type with a unicast pointer at the service root. The
//! advertised UUID comes from the mockup's own service root document.

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
const SSDP_PORT: u16 = 1900;
/// Service type Redfish clients search for.
const REDFISH_SEARCH_TARGET: &str = "urn:dmtf-org:service:redfish-rest:1";

/// Answers SSDP searches on behalf of the mockup.
pub struct SsdpResponder {
    socket: UdpSocket,
    response: String,
}

impl SsdpResponder {
    /// Join the multicast group and prepare the canned search response.
    /// `location` is the full URL of the service root.
    pub fn bind(uuid: &str, location: &str) -> Result<Self, anyhow::Error> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, SSDP_PORT).into();
        socket.bind(&addr.into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        socket.join_multicast_v4(SSDP_MULTICAST_ADDR, Ipv4Addr::UNSPECIFIED)?;

        Ok(Self {
            socket,
            response: search_response(uuid, location),
        })
    }

    /// Receive and answer searches until the process is stopped.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        info!(
            "SSDP responder joined {}:{} as {}",
            SSDP_MULTICAST_ADDR, SSDP_PORT, REDFISH_SEARCH_TARGET
        );
        let mut buf = [0u8; 2048];
        loop {
            let (len, peer) = self.socket.recv_from(&mut buf).await?;
            let datagram = String::from_utf8_lossy(&buf[..len]);
            let Some(target) = search_target(&datagram) else {
                continue;
            };
            if target != REDFISH_SEARCH_TARGET && target != "ssdp:all" {
                continue;
            }
            debug!(%peer, target, "answering SSDP search");
            if let Err(e) = self.socket.send_to(self.response.as_bytes(), peer).await {
                warn!(%peer, error = %e, "failed to answer SSDP search");
            }
        }
    }
}

/// Extract the `ST` header from an M-SEARCH datagram. Anything else,
/// including NOTIFY chatter on the same group, yields `None`.
fn search_target(datagram: &str) -> Option<&str> {
    let mut lines = datagram.lines();
    if !lines.next()?.starts_with("M-SEARCH") {
        return None;
    }
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("st") {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Render the unicast reply for one search.
fn search_response(uuid: &str, location: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         CACHE-CONTROL: max-age=1800\r\n\
         ST: {REDFISH_SEARCH_TARGET}\r\n\
         USN: uuid:{uuid}::{REDFISH_SEARCH_TARGET}\r\n\
         AL: {location}\r\n\
         EXT:\r\n\
         \r\n"
    )
}
