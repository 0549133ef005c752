//! UDP rendezvous: negotiating a TCP chat channel between two clients.
//!
//! The initiator binds a fresh TCP listener, then asks the target (via
//! a UDP datagram to its registered rendezvous port) to dial back.
//! The responder's dial completes the initiator's accept, so the
//! accepted connection itself is the success signal; no further
//! acknowledgement is needed.

use crate::events::Events;
use crate::peers::{ChatRole, PeerSet};
use rdv_common::wire::Message;
use rdv_common::{ClientInfo, ErrorCode};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Largest rendezvous datagram: id, port, length byte, 255 name bytes.
const MAX_DATAGRAM: usize = 1 + 2 + 1 + 255;

/// Retry timing for the initiator side of the handshake.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// How many times the accept timer may fire before giving up.
    pub attempts: u32,
    /// How long to wait for an accepted connection per attempt.
    pub per_attempt: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            per_attempt: Duration::from_secs(2),
        }
    }
}

/// Hands out locally unique TCP ports for chat listeners.
///
/// A plain incrementing counter seeded by the configured base port;
/// the initiator retries allocation if a port is already taken.
#[derive(Debug)]
pub struct PortAllocator {
    next: AtomicU16,
}

impl PortAllocator {
    /// Creates an allocator starting at `base`.
    #[must_use]
    pub fn new(base: u16) -> Self {
        Self {
            next: AtomicU16::new(base),
        }
    }

    fn next(&self) -> u16 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Binds a listener on the next free allocated port, reporting the
    /// port actually bound.
    async fn bind_listener(&self) -> std::io::Result<(TcpListener, u16)> {
        let mut last_err = None;
        for _ in 0..16 {
            match TcpListener::bind(("0.0.0.0", self.next())).await {
                Ok(listener) => {
                    let port = listener.local_addr()?.port();
                    return Ok((listener, port));
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "port allocation failed")
        }))
    }
}

/// Initiator side: requests a chat channel to `target` and waits for
/// the dial-back.
///
/// Binds the listener before the first datagram goes out, so the
/// responder can never dial into nothing. Emits progress and the final
/// outcome to the event sink.
pub async fn initiate(
    peers: Arc<PeerSet>,
    ports: &PortAllocator,
    local_name: &str,
    target: &ClientInfo,
    policy: RetryPolicy,
    events: Events,
) {
    events.emit(format!("connecting to {}", target.name()));

    let udp = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
        Ok(socket) => socket,
        Err(e) => {
            events.emit(format!("could not open rendezvous socket: {e}"));
            return;
        }
    };
    if let Err(e) = udp.connect((target.ip(), target.port())).await {
        events.emit(format!("could not resolve client address: {e}"));
        return;
    }

    let (listener, tcp_port) = match ports.bind_listener().await {
        Ok(bound) => bound,
        Err(e) => {
            events.emit(format!("could not open chat listener: {e}"));
            return;
        }
    };

    let request = Message::PeerToPeerRequest {
        tcp_port,
        name: local_name.to_owned(),
    }
    .encode();

    if let Err(e) = udp.send(&request).await {
        events.emit(format!("failed to request peer to peer chat: {e}"));
        return;
    }

    for _ in 0..policy.attempts {
        match timeout(policy.per_attempt, listener.accept()).await {
            Ok(Ok((stream, addr))) => {
                debug!(peer = %target.name(), %addr, "rendezvous accepted");
                if peers.adopt(
                    local_name,
                    target.name().to_owned(),
                    stream,
                    ChatRole::Initiator,
                    events.clone(),
                ) {
                    events.emit(format!("connected to {}", target.name()));
                }
                return;
            }
            Ok(Err(e)) => {
                events.emit(format!("error accepting peer to peer connection: {e}"));
                return;
            }
            Err(_) => {
                events.emit("retrying peer connection".to_owned());
                if let Err(e) = udp.send(&request).await {
                    events.emit(format!("failed to request peer to peer chat: {e}"));
                }
            }
        }
    }
    events.emit(format!("could not connect to {}", target.name()));
}

/// Responder side: answers rendezvous requests on the client's
/// registered UDP port until the socket fails.
///
/// A malformed datagram earns an `Error` reply to its source; a failed
/// dial-back is logged; neither stops the listener.
pub async fn run_listener(
    udp: UdpSocket,
    local_name: String,
    peers: Arc<PeerSet>,
    events: Events,
) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let (n, src) = match udp.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!("rendezvous socket failed: {e}");
                events.emit("rendezvous listener stopped".to_owned());
                return;
            }
        };

        let (tcp_port, name) = match Message::decode(&buf[..n]) {
            Ok((Message::PeerToPeerRequest { tcp_port, name }, _)) => (tcp_port, name),
            Ok(other) => {
                // The wire has no separate code for a known id in the
                // wrong direction; it gets the unknown-id reply.
                debug!(%src, id = other.0.id(), "unexpected rendezvous datagram");
                send_error(&udp, src).await;
                continue;
            }
            Err(e) => {
                debug!(%src, "rendezvous decode failed: {e}");
                send_error(&udp, src).await;
                continue;
            }
        };

        match TcpStream::connect((src.ip(), tcp_port)).await {
            Ok(stream) => {
                debug!(%name, %src, tcp_port, "dialled back rendezvous requester");
                let _ = peers.adopt(&local_name, name, stream, ChatRole::Responder, events.clone());
            }
            Err(e) => {
                events.emit(format!("error connecting to peer: {e}"));
            }
        }
    }
}

async fn send_error(udp: &UdpSocket, src: std::net::SocketAddr) {
    let reply = Message::Error {
        code: ErrorCode::InvalidMessageId,
    }
    .encode();
    if let Err(e) = udp.send_to(&reply, src).await {
        debug!(%src, "failed to send rendezvous error reply: {e}");
    }
}
