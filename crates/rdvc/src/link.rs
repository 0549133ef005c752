//! The client's link to the directory server.

use crate::events::Events;
use crate::roster::Roster;
use rdv_common::codec;
use rdv_common::wire::Message;
use rdv_common::{ClientInfo, ErrorCode, WireError};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

/// Errors establishing the directory link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The server refused the registration with a wire error code.
    #[error("server refused registration: {0}")]
    Refused(ErrorCode),
    /// The server replied with something other than a response or error.
    #[error("unexpected registration reply (id {0})")]
    UnexpectedReply(u8),
    /// Wire decoding failed.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cloneable sending side of the directory link.
///
/// All outbound frames funnel through one writer task so they land on
/// the wire in queue order.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl LinkHandle {
    /// Queues a message for the server.
    pub fn send(&self, msg: &Message) {
        if self.tx.send(msg.encode()).is_err() {
            debug!("server link writer is gone");
        }
    }
}

/// The registered link: the reading half plus the roster seeded from
/// the registration response.
#[derive(Debug)]
pub struct RegisteredLink {
    reader: BufReader<OwnedReadHalf>,
    /// Membership snapshot returned by the server.
    pub roster_seed: Vec<ClientInfo>,
}

async fn run_writer(mut rx: mpsc::UnboundedReceiver<Vec<u8>>, mut wr: OwnedWriteHalf) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = wr.write_all(&frame).await {
            debug!("server write failed, stopping writer: {e}");
            return;
        }
    }
    let _ = wr.shutdown().await;
}

/// Connects to the directory and performs the registration handshake.
///
/// # Errors
///
/// Returns [`LinkError::Refused`] when the server answers with an
/// `Error` frame (the caller exits with status 1), or a transport or
/// decode error for anything else that goes wrong.
pub async fn connect(
    server: SocketAddr,
    info: ClientInfo,
) -> Result<(LinkHandle, RegisteredLink), LinkError> {
    let stream = TcpStream::connect(server).await?;
    let (rd, wr) = stream.into_split();
    let mut reader = BufReader::new(rd);

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_writer(rx, wr));
    let handle = LinkHandle { tx };

    handle.send(&Message::RegistrationRequest { client: info });

    match codec::read_message(&mut reader).await? {
        Message::RegistrationResponse { clients } => Ok((
            handle,
            RegisteredLink {
                reader,
                roster_seed: clients,
            },
        )),
        Message::Error { code } => Err(LinkError::Refused(code)),
        other => Err(LinkError::UnexpectedReply(other.id())),
    }
}

/// Consumes directory events until the server connection closes,
/// keeping the roster current and surfacing chat to the event sink.
pub async fn run_reader(mut link: RegisteredLink, roster: Arc<Roster>, events: Events) {
    loop {
        match codec::read_message(&mut link.reader).await {
            Ok(Message::Broadcast { body }) => {
                events.emit(format!("Broadcast: {}", String::from_utf8_lossy(&body)));
            }
            Ok(Message::NewClientConnected { client }) => {
                let name = client.name().to_owned();
                roster.insert(client).await;
                events.emit(format!("{name} connected"));
            }
            Ok(Message::ClientDisconnected { name }) => {
                roster.remove(&name).await;
                events.emit(format!("{name} disconnected"));
            }
            Ok(Message::Error { code }) => {
                events.emit(format!("server error: {code}"));
            }
            Ok(other) => {
                debug!(id = other.id(), "unexpected frame from server");
                events.emit("invalid msg id found".to_owned());
            }
            Err(WireError::Io(e)) => {
                debug!("server connection lost: {e}");
                events.emit("connection to server lost".to_owned());
                return;
            }
            Err(e) => {
                debug!("decode error from server: {e}");
                events.emit("invalid msg id found".to_owned());
            }
        }
    }
}
