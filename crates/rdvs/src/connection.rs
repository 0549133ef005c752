use crate::directory::SessionId;
use crate::error::ServerError;
use crate::server::ServerState;
use rdv_common::codec;
use rdv_common::wire::Message;
use rdv_common::{ErrorCode, WireError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Writer task: drains pre-encoded frames to the socket.
///
/// All writes to a connection funnel through here, so frames queued by
/// concurrent fan-outs are serialised. A write failure ends the task;
/// the member is reaped when its reader observes the broken socket.
async fn run_writer(mut rx: mpsc::UnboundedReceiver<Vec<u8>>, mut wr: OwnedWriteHalf) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = wr.write_all(&frame).await {
            debug!("write failed, stopping writer: {e}");
            return;
        }
    }
    // Channel closed: every sender (handler and directory entry) is
    // gone. Flush whatever the kernel still buffers and let the write
    // half drop.
    let _ = wr.shutdown().await;
}

/// Drives one directory connection through its lifecycle:
/// awaiting-registration, registered, closing.
///
/// # Errors
///
/// Returns [`ServerError`] when the connection ends abnormally; the
/// accept loop logs it at debug level.
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), ServerError> {
    let session = state.mint_session();
    let (rd, wr) = stream.into_split();
    let mut reader = BufReader::new(rd);

    let (tx, rx) = mpsc::unbounded_channel::<Vec<u8>>();
    tokio::spawn(run_writer(rx, wr));

    // Awaiting registration: the first frame must be a well-formed
    // registration request. Anything else earns an Error frame and the
    // connection closes.
    let client = match codec::read_message(&mut reader).await {
        Ok(Message::RegistrationRequest { client }) => client,
        Ok(other) => {
            debug!(id = other.id(), %peer_addr, "expected registration request");
            let _ = tx.send(
                Message::Error {
                    code: ErrorCode::InvalidMessageId,
                }
                .encode(),
            );
            return Err(ServerError::Rejected(ErrorCode::InvalidMessageId));
        }
        Err(WireError::Io(e)) => return Err(ServerError::Io(e)),
        Err(e) => {
            let code = e.error_code();
            debug!(%peer_addr, "registration decode failed: {e}");
            let _ = tx.send(Message::Error { code }.encode());
            return Err(ServerError::Rejected(code));
        }
    };

    let name = client.name().to_owned();
    match state
        .directory
        .register(session, peer_addr.ip(), client, tx.clone())
        .await
    {
        Ok(count) => {
            info!(%name, %peer_addr, members = count, "client registered");
        }
        Err(code) => {
            debug!(%name, %peer_addr, %code, "registration refused");
            let _ = tx.send(Message::Error { code }.encode());
            return Err(ServerError::Rejected(code));
        }
    }

    let result = registered_loop(&mut reader, &tx, session, &state).await;

    // Implicit or explicit disconnect: evict and notify the others.
    // remove() is idempotent, so the explicit path doubling up here is
    // harmless.
    if let Some(name) = state.directory.remove(session).await {
        info!(%name, "client departed");
    }

    result
}

/// Steady-state frame dispatch for a registered connection.
async fn registered_loop(
    reader: &mut (impl tokio::io::AsyncRead + Unpin),
    tx: &mpsc::UnboundedSender<Vec<u8>>,
    session: SessionId,
    state: &ServerState,
) -> Result<(), ServerError> {
    loop {
        match codec::read_message(reader).await {
            Ok(Message::Broadcast { body }) => {
                state.directory.broadcast(&body).await;
            }
            Ok(Message::DisconnectC2S) => {
                state.directory.remove(session).await;
                return Ok(());
            }
            Ok(Message::Error { code }) => {
                // Recorded, not fatal: the peer stays connected.
                warn!(session, %code, "error frame from client");
            }
            Ok(Message::ClientListReceived) => {
                // Reserved ack from older clients; tolerated.
                debug!(session, "ignoring client-list-received");
            }
            Ok(other) => {
                // The wire has no separate code for a known id in the
                // wrong direction; it gets the unknown-id reply.
                debug!(session, id = other.id(), "unexpected frame from client");
                let _ = tx.send(
                    Message::Error {
                        code: ErrorCode::InvalidMessageId,
                    }
                    .encode(),
                );
            }
            Err(WireError::Io(e)) => {
                // EOF or transport failure: implicit disconnect.
                debug!(session, "connection lost: {e}");
                return Err(ServerError::Io(e));
            }
            Err(e) => {
                debug!(session, "decode error from client: {e}");
                let _ = tx.send(
                    Message::Error {
                        code: e.error_code(),
                    }
                    .encode(),
                );
            }
        }
    }
}
