//! Active peer chat channels.

use crate::events::Events;
use dashmap::DashMap;
use rdv_common::codec;
use rdv_common::wire::Message;
use rdv_common::{ErrorCode, WireError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

/// Which side of the rendezvous produced a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    /// We initiated: the stream came from our chat listener's accept.
    Initiator,
    /// The peer initiated: the stream is our dial-back to them.
    Responder,
}

/// Handle held in the channel set, used to queue frames for a peer
/// connection's writer task.
#[derive(Debug)]
struct PeerHandle {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    /// Distinguishes successive channels under one name, so a reader
    /// only ever evicts the entry it owns.
    epoch: u64,
    /// Whether this stream wins the mutual-rendezvous tie-break.
    preferred: bool,
}

/// The set of established peer channels, at most one per peer name.
///
/// A channel is inserted by whichever task completed its rendezvous
/// and removed by the reader task that owns it. When both sides
/// initiate at once, each side ends up with two candidate streams for
/// the same name; the tie-break keeps the channel from the rendezvous
/// initiated by the lexicographically smaller nickname, so both sides
/// deterministically converge on the same stream.
#[derive(Debug, Default)]
pub struct PeerSet {
    channels: DashMap<String, PeerHandle>,
    next_epoch: AtomicU64,
}

impl PeerSet {
    /// Creates an empty channel set.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Whether a channel to `name` is currently open.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Names with an open channel, sorted for stable display.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Queues a chat message on the open channel to `name`.
    ///
    /// Returns `false` when no channel is open (including the window
    /// where the writer has died but the reader has not yet evicted
    /// the entry).
    #[must_use]
    pub fn send(&self, name: &str, msg: &Message) -> bool {
        match self.channels.get(name) {
            Some(handle) => handle.tx.send(msg.encode()).is_ok(),
            None => false,
        }
    }

    /// The stream initiated by the smaller nickname wins a tie.
    fn is_preferred(local_name: &str, peer: &str, role: ChatRole) -> bool {
        let initiated_locally = role == ChatRole::Initiator;
        initiated_locally == (local_name < peer)
    }

    /// Adopts an established stream as the channel to `peer`, spawning
    /// its writer and reader tasks.
    ///
    /// Returns `false` (dropping the stream) when a channel to `peer`
    /// already exists and the newcomer does not win the tie-break; a
    /// preferred stream replaces a non-preferred one, whose writer is
    /// shut down by dropping its handle.
    pub fn adopt(
        self: &Arc<Self>,
        local_name: &str,
        peer: String,
        stream: TcpStream,
        role: ChatRole,
        events: Events,
    ) -> bool {
        use dashmap::mapref::entry::Entry;

        let preferred = Self::is_preferred(local_name, &peer, role);
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = PeerHandle {
            tx: tx.clone(),
            epoch,
            preferred,
        };

        match self.channels.entry(peer.clone()) {
            Entry::Occupied(mut entry) => {
                if preferred && !entry.get().preferred {
                    debug!(%peer, "replacing peer channel after mutual rendezvous");
                    entry.insert(handle);
                } else {
                    debug!(%peer, "duplicate peer channel refused");
                    return false;
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(handle);
            }
        }

        let (rd, wr) = stream.into_split();
        tokio::spawn(run_writer(rx, wr));
        tokio::spawn(run_reader(
            Arc::clone(self),
            peer,
            epoch,
            BufReader::new(rd),
            tx,
            events,
        ));
        true
    }
}

async fn run_writer(mut rx: mpsc::UnboundedReceiver<Vec<u8>>, mut wr: OwnedWriteHalf) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = wr.write_all(&frame).await {
            debug!("peer write failed, stopping writer: {e}");
            return;
        }
    }
    let _ = wr.shutdown().await;
}

/// Reads frames from a peer channel until it closes, then evicts the
/// entry it owns (and only that one: a replacement under the same
/// name has a different epoch).
async fn run_reader(
    peers: Arc<PeerSet>,
    name: String,
    epoch: u64,
    mut reader: BufReader<OwnedReadHalf>,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    events: Events,
) {
    events.emit(format!("handling peer messages with {name}"));
    loop {
        match codec::read_message(&mut reader).await {
            Ok(Message::PeerToPeerMessage { body }) => {
                events.emit(format!("{name}: {}", String::from_utf8_lossy(&body)));
            }
            Ok(Message::Error { code }) => {
                events.emit(format!("error from {name}: {code}"));
            }
            Ok(other) => {
                debug!(%name, id = other.id(), "unexpected frame on peer channel");
                let _ = tx.send(
                    Message::Error {
                        code: ErrorCode::InvalidMessageId,
                    }
                    .encode(),
                );
            }
            Err(WireError::Io(e)) => {
                debug!(%name, "peer channel closed: {e}");
                events.emit(format!("connection to {name} closed"));
                break;
            }
            Err(e) => {
                debug!(%name, "decode error on peer channel: {e}");
                let _ = tx.send(
                    Message::Error {
                        code: e.error_code(),
                    }
                    .encode(),
                );
            }
        }
    }
    peers.channels.remove_if(&name, |_, handle| handle.epoch == epoch);
}
