use rdv_common::wire::Message;
use rdv_common::{ClientInfo, ErrorCode};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::debug;

/// Opaque per-connection identity, minted by the accept loop.
///
/// The membership map is keyed by this id rather than anything derived
/// from the transport, so eviction on socket closure needs no lookup by
/// name.
pub type SessionId = u64;

/// One registered member: its presence record, the host its connection
/// arrived from, and the channel feeding its writer task.
#[derive(Debug)]
pub struct Member {
    /// The registered presence record.
    pub info: ClientInfo,
    /// Peer address of the member's directory connection.
    pub remote_host: IpAddr,
    /// Sender for pre-encoded frames destined to this member.
    pub tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl Member {
    fn send(&self, frame: &[u8]) {
        // A failed send means the member's writer task is gone; the
        // member is reaped when its own handler observes read failure.
        if self.tx.send(frame.to_vec()).is_err() {
            debug!(name = %self.info.name(), "dropping frame for departed member");
        }
    }
}

/// The server-side membership map: the single source of truth for who
/// is registered.
///
/// Every mutation and every fan-out that must be atomic with it happen
/// under one lock hold, so no client ever observes a membership
/// response that disagrees with the event stream that follows it.
#[derive(Debug, Default)]
pub struct Directory {
    members: Mutex<HashMap<SessionId, Member>>,
}

impl Directory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the registration critical section for a new connection.
    ///
    /// Under a single lock hold: validates the uniqueness invariants,
    /// inserts the member, queues the `RegistrationResponse` (listing
    /// every member including the newcomer) on the newcomer's own
    /// channel, and queues `NewClientConnected` for every other member.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::IpPortNotUnique`] when `(remote_host,
    /// port)` collides with an existing member, or
    /// [`ErrorCode::NameNotUnique`] when the name does.
    pub async fn register(
        &self,
        session: SessionId,
        remote_host: IpAddr,
        info: ClientInfo,
        tx: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Result<usize, ErrorCode> {
        let mut members = self.members.lock().await;

        for member in members.values() {
            if member.remote_host == remote_host && member.info.port() == info.port() {
                return Err(ErrorCode::IpPortNotUnique);
            }
        }
        for member in members.values() {
            if member.info.name() == info.name() {
                return Err(ErrorCode::NameNotUnique);
            }
        }

        let joined = Message::NewClientConnected {
            client: info.clone(),
        }
        .encode();
        for member in members.values() {
            member.send(&joined);
        }

        let newcomer = Member {
            info,
            remote_host,
            tx,
        };
        members.insert(session, newcomer);

        let clients: Vec<ClientInfo> = members.values().map(|m| m.info.clone()).collect();
        let count = clients.len();
        let response = Message::RegistrationResponse { clients }.encode();
        if let Some(member) = members.get(&session) {
            member.send(&response);
        }

        Ok(count)
    }

    /// Fans a broadcast body out to every member, the sender included.
    ///
    /// The fan-out is linearised by the membership lock: all members
    /// observe broadcasts in the order the lock was acquired.
    pub async fn broadcast(&self, body: &[u8]) {
        let members = self.members.lock().await;
        let frame = Message::Broadcast {
            body: body.to_vec(),
        }
        .encode();
        for member in members.values() {
            member.send(&frame);
        }
    }

    /// Removes a member and notifies everyone else.
    ///
    /// Used for both the explicit `DisconnectC2S` path and implicit
    /// disconnects (EOF or read error). Idempotent: a second call for
    /// the same session is a no-op. Returns the departed name, if the
    /// session was registered.
    pub async fn remove(&self, session: SessionId) -> Option<String> {
        let mut members = self.members.lock().await;
        let departed = members.remove(&session)?;
        let name = departed.info.name().to_owned();
        let frame = Message::ClientDisconnected { name: name.clone() }.encode();
        for member in members.values() {
            member.send(&frame);
        }
        Some(name)
    }

    /// Number of registered members.
    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }

    /// Snapshot of every registered presence record.
    pub async fn members(&self) -> Vec<ClientInfo> {
        self.members
            .lock()
            .await
            .values()
            .map(|m| m.info.clone())
            .collect()
    }
}
