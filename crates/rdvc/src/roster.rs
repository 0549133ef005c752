//! The client's local cache of the directory.

use rdv_common::ClientInfo;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Name-keyed cache of the directory membership, seeded by the
/// registration response and kept current by directory events.
#[derive(Debug, Default)]
pub struct Roster {
    inner: Mutex<HashMap<String, ClientInfo>>,
}

impl Roster {
    /// Creates an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents with the registration response snapshot.
    pub async fn seed(&self, clients: Vec<ClientInfo>) {
        let mut inner = self.inner.lock().await;
        inner.clear();
        for client in clients {
            inner.insert(client.name().to_owned(), client);
        }
    }

    /// Applies a `NewClientConnected` event. Inserting a name that is
    /// already present replaces the record, so applying the same event
    /// twice leaves a single entry.
    pub async fn insert(&self, client: ClientInfo) {
        self.inner
            .lock()
            .await
            .insert(client.name().to_owned(), client);
    }

    /// Applies a `ClientDisconnected` event, removing exactly the
    /// named entry.
    pub async fn remove(&self, name: &str) -> Option<ClientInfo> {
        self.inner.lock().await.remove(name)
    }

    /// Looks up a peer's presence record by name.
    pub async fn get(&self, name: &str) -> Option<ClientInfo> {
        self.inner.lock().await.get(name).cloned()
    }

    /// All known names, sorted for stable display.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().await.keys().cloned().collect();
        names.sort();
        names
    }
}
