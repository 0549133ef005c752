use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::directory::{Directory, SessionId};
use crate::error::ServerError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Shared state for the directory server.
#[derive(Debug)]
pub struct ServerState {
    /// Runtime server configuration.
    pub config: ServerConfig,
    /// The membership map.
    pub directory: Directory,
    next_session: AtomicU64,
}

impl ServerState {
    /// Creates fresh server state for the given configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            directory: Directory::new(),
            next_session: AtomicU64::new(1),
        }
    }

    /// Mints an opaque session id for a newly accepted connection.
    pub fn mint_session(&self) -> SessionId {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }
}

/// Runs the accept loop: one spawned handler per connection.
///
/// A handler failure is contained to its own task; the loop keeps
/// accepting. Transient accept errors are logged and skipped.
///
/// # Errors
///
/// Returns an error only if the listener's local address cannot be
/// read.
pub async fn run(listener: TcpListener, state: Arc<ServerState>) -> Result<(), ServerError> {
    let local_addr = listener.local_addr().map_err(ServerError::Io)?;
    info!("directory listening on {local_addr}");

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if state.directory.len().await >= state.config.max_conns {
                    warn!("max connections reached, rejecting {addr}");
                    drop(stream);
                    continue;
                }

                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, addr, state).await {
                        tracing::debug!("connection from {addr} closed: {e}");
                    }
                });
            }
            Err(e) => {
                error!("failed to accept connection: {e}");
            }
        }
    }
}
