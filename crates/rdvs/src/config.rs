use clap::Parser;
use std::net::SocketAddr;

/// CLI arguments for the directory server.
#[derive(Parser, Debug, Clone)]
#[command(name = "rdvs")]
#[command(about = "Rendezvous directory server")]
#[command(version)]
pub struct Args {
    /// Socket address to listen on.
    #[arg(long, default_value = "0.0.0.0:7777", env = "RDVS_LISTEN")]
    pub listen: SocketAddr,
    /// Maximum concurrent registered clients.
    #[arg(long, default_value = "1024", env = "RDVS_MAX_CONNS")]
    pub max_conns: usize,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub listen: SocketAddr,
    /// Maximum concurrent registered clients.
    pub max_conns: usize,
}

impl ServerConfig {
    /// Validates the configuration values are within acceptable bounds.
    ///
    /// # Errors
    ///
    /// Returns a description of the first offending value.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_conns == 0 {
            return Err("max_conns must be greater than 0".to_string());
        }
        if self.max_conns > 100_000 {
            return Err("max_conns exceeds reasonable limit (100,000)".to_string());
        }
        Ok(())
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            max_conns: args.max_conns,
        }
    }
}
