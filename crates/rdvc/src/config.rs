use clap::Parser;
use rdv_common::types::{DEFAULT_RENDEZVOUS_PORT, MAX_NAME_LEN};
use std::net::{Ipv4Addr, SocketAddr};

/// CLI arguments for the chat client.
#[derive(Parser, Debug, Clone)]
#[command(name = "rdvc")]
#[command(about = "Rendezvous chat client")]
#[command(version)]
pub struct Cli {
    /// UDP port to listen on for rendezvous requests.
    #[arg(default_value_t = DEFAULT_RENDEZVOUS_PORT)]
    pub port: u16,
    /// Directory server address.
    #[arg(long, default_value = "127.0.0.1:7777", env = "RDVC_SERVER")]
    pub server: SocketAddr,
    /// Nickname to register with (prompted for when omitted).
    #[arg(long, env = "RDVC_NAME")]
    pub name: Option<String>,
    /// IPv4 address to advertise to peers in the directory.
    #[arg(long, default_value = "127.0.0.1", env = "RDVC_ADVERTISE_IP")]
    pub advertise_ip: Ipv4Addr,
    /// First TCP port used for peer chat listeners.
    #[arg(long, default_value = "7900", env = "RDVC_CHAT_BASE_PORT")]
    pub chat_base_port: u16,
}

impl Cli {
    /// Validates the argument values are usable.
    ///
    /// # Errors
    ///
    /// Returns a description of the first offending value.
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("rendezvous port must be greater than 0".to_string());
        }
        if self.chat_base_port == 0 {
            return Err("chat_base_port must be greater than 0".to_string());
        }
        if let Some(ref name) = self.name {
            if name.is_empty() {
                return Err("name must not be empty".to_string());
            }
            if name.len() > MAX_NAME_LEN {
                return Err(format!("name exceeds {MAX_NAME_LEN} bytes"));
            }
        }
        Ok(())
    }
}
