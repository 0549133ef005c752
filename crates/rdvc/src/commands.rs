//! The interactive command interpreter.

use crate::events::Events;
use crate::link::LinkHandle;
use crate::peers::PeerSet;
use crate::rendezvous::{self, PortAllocator, RetryPolicy};
use crate::roster::Roster;
use rdv_common::wire::Message;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// The command list shown for `help` and at startup.
pub const HELP: &str = "You can now enter the following commands:
	help: display this help
	clients: print all connected clients
	broadcast <message>: broadcast <message> to all other clients
	chat <nickname> [<message>]: request a peer-to-peer chat with <nickname> or (if already connected) send a message";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the help text.
    Help,
    /// List the known peer names.
    Clients,
    /// Broadcast the given text to every member.
    Broadcast(String),
    /// Chat with a peer: rendezvous when `text` is absent, send on the
    /// open channel when present.
    Chat {
        /// The peer's nickname.
        name: String,
        /// Text to send on an existing channel.
        text: Option<String>,
    },
    /// Anything unrecognised; carries the offending command word.
    Unknown(String),
    /// Blank input.
    Empty,
    /// Recognised command missing its argument; carries the complaint.
    Usage(&'static str),
}

/// Parses one input line into a [`Command`].
#[must_use]
pub fn parse(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let mut words = line.splitn(2, ' ');
    let head = words.next().unwrap_or_default();
    let rest = words.next().map(str::trim).unwrap_or_default();

    match head {
        "help" => Command::Help,
        "clients" => Command::Clients,
        "broadcast" => {
            if rest.is_empty() {
                Command::Usage("You need to enter a message to broadcast!")
            } else {
                Command::Broadcast(rest.to_owned())
            }
        }
        "chat" => {
            if rest.is_empty() {
                return Command::Usage("You need to enter a nickname to chat with!");
            }
            let mut parts = rest.splitn(2, ' ');
            let name = parts.next().unwrap_or_default().to_owned();
            let text = parts.next().map(str::to_owned);
            Command::Chat { name, text }
        }
        other => Command::Unknown(other.to_owned()),
    }
}

/// Everything the interpreter needs to act on a command.
pub struct CommandContext {
    /// The local user's nickname.
    pub local_name: String,
    /// Sending side of the directory link.
    pub link: LinkHandle,
    /// The local membership cache.
    pub roster: Arc<Roster>,
    /// Open peer channels.
    pub peers: Arc<PeerSet>,
    /// Chat listener port allocator.
    pub ports: Arc<PortAllocator>,
    /// Rendezvous retry timing.
    pub policy: RetryPolicy,
    /// User-facing output.
    pub events: Events,
}

/// Acts on one input line.
pub async fn dispatch(ctx: &CommandContext, line: &str) {
    match parse(line) {
        Command::Empty => {}
        Command::Help => ctx.events.emit(HELP.to_owned()),
        Command::Usage(complaint) => ctx.events.emit(complaint.to_owned()),
        Command::Unknown(word) => ctx.events.emit(format!("unknown command '{word}'")),
        Command::Clients => {
            let names = ctx.roster.names().await;
            ctx.events.emit(names.join("\n"));
        }
        Command::Broadcast(text) => match Message::broadcast(text.into_bytes()) {
            Ok(msg) => ctx.link.send(&msg),
            Err(e) => ctx.events.emit(format!("cannot broadcast: {e}")),
        },
        Command::Chat { name, text } => chat(ctx, name, text).await,
    }
}

async fn chat(ctx: &CommandContext, name: String, text: Option<String>) {
    if name == ctx.local_name {
        ctx.events.emit("You cannot chat with yourself!".to_owned());
        return;
    }

    if let Some(text) = text {
        let msg = match Message::peer_message(text.into_bytes()) {
            Ok(msg) => msg,
            Err(e) => {
                ctx.events.emit(format!("cannot send: {e}"));
                return;
            }
        };
        if ctx.peers.send(&name, &msg) {
            ctx.events.emit(format!("sending message to {name}"));
        } else {
            ctx.events.emit(format!("no open chat with {name}"));
        }
        return;
    }

    // No text: start a rendezvous, unless a channel is already open.
    if ctx.peers.contains(&name) {
        ctx.events.emit(format!("already connected to {name}"));
        return;
    }
    let Some(target) = ctx.roster.get(&name).await else {
        ctx.events.emit("The nickname does not exist!".to_owned());
        return;
    };

    let peers = ctx.peers.clone();
    let ports = ctx.ports.clone();
    let local_name = ctx.local_name.clone();
    let policy = ctx.policy;
    let events = ctx.events.clone();
    tokio::spawn(async move {
        rendezvous::initiate(peers, &ports, &local_name, &target, policy, events).await;
    });
}

/// Feeds input lines to the interpreter until EOF.
pub async fn run_input_loop(ctx: CommandContext, input: impl AsyncBufRead + Unpin) {
    ctx.events.emit(HELP.to_owned());
    let mut lines = input.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        dispatch(&ctx, &line).await;
    }
}
