//! Rendezvous chat client: directory link, roster, UDP rendezvous and
//! peer chat channels.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Interactive command parsing and dispatch.
pub mod commands;
/// CLI argument parsing and validation.
pub mod config;
/// User-facing event lines.
pub mod events;
/// The directory server link.
pub mod link;
/// Active peer chat channels.
pub mod peers;
/// UDP rendezvous handshake, both sides.
pub mod rendezvous;
/// Local cache of the directory membership.
pub mod roster;
