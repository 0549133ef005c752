//! Common types and wire codec shared across the chat fabric.
//!
//! This crate provides:
//! - Binary message encoding and decoding ([`wire`])
//! - Incremental stream framing over TCP ([`codec`])
//! - Protocol type definitions and constants ([`types`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod types;
pub mod wire;

pub use types::{ClientInfo, ErrorCode};
pub use wire::{Message, WireError};
