//! Core type definitions and protocol constants for the chat fabric.

use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Default TCP port the directory server listens on.
pub const DEFAULT_SERVER_PORT: u16 = 7777;
/// Default UDP port a client listens on for rendezvous requests.
pub const DEFAULT_RENDEZVOUS_PORT: u16 = 7778;
/// Maximum nickname length in bytes (the wire prefix is a single byte).
pub const MAX_NAME_LEN: usize = 255;
/// Maximum chat body length in bytes (the wire prefix is 16 bits).
pub const MAX_BODY_LEN: usize = 65_535;

/// Wire-visible error codes carried in `Error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// Frame began with an unknown id, or a type-specific check rejected it.
    InvalidMessageId = 0,
    /// Registration collides with an existing (ip, port).
    IpPortNotUnique = 1,
    /// Registration collides with an existing name.
    NameNotUnique = 2,
    /// Registration name length byte was zero.
    NameLengthZero = 3,
    /// Registration name bytes were not valid UTF-8.
    NameNotUtf8 = 4,
    /// Reserved.
    InvalidClientList = 5,
    /// Sentinel meaning no error.
    NoError = 255,
}

impl ErrorCode {
    /// Decodes a wire byte into an error code, if it is one we define.
    #[must_use]
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::InvalidMessageId),
            1 => Some(Self::IpPortNotUnique),
            2 => Some(Self::NameNotUnique),
            3 => Some(Self::NameLengthZero),
            4 => Some(Self::NameNotUtf8),
            5 => Some(Self::InvalidClientList),
            255 => Some(Self::NoError),
            _ => None,
        }
    }

    /// The byte this code is encoded as on the wire.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidMessageId => "invalid message id",
            Self::IpPortNotUnique => "ip/port not unique",
            Self::NameNotUnique => "name not unique",
            Self::NameLengthZero => "name length zero",
            Self::NameNotUtf8 => "name not valid UTF-8",
            Self::InvalidClientList => "invalid client list",
            Self::NoError => "no error",
        };
        f.write_str(s)
    }
}

/// Reasons a nickname is refused at construction time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidName {
    /// The name was empty.
    #[error("name must not be empty")]
    Empty,
    /// The name does not fit the single-byte length prefix.
    #[error("name exceeds {MAX_NAME_LEN} bytes: got {0}")]
    TooLong(usize),
}

/// A client presence record as registered with the directory.
///
/// Construction goes through [`ClientInfo::new`] so that every value in
/// the program satisfies the wire constraints: the name is 1..=255 bytes
/// and (being a `String`) valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    ip: Ipv4Addr,
    port: u16,
    name: String,
}

impl ClientInfo {
    /// Creates a presence record, validating the nickname.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidName`] if the name is empty or longer than 255
    /// bytes.
    pub fn new(ip: Ipv4Addr, port: u16, name: impl Into<String>) -> Result<Self, InvalidName> {
        let name = name.into();
        if name.is_empty() {
            return Err(InvalidName::Empty);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(InvalidName::TooLong(name.len()));
        }
        Ok(Self { ip, port, name })
    }

    /// The client's IPv4 address.
    #[must_use]
    pub const fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    /// The client's UDP rendezvous port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// The client's nickname.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Encoded size on the wire: 4 ip bytes, 2 port bytes, 1 length
    /// byte, then the name.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        4 + 2 + 1 + self.name.len()
    }
}

impl fmt::Display for ClientInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_name_accepted() {
        let info = ClientInfo::new(Ipv4Addr::LOCALHOST, 7778, "alice").unwrap();
        assert_eq!(info.name(), "alice");
        assert_eq!(info.port(), 7778);
        assert_eq!(info.encoded_len(), 4 + 2 + 1 + 5);
    }

    #[test]
    fn empty_name_refused() {
        let err = ClientInfo::new(Ipv4Addr::LOCALHOST, 7778, "").unwrap_err();
        assert_eq!(err, InvalidName::Empty);
    }

    #[test]
    fn max_length_name_accepted() {
        let name = "x".repeat(255);
        assert!(ClientInfo::new(Ipv4Addr::LOCALHOST, 7778, name).is_ok());
    }

    #[test]
    fn oversized_name_refused() {
        let name = "x".repeat(256);
        let err = ClientInfo::new(Ipv4Addr::LOCALHOST, 7778, name).unwrap_err();
        assert_eq!(err, InvalidName::TooLong(256));
    }

    #[test]
    fn error_code_byte_round_trip() {
        for code in [
            ErrorCode::InvalidMessageId,
            ErrorCode::IpPortNotUnique,
            ErrorCode::NameNotUnique,
            ErrorCode::NameLengthZero,
            ErrorCode::NameNotUtf8,
            ErrorCode::InvalidClientList,
            ErrorCode::NoError,
        ] {
            assert_eq!(ErrorCode::from_byte(code.as_byte()), Some(code));
        }
    }

    #[test]
    fn unassigned_error_byte_is_none() {
        assert_eq!(ErrorCode::from_byte(6), None);
        assert_eq!(ErrorCode::from_byte(42), None);
    }
}
