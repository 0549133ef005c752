//! Binary wire messages for the chat fabric.
//!
//! Every frame begins with a one-byte message id; the remaining bytes
//! depend on the id. Multi-byte integers are big-endian. Names are
//! prefixed by a single length byte, chat bodies by a 16-bit length.
//! No null terminators anywhere.

use crate::types::{ClientInfo, ErrorCode, MAX_BODY_LEN, MAX_NAME_LEN};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Error frame id: carries a wire [`ErrorCode`].
pub const MSG_ERROR: u8 = 0;
/// RegistrationRequest id: client → server over TCP.
pub const MSG_REGISTRATION_REQUEST: u8 = 1;
/// RegistrationResponse id: server → client over TCP.
pub const MSG_REGISTRATION_RESPONSE: u8 = 2;
/// ClientListReceived id: reserved acknowledgement, empty body.
pub const MSG_CLIENT_LIST_RECEIVED: u8 = 3;
/// NewClientConnected id: server → client membership event.
pub const MSG_NEW_CLIENT_CONNECTED: u8 = 4;
/// ClientDisconnected id: server → client membership event.
pub const MSG_CLIENT_DISCONNECTED: u8 = 5;
/// Broadcast id: both directions over TCP.
pub const MSG_BROADCAST: u8 = 6;
/// DisconnectC2S id: client → server, empty body.
pub const MSG_DISCONNECT_C2S: u8 = 7;
/// PeerToPeerRequest id: client ↔ client, single UDP datagram.
pub const MSG_PEER_TO_PEER_REQUEST: u8 = 8;
/// PeerToPeerMessage id: client ↔ client over the peer TCP channel.
pub const MSG_PEER_TO_PEER_MESSAGE: u8 = 9;

/// A parsed wire message.
///
/// Variants map 1:1 to the `MSG_*` id constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Error notification carrying a wire error code.
    Error {
        /// The error code.
        code: ErrorCode,
    },
    /// Registration handshake request with the client's presence record.
    RegistrationRequest {
        /// The registering client's record.
        client: ClientInfo,
    },
    /// Registration handshake response with the full membership.
    RegistrationResponse {
        /// Every currently registered client, order unspecified.
        clients: Vec<ClientInfo>,
    },
    /// Reserved acknowledgement of a registration response.
    ClientListReceived,
    /// A new client joined the directory.
    NewClientConnected {
        /// The newcomer's record.
        client: ClientInfo,
    },
    /// A client left the directory.
    ClientDisconnected {
        /// Name of the departed client.
        name: String,
    },
    /// Broadcast chat text, fanned out to every member.
    Broadcast {
        /// Message body, at most 65,535 bytes.
        body: Vec<u8>,
    },
    /// Client-initiated graceful disconnect.
    DisconnectC2S,
    /// Rendezvous request: dial me back on `tcp_port`.
    PeerToPeerRequest {
        /// TCP port the requester is listening on.
        tcp_port: u16,
        /// The requester's nickname.
        name: String,
    },
    /// Chat text on an established peer channel.
    PeerToPeerMessage {
        /// Message body, at most 65,535 bytes.
        body: Vec<u8>,
    },
}

/// Errors produced while decoding wire bytes.
#[derive(Debug, Error)]
pub enum WireError {
    /// The input was empty.
    #[error("frame is empty")]
    Empty,
    /// The frame declared more bytes than were present.
    #[error("frame truncated: need {expected} bytes, have {actual}")]
    Truncated {
        /// Bytes the frame layout requires.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },
    /// The first byte does not match any known message id.
    #[error("unknown message id {0}")]
    UnknownId(u8),
    /// An error frame carried a code we do not define.
    #[error("unknown error code {0}")]
    UnknownErrorCode(u8),
    /// A name length prefix was zero.
    #[error("name length is zero")]
    NameLengthZero,
    /// Name bytes were not valid UTF-8.
    #[error("name is not valid UTF-8")]
    NameNotUtf8,
    /// A chat body does not fit the 16-bit length prefix.
    #[error("body exceeds {MAX_BODY_LEN} bytes: got {0}")]
    BodyTooLong(usize),
    /// Underlying stream I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// The wire error code to report back to the sender for this
    /// decode failure.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NameLengthZero => ErrorCode::NameLengthZero,
            Self::NameNotUtf8 => ErrorCode::NameNotUtf8,
            _ => ErrorCode::InvalidMessageId,
        }
    }
}

fn need(data: &[u8], expected: usize) -> Result<(), WireError> {
    if data.len() < expected {
        return Err(WireError::Truncated {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn decode_name(data: &[u8]) -> Result<(String, usize), WireError> {
    need(data, 1)?;
    let len = data[0] as usize;
    if len == 0 {
        return Err(WireError::NameLengthZero);
    }
    need(data, 1 + len)?;
    let name = std::str::from_utf8(&data[1..1 + len]).map_err(|_| WireError::NameNotUtf8)?;
    Ok((name.to_owned(), 1 + len))
}

fn decode_body(data: &[u8]) -> Result<(Vec<u8>, usize), WireError> {
    need(data, 2)?;
    let len = u16::from_be_bytes([data[0], data[1]]) as usize;
    need(data, 2 + len)?;
    Ok((data[2..2 + len].to_vec(), 2 + len))
}

impl ClientInfo {
    /// Appends this record's wire encoding to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.ip().octets());
        buf.extend_from_slice(&self.port().to_be_bytes());
        buf.push(self.name().len() as u8);
        buf.extend_from_slice(self.name().as_bytes());
    }

    /// Decodes one record from the front of `data`, returning it and
    /// the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`WireError`] on truncation, a zero name length, or a
    /// name that is not valid UTF-8.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), WireError> {
        need(data, 7)?;
        let ip = Ipv4Addr::new(data[0], data[1], data[2], data[3]);
        let port = u16::from_be_bytes([data[4], data[5]]);
        let (name, name_len) = decode_name(&data[6..])?;
        // decode_name enforces 1..=255, so construction cannot fail
        let info = Self::new(ip, port, name).map_err(|_| WireError::NameLengthZero)?;
        Ok((info, 6 + name_len))
    }
}

impl Message {
    /// Creates a broadcast, refusing bodies the length prefix cannot
    /// encode.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::BodyTooLong`] for bodies over 65,535 bytes.
    pub fn broadcast(body: impl Into<Vec<u8>>) -> Result<Self, WireError> {
        let body = body.into();
        if body.len() > MAX_BODY_LEN {
            return Err(WireError::BodyTooLong(body.len()));
        }
        Ok(Self::Broadcast { body })
    }

    /// Creates a peer chat message, refusing bodies the length prefix
    /// cannot encode.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::BodyTooLong`] for bodies over 65,535 bytes.
    pub fn peer_message(body: impl Into<Vec<u8>>) -> Result<Self, WireError> {
        let body = body.into();
        if body.len() > MAX_BODY_LEN {
            return Err(WireError::BodyTooLong(body.len()));
        }
        Ok(Self::PeerToPeerMessage { body })
    }

    /// Returns the wire id byte for this message.
    #[must_use]
    pub const fn id(&self) -> u8 {
        match self {
            Self::Error { .. } => MSG_ERROR,
            Self::RegistrationRequest { .. } => MSG_REGISTRATION_REQUEST,
            Self::RegistrationResponse { .. } => MSG_REGISTRATION_RESPONSE,
            Self::ClientListReceived => MSG_CLIENT_LIST_RECEIVED,
            Self::NewClientConnected { .. } => MSG_NEW_CLIENT_CONNECTED,
            Self::ClientDisconnected { .. } => MSG_CLIENT_DISCONNECTED,
            Self::Broadcast { .. } => MSG_BROADCAST,
            Self::DisconnectC2S => MSG_DISCONNECT_C2S,
            Self::PeerToPeerRequest { .. } => MSG_PEER_TO_PEER_REQUEST,
            Self::PeerToPeerMessage { .. } => MSG_PEER_TO_PEER_MESSAGE,
        }
    }

    /// Serializes this message into one wire frame.
    ///
    /// Length constraints (names 1..=255 bytes, bodies ≤ 65,535 bytes)
    /// are enforced at construction: [`ClientInfo::new`],
    /// [`Message::broadcast`], [`Message::peer_message`]. Frames
    /// decoded off the wire satisfy them by decode bounds.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Error { code } => vec![MSG_ERROR, code.as_byte()],
            Self::RegistrationRequest { client } => {
                let mut v = Vec::with_capacity(1 + client.encoded_len());
                v.push(MSG_REGISTRATION_REQUEST);
                client.encode_into(&mut v);
                v
            }
            Self::RegistrationResponse { clients } => {
                let body: usize = clients.iter().map(ClientInfo::encoded_len).sum();
                let mut v = Vec::with_capacity(5 + body);
                v.push(MSG_REGISTRATION_RESPONSE);
                v.extend_from_slice(&(clients.len() as u32).to_be_bytes());
                for client in clients {
                    client.encode_into(&mut v);
                }
                v
            }
            Self::ClientListReceived => vec![MSG_CLIENT_LIST_RECEIVED],
            Self::NewClientConnected { client } => {
                let mut v = Vec::with_capacity(1 + client.encoded_len());
                v.push(MSG_NEW_CLIENT_CONNECTED);
                client.encode_into(&mut v);
                v
            }
            Self::ClientDisconnected { name } => {
                debug_assert!((1..=MAX_NAME_LEN).contains(&name.len()));
                let mut v = Vec::with_capacity(2 + name.len());
                v.push(MSG_CLIENT_DISCONNECTED);
                v.push(name.len() as u8);
                v.extend_from_slice(name.as_bytes());
                v
            }
            Self::Broadcast { body } => {
                debug_assert!(body.len() <= MAX_BODY_LEN);
                let mut v = Vec::with_capacity(3 + body.len());
                v.push(MSG_BROADCAST);
                v.extend_from_slice(&(body.len() as u16).to_be_bytes());
                v.extend_from_slice(body);
                v
            }
            Self::DisconnectC2S => vec![MSG_DISCONNECT_C2S],
            Self::PeerToPeerRequest { tcp_port, name } => {
                debug_assert!((1..=MAX_NAME_LEN).contains(&name.len()));
                let mut v = Vec::with_capacity(4 + name.len());
                v.push(MSG_PEER_TO_PEER_REQUEST);
                v.extend_from_slice(&tcp_port.to_be_bytes());
                v.push(name.len() as u8);
                v.extend_from_slice(name.as_bytes());
                v
            }
            Self::PeerToPeerMessage { body } => {
                debug_assert!(body.len() <= MAX_BODY_LEN);
                let mut v = Vec::with_capacity(3 + body.len());
                v.push(MSG_PEER_TO_PEER_MESSAGE);
                v.extend_from_slice(&(body.len() as u16).to_be_bytes());
                v.extend_from_slice(body);
                v
            }
        }
    }

    /// Decodes one message from the front of `data`, returning it and
    /// the number of bytes consumed.
    ///
    /// Exactly one frame is read; trailing bytes are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`WireError`] if the id is unknown, a length prefix
    /// exceeds the remaining input, or a name is not valid UTF-8.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), WireError> {
        let Some(&id) = data.first() else {
            return Err(WireError::Empty);
        };
        let rest = &data[1..];
        match id {
            MSG_ERROR => {
                need(rest, 1)?;
                let code =
                    ErrorCode::from_byte(rest[0]).ok_or(WireError::UnknownErrorCode(rest[0]))?;
                Ok((Self::Error { code }, 2))
            }
            MSG_REGISTRATION_REQUEST => {
                let (client, n) = ClientInfo::decode(rest)?;
                Ok((Self::RegistrationRequest { client }, 1 + n))
            }
            MSG_REGISTRATION_RESPONSE => {
                need(rest, 4)?;
                let count = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
                let mut clients = Vec::with_capacity(count.min(1024) as usize);
                let mut off = 4;
                for _ in 0..count {
                    let (client, n) = ClientInfo::decode(&rest[off..])?;
                    clients.push(client);
                    off += n;
                }
                Ok((Self::RegistrationResponse { clients }, 1 + off))
            }
            MSG_CLIENT_LIST_RECEIVED => Ok((Self::ClientListReceived, 1)),
            MSG_NEW_CLIENT_CONNECTED => {
                let (client, n) = ClientInfo::decode(rest)?;
                Ok((Self::NewClientConnected { client }, 1 + n))
            }
            MSG_CLIENT_DISCONNECTED => {
                let (name, n) = decode_name(rest)?;
                Ok((Self::ClientDisconnected { name }, 1 + n))
            }
            MSG_BROADCAST => {
                let (body, n) = decode_body(rest)?;
                Ok((Self::Broadcast { body }, 1 + n))
            }
            MSG_DISCONNECT_C2S => Ok((Self::DisconnectC2S, 1)),
            MSG_PEER_TO_PEER_REQUEST => {
                need(rest, 2)?;
                let tcp_port = u16::from_be_bytes([rest[0], rest[1]]);
                let (name, n) = decode_name(&rest[2..])?;
                Ok((Self::PeerToPeerRequest { tcp_port, name }, 3 + n))
            }
            MSG_PEER_TO_PEER_MESSAGE => {
                let (body, n) = decode_body(rest)?;
                Ok((Self::PeerToPeerMessage { body }, 1 + n))
            }
            other => Err(WireError::UnknownId(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn alice() -> ClientInfo {
        ClientInfo::new(Ipv4Addr::new(127, 0, 0, 1), 7778, "alice").unwrap()
    }

    #[test]
    fn registration_request_exact_bytes() {
        let msg = Message::RegistrationRequest { client: alice() };
        let bytes = msg.encode();
        assert_eq!(
            bytes,
            [
                MSG_REGISTRATION_REQUEST,
                127, 0, 0, 1, // ip
                0x1E, 0x62, // port 7778 big-endian
                5, // name_len
                b'a', b'l', b'i', b'c', b'e',
            ]
        );
    }

    #[test]
    fn registration_response_exact_bytes() {
        let msg = Message::RegistrationResponse {
            clients: vec![alice()],
        };
        let bytes = msg.encode();
        assert_eq!(bytes[0], MSG_REGISTRATION_RESPONSE);
        assert_eq!(&bytes[1..5], &[0, 0, 0, 1]); // count, big-endian u32
        assert_eq!(&bytes[5..9], &[127, 0, 0, 1]);
        assert_eq!(bytes.len(), 1 + 4 + alice().encoded_len());
    }

    #[test]
    fn error_frame_exact_bytes() {
        let msg = Message::Error {
            code: ErrorCode::NameNotUnique,
        };
        assert_eq!(msg.encode(), [MSG_ERROR, 2]);
    }

    #[test]
    fn empty_frames() {
        assert_eq!(Message::ClientListReceived.encode(), [3]);
        assert_eq!(Message::DisconnectC2S.encode(), [7]);
    }

    #[test]
    fn peer_request_exact_bytes() {
        let msg = Message::PeerToPeerRequest {
            tcp_port: 0x1234,
            name: "bob".to_owned(),
        };
        assert_eq!(
            msg.encode(),
            [MSG_PEER_TO_PEER_REQUEST, 0x12, 0x34, 3, b'b', b'o', b'b']
        );
    }

    #[test]
    fn broadcast_length_prefix_is_big_endian() {
        let msg = Message::broadcast(vec![0xAA; 0x0102]).unwrap();
        let bytes = msg.encode();
        assert_eq!(bytes[1], 0x01);
        assert_eq!(bytes[2], 0x02);
        assert_eq!(bytes.len(), 3 + 0x0102);
    }

    #[test]
    fn broadcast_empty_and_max_round_trip() {
        for len in [0usize, MAX_BODY_LEN] {
            let msg = Message::broadcast(vec![0x42; len]).unwrap();
            let bytes = msg.encode();
            let (decoded, consumed) = Message::decode(&bytes).unwrap();
            assert_eq!(consumed, bytes.len());
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn broadcast_over_max_refused() {
        let err = Message::broadcast(vec![0; MAX_BODY_LEN + 1]).unwrap_err();
        assert!(matches!(err, WireError::BodyTooLong(_)));
    }

    #[test]
    fn decode_empty_input() {
        assert!(matches!(Message::decode(&[]), Err(WireError::Empty)));
    }

    #[test]
    fn decode_unknown_id() {
        assert!(matches!(
            Message::decode(&[0xFF]),
            Err(WireError::UnknownId(0xFF))
        ));
    }

    #[test]
    fn decode_zero_name_length() {
        // registration request with name_len 0
        let bytes = [MSG_REGISTRATION_REQUEST, 127, 0, 0, 1, 0x1E, 0x62, 0];
        assert!(matches!(
            Message::decode(&bytes),
            Err(WireError::NameLengthZero)
        ));
    }

    #[test]
    fn decode_invalid_utf8_name() {
        let bytes = [MSG_REGISTRATION_REQUEST, 127, 0, 0, 1, 0x1E, 0x62, 2, 0xFF, 0xFE];
        assert!(matches!(
            Message::decode(&bytes),
            Err(WireError::NameNotUtf8)
        ));
    }

    #[test]
    fn decode_truncated_body() {
        // broadcast declaring 5 body bytes but carrying 2
        let bytes = [MSG_BROADCAST, 0, 5, b'h', b'i'];
        assert!(matches!(
            Message::decode(&bytes),
            Err(WireError::Truncated { expected: 7, .. })
        ));
    }

    #[test]
    fn decode_leaves_trailing_bytes() {
        let mut bytes = Message::DisconnectC2S.encode();
        bytes.extend_from_slice(b"trailing");
        let (msg, consumed) = Message::decode(&bytes).unwrap();
        assert_eq!(msg, Message::DisconnectC2S);
        assert_eq!(consumed, 1);
    }

    #[test]
    fn error_code_mapping() {
        assert_eq!(
            WireError::NameLengthZero.error_code(),
            ErrorCode::NameLengthZero
        );
        assert_eq!(WireError::NameNotUtf8.error_code(), ErrorCode::NameNotUtf8);
        assert_eq!(
            WireError::UnknownId(99).error_code(),
            ErrorCode::InvalidMessageId
        );
    }

    #[test]
    fn response_with_multiple_clients_round_trips() {
        let clients = vec![
            alice(),
            ClientInfo::new(Ipv4Addr::new(10, 0, 0, 2), 7779, "bob").unwrap(),
            ClientInfo::new(Ipv4Addr::new(192, 168, 1, 3), 9000, "carol").unwrap(),
        ];
        let msg = Message::RegistrationResponse { clients };
        let bytes = msg.encode();
        let (decoded, consumed) = Message::decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn unicode_name_round_trips() {
        let info = ClientInfo::new(Ipv4Addr::LOCALHOST, 1, "grüße-☕").unwrap();
        let msg = Message::NewClientConnected { client: info };
        let bytes = msg.encode();
        let (decoded, consumed) = Message::decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, msg);
    }
}
