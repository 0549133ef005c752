//! Incremental message framing over byte streams.
//!
//! TCP delivers a byte stream with no datagram boundaries, so frames
//! are read field by field: one id byte, then exactly the bytes that
//! id's layout declares. Nothing is read past the end of a frame,
//! which keeps consecutive frames on one connection independent.

use crate::types::{ClientInfo, ErrorCode};
use crate::wire::{
    Message, WireError, MSG_BROADCAST, MSG_CLIENT_DISCONNECTED, MSG_CLIENT_LIST_RECEIVED,
    MSG_DISCONNECT_C2S, MSG_ERROR, MSG_NEW_CLIENT_CONNECTED, MSG_PEER_TO_PEER_MESSAGE,
    MSG_PEER_TO_PEER_REQUEST, MSG_REGISTRATION_REQUEST, MSG_REGISTRATION_RESPONSE,
};
use std::net::Ipv4Addr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

async fn read_u8<R: AsyncRead + Unpin>(r: &mut R) -> Result<u8, WireError> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b).await?;
    Ok(b[0])
}

async fn read_u16_be<R: AsyncRead + Unpin>(r: &mut R) -> Result<u16, WireError> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b).await?;
    Ok(u16::from_be_bytes(b))
}

async fn read_u32_be<R: AsyncRead + Unpin>(r: &mut R) -> Result<u32, WireError> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b).await?;
    Ok(u32::from_be_bytes(b))
}

async fn read_vec<R: AsyncRead + Unpin>(r: &mut R, len: usize) -> Result<Vec<u8>, WireError> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn read_name<R: AsyncRead + Unpin>(r: &mut R) -> Result<String, WireError> {
    let len = read_u8(r).await?;
    if len == 0 {
        return Err(WireError::NameLengthZero);
    }
    let bytes = read_vec(r, len as usize).await?;
    String::from_utf8(bytes).map_err(|_| WireError::NameNotUtf8)
}

async fn read_body<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<u8>, WireError> {
    let len = read_u16_be(r).await?;
    read_vec(r, len as usize).await
}

async fn read_client_info<R: AsyncRead + Unpin>(r: &mut R) -> Result<ClientInfo, WireError> {
    let mut octets = [0u8; 4];
    r.read_exact(&mut octets).await?;
    let port = read_u16_be(r).await?;
    let name = read_name(r).await?;
    // read_name enforces 1..=255 bytes of valid UTF-8
    ClientInfo::new(Ipv4Addr::from(octets), port, name).map_err(|_| WireError::NameLengthZero)
}

/// Reads exactly one message frame from the stream.
///
/// # Errors
///
/// Returns [`WireError::UnknownId`] when the id byte is unrecognised
/// (the stream position is then one byte past the bad id), a decode
/// error for malformed fields, or [`WireError::Io`] on stream failure
/// or EOF mid-frame.
pub async fn read_message<R>(r: &mut R) -> Result<Message, WireError>
where
    R: AsyncRead + Unpin,
{
    let id = read_u8(r).await?;
    match id {
        MSG_ERROR => {
            let byte = read_u8(r).await?;
            let code = ErrorCode::from_byte(byte).ok_or(WireError::UnknownErrorCode(byte))?;
            Ok(Message::Error { code })
        }
        MSG_REGISTRATION_REQUEST => Ok(Message::RegistrationRequest {
            client: read_client_info(r).await?,
        }),
        MSG_REGISTRATION_RESPONSE => {
            let count = read_u32_be(r).await?;
            let mut clients = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                clients.push(read_client_info(r).await?);
            }
            Ok(Message::RegistrationResponse { clients })
        }
        MSG_CLIENT_LIST_RECEIVED => Ok(Message::ClientListReceived),
        MSG_NEW_CLIENT_CONNECTED => Ok(Message::NewClientConnected {
            client: read_client_info(r).await?,
        }),
        MSG_CLIENT_DISCONNECTED => Ok(Message::ClientDisconnected {
            name: read_name(r).await?,
        }),
        MSG_BROADCAST => Ok(Message::Broadcast {
            body: read_body(r).await?,
        }),
        MSG_DISCONNECT_C2S => Ok(Message::DisconnectC2S),
        MSG_PEER_TO_PEER_REQUEST => {
            let tcp_port = read_u16_be(r).await?;
            let name = read_name(r).await?;
            Ok(Message::PeerToPeerRequest { tcp_port, name })
        }
        MSG_PEER_TO_PEER_MESSAGE => Ok(Message::PeerToPeerMessage {
            body: read_body(r).await?,
        }),
        other => Err(WireError::UnknownId(other)),
    }
}

/// Writes one message frame to the stream.
///
/// # Errors
///
/// Returns [`WireError::Io`] on write failure.
pub async fn write_message<W>(w: &mut W, msg: &Message) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    w.write_all(&msg.encode()).await?;
    Ok(())
}
