//! Websocket push channel (RFC 6455)
//!
//! After the upgrade the HTTP worker hands its socket to [`run_session`].
//! The session echoes data frames back to the browser and, in between,
//! drains the worker's push queue, sending one JSON text frame per job.

use core::ops::Range;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use embassy_futures::select::{Either, select};
use embedded_io_async::{Error as _, ErrorKind, Read, Write};
use heapless::String;
use log::{debug, info, warn};
use sha1::{Digest, Sha1};
use thiserror_no_std::Error;

use crate::app_state::AppState;
use crate::presentation::render_push_message;
use crate::push::{ClientId, PushError, PushQueue, PushWork};

const HANDSHAKE_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Largest client payload accepted
pub const MAX_FRAME_PAYLOAD: usize = 512;
const MAX_CONTROL_PAYLOAD: usize = 125;
const CLOSE_PROTOCOL_ERROR: u16 = 1002;
const CLOSE_TOO_BIG: u16 = 1009;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsError {
    #[error("websocket protocol violation: {0}")]
    Protocol(&'static str),
    #[error("frame payload of {len} bytes is too large")]
    FrameTooLarge { len: u64 },
    #[error("socket error: {0:?}")]
    Io(ErrorKind),
    #[error("push failed: {0}")]
    Push(PushError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits {
            0x0 => Self::Continuation,
            0x1 => Self::Text,
            0x2 => Self::Binary,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            _ => return None,
        })
    }

    const fn bits(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

/// A decoded frame whose payload sits unmasked in the input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Range<usize>,
    /// Total bytes taken by the frame, header included
    pub len: usize,
}

/// `Sec-WebSocket-Accept` value for a client key.
pub fn accept_key(client_key: &str) -> String<28> {
    let mut sha = Sha1::new();
    sha.update(client_key.as_bytes());
    sha.update(HANDSHAKE_GUID);
    let digest = sha.finalize();

    let mut encoded = [0u8; 28];
    let mut key = String::new();
    // 20 digest bytes always encode to exactly 28 characters
    if let Ok(n) = STANDARD.encode_slice(digest, &mut encoded) {
        for &b in &encoded[..n] {
            let _ = key.push(char::from(b));
        }
    }
    key
}

/// Decode one client frame from the front of `buf`, unmasking its payload in
/// place. Returns `Ok(None)` until the whole frame is buffered.
pub fn decode_frame(buf: &mut [u8]) -> Result<Option<Frame>, WsError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let fin = buf[0] & 0x80 != 0;
    if buf[0] & 0x70 != 0 {
        return Err(WsError::Protocol("reserved bits set"));
    }
    let opcode = Opcode::from_bits(buf[0] & 0x0f).ok_or(WsError::Protocol("unknown opcode"))?;
    if buf[1] & 0x80 == 0 {
        return Err(WsError::Protocol("client frame is not masked"));
    }

    let (payload_len, mut offset) = match buf[1] & 0x7f {
        126 => {
            if buf.len() < 4 {
                return Ok(None);
            }
            (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 4)
        }
        127 => {
            if buf.len() < 10 {
                return Ok(None);
            }
            let mut len = [0u8; 8];
            len.copy_from_slice(&buf[2..10]);
            (u64::from_be_bytes(len), 10)
        }
        n => (u64::from(n), 2),
    };

    if opcode.is_control() && (!fin || payload_len > MAX_CONTROL_PAYLOAD as u64) {
        return Err(WsError::Protocol("invalid control frame"));
    }
    if payload_len > MAX_FRAME_PAYLOAD as u64 {
        return Err(WsError::FrameTooLarge { len: payload_len });
    }
    let payload_len = payload_len as usize;

    if buf.len() < offset + 4 + payload_len {
        return Ok(None);
    }
    let mut mask = [0u8; 4];
    mask.copy_from_slice(&buf[offset..offset + 4]);
    offset += 4;

    let payload = offset..offset + payload_len;
    for (i, b) in buf[payload.clone()].iter_mut().enumerate() {
        *b ^= mask[i % 4];
    }

    Ok(Some(Frame {
        fin,
        opcode,
        len: payload.end,
        payload,
    }))
}

/// Send one unmasked server frame.
pub async fn write_frame<W: Write>(
    socket: &mut W,
    fin: bool,
    opcode: Opcode,
    payload: &[u8],
) -> Result<(), WsError> {
    let mut header = [0u8; 4];
    header[0] = (if fin { 0x80 } else { 0 }) | opcode.bits();
    let header_len = if payload.len() < 126 {
        header[1] = payload.len() as u8;
        2
    } else if let Ok(len) = u16::try_from(payload.len()) {
        header[1] = 126;
        header[2..4].copy_from_slice(&len.to_be_bytes());
        4
    } else {
        return Err(WsError::FrameTooLarge {
            len: payload.len() as u64,
        });
    };

    socket
        .write_all(&header[..header_len])
        .await
        .map_err(|e| WsError::Io(e.kind()))?;
    socket
        .write_all(payload)
        .await
        .map_err(|e| WsError::Io(e.kind()))?;
    socket.flush().await.map_err(|e| WsError::Io(e.kind()))
}

async fn send_push<W: Write>(
    socket: &mut W,
    client: ClientId,
    work: PushWork,
    app: &AppState,
) -> Result<(), PushError> {
    if work.client != client {
        return Err(PushError::ClientGone {
            worker: work.client.worker,
            generation: work.client.generation,
        });
    }
    let snapshot = app.weather.read();
    let message = render_push_message(&snapshot).map_err(|_| PushError::SendFailed)?;
    write_frame(socket, true, Opcode::Text, message.as_bytes())
        .await
        .map_err(|_| PushError::SendFailed)
}

/// Discard work queued for connections this worker no longer serves.
pub fn drain_stale(queue: &PushQueue) {
    while let Ok(work) = queue.try_receive() {
        let gone = PushError::ClientGone {
            worker: work.client.worker,
            generation: work.client.generation,
        };
        warn!("dropping push work: {}", gone);
    }
}

/// Serve an upgraded connection until the peer closes it.
///
/// `buf[..filled]` may already hold frames that arrived with the upgrade
/// request.
pub async fn run_session<S: Read + Write>(
    socket: &mut S,
    client: ClientId,
    app: &AppState,
    queue: &PushQueue,
    buf: &mut [u8],
    mut filled: usize,
) -> Result<(), WsError> {
    info!("websocket session {:?} open", client);
    // Set while an echoed message is still waiting for its final fragment
    let mut in_fragment = false;
    loop {
        loop {
            let frame = match decode_frame(&mut buf[..filled]) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    let code = match e {
                        WsError::FrameTooLarge { .. } => CLOSE_TOO_BIG,
                        _ => CLOSE_PROTOCOL_ERROR,
                    };
                    let _ = write_frame(socket, true, Opcode::Close, &code.to_be_bytes()).await;
                    return Err(e);
                }
            };
            let payload = &buf[frame.payload.clone()];

            match frame.opcode {
                Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                    debug!(
                        "websocket {:?}: echoing {:?} frame of {} bytes",
                        client,
                        frame.opcode,
                        payload.len()
                    );
                    write_frame(socket, frame.fin, frame.opcode, payload).await?;
                    in_fragment = !frame.fin;
                }
                Opcode::Ping => write_frame(socket, true, Opcode::Pong, payload).await?,
                Opcode::Pong => {}
                Opcode::Close => {
                    let _ = write_frame(socket, true, Opcode::Close, payload).await;
                    info!("websocket session {:?} closed by peer", client);
                    return Ok(());
                }
            }

            buf.copy_within(frame.len..filled, 0);
            filled -= frame.len;
        }

        // A push frame may not be interleaved with a fragmented echo
        let event = if in_fragment {
            Either::Second(socket.read(&mut buf[filled..]).await)
        } else {
            select(queue.receive(), socket.read(&mut buf[filled..])).await
        };
        match event {
            Either::First(work) => match send_push(socket, client, work, app).await {
                Ok(()) => debug!("push sent to {:?}", client),
                Err(e @ PushError::ClientGone { .. }) => warn!("stale push work: {}", e),
                Err(e) => {
                    warn!("push to {:?} failed: {}", client, e);
                    return Err(WsError::Push(e));
                }
            },
            Either::Second(Ok(0)) => {
                info!("websocket session {:?} ended", client);
                return Ok(());
            }
            Either::Second(Ok(n)) => filled += n,
            Either::Second(Err(e)) => return Err(WsError::Io(e.kind())),
        }
    }
}
