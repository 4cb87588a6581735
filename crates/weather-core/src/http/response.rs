use core::fmt::Write as _;

use embedded_io_async::Write;
use heapless::String;

use super::{HttpError, io_error};

const MAX_HEAD_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    SwitchingProtocols,
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    RequestTimeout,
    RequestHeaderFieldsTooLarge,
    InternalServerError,
}

impl Status {
    pub const fn code(self) -> u16 {
        match self {
            Self::SwitchingProtocols => 101,
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::RequestTimeout => 408,
            Self::RequestHeaderFieldsTooLarge => 431,
            Self::InternalServerError => 500,
        }
    }

    pub const fn reason(self) -> &'static str {
        match self {
            Self::SwitchingProtocols => "Switching Protocols",
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::RequestTimeout => "Request Timeout",
            Self::RequestHeaderFieldsTooLarge => "Request Header Fields Too Large",
            Self::InternalServerError => "Internal Server Error",
        }
    }
}

pub mod content_type {
    pub const HTML: &str = "text/html; charset=utf-8";
    pub const CSS: &str = "text/css";
    pub const JAVASCRIPT: &str = "text/javascript";
    pub const TEXT: &str = "text/plain";
}

fn response_head(
    status: Status,
    content_type: &str,
    content_length: usize,
    keep_alive: bool,
) -> Result<String<MAX_HEAD_LEN>, core::fmt::Error> {
    let mut head = String::new();
    write!(
        head,
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: {}\r\n\r\n",
        status.code(),
        status.reason(),
        content_type,
        content_length,
        if keep_alive { "keep-alive" } else { "close" },
    )?;
    Ok(head)
}

/// Send a complete response with a `Content-Length` body.
pub async fn write_response<W: Write>(
    socket: &mut W,
    status: Status,
    content_type: &str,
    body: &[u8],
    keep_alive: bool,
) -> Result<(), HttpError> {
    let head = response_head(status, content_type, body.len(), keep_alive)
        .map_err(|_| HttpError::HeadersTooLarge)?;
    socket.write_all(head.as_bytes()).await.map_err(io_error)?;
    socket.write_all(body).await.map_err(io_error)?;
    socket.flush().await.map_err(io_error)
}

/// Send a plain-text response whose body is the status reason.
pub async fn write_status<W: Write>(
    socket: &mut W,
    status: Status,
    keep_alive: bool,
) -> Result<(), HttpError> {
    write_response(
        socket,
        status,
        content_type::TEXT,
        status.reason().as_bytes(),
        keep_alive,
    )
    .await
}

/// Accept a websocket upgrade.
pub async fn write_switching_protocols<W: Write>(
    socket: &mut W,
    accept_key: &str,
) -> Result<(), HttpError> {
    let mut head: String<MAX_HEAD_LEN> = String::new();
    write!(
        head,
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key
    )
    .map_err(|_| HttpError::HeadersTooLarge)?;
    socket.write_all(head.as_bytes()).await.map_err(io_error)?;
    socket.flush().await.map_err(io_error)
}
