//! Minimal HTTP/1.1 server for the weather page
//!
//! Each worker serves one TCP connection at a time over any
//! `embedded_io_async` socket. Requests are parsed from a fixed buffer,
//! routed through a [`Router`] and answered with `Content-Length` bodies so
//! the connection can stay open for the next request.

mod request;
mod response;
mod router;
mod server;

pub use request::*;
pub use response::*;
pub use router::*;
pub use server::*;

use embedded_io_async::ErrorKind;
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    #[error("malformed request: {0}")]
    BadRequest(&'static str),
    #[error("timed out waiting for the request")]
    Timeout,
    #[error("request head does not fit the receive buffer")]
    HeadersTooLarge,
    #[error("socket error: {0:?}")]
    Io(ErrorKind),
}

impl HttpError {
    /// Status sent back before the connection is dropped, if any.
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::BadRequest(_) => Some(Status::BadRequest),
            Self::Timeout => Some(Status::RequestTimeout),
            Self::HeadersTooLarge => Some(Status::RequestHeaderFieldsTooLarge),
            Self::Io(_) => None,
        }
    }
}

pub(crate) fn io_error<E: embedded_io_async::Error>(e: E) -> HttpError {
    HttpError::Io(e.kind())
}
