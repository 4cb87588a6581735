use heapless::String;

use super::HttpError;

pub const MAX_PATH_LEN: usize = 64;
pub const MAX_WEBSOCKET_KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Other,
}

impl Method {
    fn parse(token: &str) -> Self {
        match token {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            _ => Self::Other,
        }
    }
}

/// Request line and the headers the server acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    /// Path without the query string
    pub path: String<MAX_PATH_LEN>,
    pub content_length: usize,
    pub keep_alive: bool,
    /// `Connection: Upgrade` together with `Upgrade: websocket`
    pub websocket_upgrade: bool,
    pub websocket_key: Option<String<MAX_WEBSOCKET_KEY_LEN>>,
    /// Bytes up to and including the blank line
    pub head_len: usize,
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

/// Parse a request head from the start of `buf`.
///
/// Returns `Ok(None)` while the blank line ending the head has not arrived.
pub fn parse_head(buf: &[u8]) -> Result<Option<RequestHead>, HttpError> {
    let Some(head_len) = find_head_end(buf) else {
        return Ok(None);
    };
    let text = core::str::from_utf8(&buf[..head_len - 4])
        .map_err(|_| HttpError::BadRequest("head is not UTF-8"))?;

    let mut lines = text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpError::BadRequest("malformed request line"));
    };

    let mut keep_alive = match version {
        "HTTP/1.1" => true,
        "HTTP/1.0" => false,
        _ => return Err(HttpError::BadRequest("unsupported HTTP version")),
    };

    if !target.starts_with('/') {
        return Err(HttpError::BadRequest("request target is not a path"));
    }
    let path = target.split_once('?').map_or(target, |(path, _)| path);
    let path = String::try_from(path).map_err(|_| HttpError::BadRequest("path too long"))?;

    let mut content_length = 0;
    let mut connection_upgrade = false;
    let mut upgrade_websocket = false;
    let mut websocket_key = None;

    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            return Err(HttpError::BadRequest("malformed header"));
        };
        let value = value.trim();

        if name.eq_ignore_ascii_case("content-length") {
            content_length = value
                .parse()
                .map_err(|_| HttpError::BadRequest("invalid content-length"))?;
        } else if name.eq_ignore_ascii_case("connection") {
            if has_token(value, "close") {
                keep_alive = false;
            } else if has_token(value, "keep-alive") {
                keep_alive = true;
            }
            connection_upgrade = has_token(value, "upgrade");
        } else if name.eq_ignore_ascii_case("upgrade") {
            upgrade_websocket = value.eq_ignore_ascii_case("websocket");
        } else if name.eq_ignore_ascii_case("sec-websocket-key") {
            websocket_key = Some(
                String::try_from(value)
                    .map_err(|_| HttpError::BadRequest("websocket key too long"))?,
            );
        }
    }

    Ok(Some(RequestHead {
        method: Method::parse(method),
        path,
        content_length,
        keep_alive,
        websocket_upgrade: connection_upgrade && upgrade_websocket,
        websocket_key,
        head_len,
    }))
}
