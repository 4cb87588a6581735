use alloc::string::String;
use core::fmt::Write as _;

use embassy_time::with_timeout;
use embedded_io_async::{Read, Write};
use log::{debug, error, info, warn};

use super::{
    Handler, HttpError, RequestHead, Resolved, Router, Status, content_type, io_error, parse_head,
    write_response, write_status, write_switching_protocols,
};
use crate::app_state::AppState;
use crate::config::HTTP_READ_TIMEOUT;
use crate::presentation::{WEATHER_CSS, WEATHER_JS, render_page};
use crate::push::ClientId;
use crate::session::{Session, parse_lenient_int};
use crate::ws::{WsError, accept_key, drain_stale, run_session};

/// Receive buffer per connection. Holds one request head plus body.
pub const REQUEST_BUFFER_SIZE: usize = 1024;

/// One HTTP worker. Serves a single connection at a time and owns the
/// push queue with the same index.
pub struct HttpWorker<'a> {
    id: u8,
    generation: u32,
    app: &'a AppState,
    router: &'a Router<'a>,
}

impl<'a> HttpWorker<'a> {
    pub fn new(id: u8, app: &'a AppState, router: &'a Router<'a>) -> Self {
        Self {
            id,
            generation: 0,
            app,
            router,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// Serve one accepted connection until it closes.
    pub async fn serve<S: Read + Write>(&mut self, socket: &mut S) -> Result<(), HttpError> {
        self.generation = self.generation.wrapping_add(1);
        let id = ClientId {
            worker: self.id,
            generation: self.generation,
        };
        if let Some(queue) = self.app.push_queue(self.id) {
            drain_stale(queue);
        }
        debug!("worker {}: connection {}", self.id, self.generation);

        let mut connection = Connection {
            id,
            app: self.app,
            router: self.router,
            session: None,
        };
        let result = connection.run(socket).await;
        drop(connection);

        if let Err(e) = result {
            warn!("worker {}: {}", self.id, e);
            if let Some(status) = e.status() {
                let _ = write_status(socket, status, false).await;
            }
        }
        result
    }
}

/// State of one accepted connection. The session lease is released when
/// this is dropped.
struct Connection<'a> {
    id: ClientId,
    app: &'a AppState,
    router: &'a Router<'a>,
    session: Option<Session<'a>>,
}

async fn read_some<S: Read>(socket: &mut S, buf: &mut [u8]) -> Result<usize, HttpError> {
    match with_timeout(HTTP_READ_TIMEOUT, socket.read(buf)).await {
        Ok(Ok(n)) => Ok(n),
        Ok(Err(e)) => Err(io_error(e)),
        Err(_) => Err(HttpError::Timeout),
    }
}

impl<'a> Connection<'a> {
    async fn run<S: Read + Write>(&mut self, socket: &mut S) -> Result<(), HttpError> {
        let mut buf = [0u8; REQUEST_BUFFER_SIZE];
        let mut filled = 0;

        loop {
            let head = loop {
                if let Some(head) = parse_head(&buf[..filled])? {
                    break head;
                }
                if filled == buf.len() {
                    return Err(HttpError::HeadersTooLarge);
                }
                let n = match read_some(socket, &mut buf[filled..]).await {
                    // Idle keep-alive connection
                    Err(HttpError::Timeout) if filled == 0 => return Ok(()),
                    result => result?,
                };
                if n == 0 {
                    return Ok(());
                }
                filled += n;
            };

            // Only the part of the body that fits the buffer is parsed
            let body_end = head
                .head_len
                .saturating_add(head.content_length)
                .min(buf.len());
            while filled < body_end {
                let n = read_some(socket, &mut buf[filled..]).await?;
                if n == 0 {
                    return Ok(());
                }
                filled += n;
            }

            let value = parse_lenient_int(&buf[head.head_len..body_end]);
            let mut unread = head.content_length - (body_end - head.head_len);
            buf.copy_within(body_end..filled, 0);
            filled -= body_end;

            if unread > 0 {
                debug!("{:?}: skipping {} body bytes", self.id, unread);
            }
            while unread > 0 {
                let n = read_some(socket, &mut buf).await?;
                if n == 0 {
                    return Ok(());
                }
                let skipped = n.min(unread);
                buf.copy_within(skipped..n, 0);
                filled = n - skipped;
                unread -= skipped;
            }

            let keep_alive = head.keep_alive;
            let router = self.router;
            match router.resolve(head.method, &head.path) {
                Resolved::NotFound => {
                    warn!("{:?}: no route for {}", self.id, head.path.as_str());
                    write_status(socket, Status::NotFound, keep_alive).await?;
                }
                Resolved::MethodNotAllowed => {
                    warn!(
                        "{:?}: {:?} not allowed on {}",
                        self.id,
                        head.method,
                        head.path.as_str()
                    );
                    write_status(socket, Status::MethodNotAllowed, keep_alive).await?;
                }
                Resolved::Found(route) => {
                    let visits = route.visitors.map(|visitors| {
                        let count = visitors.visit();
                        info!("{} visitor count = {}", route.path, count);
                        count
                    });
                    if route.handler == Handler::PushChannel {
                        return self.upgrade(socket, &head, &mut buf, filled).await;
                    }
                    self.handle(socket, route.handler, value, visits, keep_alive)
                        .await?;
                }
            }

            if !keep_alive {
                return Ok(());
            }
        }
    }

    async fn handle<S: Write>(
        &mut self,
        socket: &mut S,
        handler: Handler,
        value: i32,
        visits: Option<u32>,
        keep_alive: bool,
    ) -> Result<(), HttpError> {
        let initial = match handler {
            #[cfg(feature = "session-ctx-handlers")]
            Handler::Logout => {
                if self.session.take().is_some() {
                    info!("{:?}: session dropped on logout", self.id);
                }
                return write_response(socket, Status::Ok, content_type::TEXT, b"1", keep_alive)
                    .await;
            }
            #[cfg(feature = "session-ctx-handlers")]
            Handler::Login => 1,
            _ => 0,
        };
        if self.session.is_none() {
            match self.app.sessions.acquire(initial) {
                Ok(session) => {
                    debug!("{:?}: session created at {}", self.id, initial);
                    self.session = Some(session);
                }
                Err(e) => {
                    error!("{:?}: {}", self.id, e);
                    return write_status(socket, Status::InternalServerError, keep_alive).await;
                }
            }
        }
        let Some(session) = self.session.as_mut() else {
            return write_status(socket, Status::InternalServerError, keep_alive).await;
        };

        let counter = match handler {
            Handler::Page => {
                let snapshot = self.app.weather.read();
                let mut page = String::new();
                if render_page(&snapshot, visits.unwrap_or_default(), &mut page).is_err() {
                    return write_status(socket, Status::InternalServerError, keep_alive).await;
                }
                return write_response(
                    socket,
                    Status::Ok,
                    content_type::HTML,
                    page.as_bytes(),
                    keep_alive,
                )
                .await;
            }
            Handler::Stylesheet => {
                return write_response(
                    socket,
                    Status::Ok,
                    content_type::CSS,
                    WEATHER_CSS.as_bytes(),
                    keep_alive,
                )
                .await;
            }
            Handler::Script => {
                return write_response(
                    socket,
                    Status::Ok,
                    content_type::JAVASCRIPT,
                    WEATHER_JS.as_bytes(),
                    keep_alive,
                )
                .await;
            }
            Handler::Accumulate => {
                info!("{:?}: POST read {}", self.id, value);
                session.accumulate(value)
            }
            Handler::SetCounter => {
                info!("{:?}: PUT read {}", self.id, value);
                session.set(value)
            }
            #[cfg(feature = "session-ctx-handlers")]
            Handler::Login => session.counter(),
            #[cfg(feature = "session-ctx-handlers")]
            Handler::Logout => {
                return write_status(socket, Status::InternalServerError, keep_alive).await;
            }
            Handler::PushChannel => {
                return write_status(socket, Status::InternalServerError, keep_alive).await;
            }
        };

        let mut body: heapless::String<12> = heapless::String::new();
        if write!(body, "{}", counter).is_err() {
            return write_status(socket, Status::InternalServerError, keep_alive).await;
        }
        write_response(
            socket,
            Status::Ok,
            content_type::TEXT,
            body.as_bytes(),
            keep_alive,
        )
        .await
    }

    async fn upgrade<S: Read + Write>(
        &mut self,
        socket: &mut S,
        head: &RequestHead,
        buf: &mut [u8],
        filled: usize,
    ) -> Result<(), HttpError> {
        let Some(key) = head.websocket_key.as_ref().filter(|_| head.websocket_upgrade) else {
            return Err(HttpError::BadRequest("websocket upgrade required"));
        };
        let Some(queue) = self.app.push_queue(self.id.worker) else {
            error!("{:?}: worker has no push queue", self.id);
            return write_status(socket, Status::InternalServerError, false).await;
        };

        write_switching_protocols(socket, &accept_key(key)).await?;
        self.app.clients.track(self.id);
        // The accumulator is not reachable over a websocket
        self.session = None;

        match run_session(socket, self.id, self.app, queue, buf, filled).await {
            Ok(()) => Ok(()),
            Err(WsError::Io(kind)) => Err(HttpError::Io(kind)),
            Err(e) => {
                warn!("websocket session {:?} ended: {}", self.id, e);
                Ok(())
            }
        }
    }
}
