//! Embassy tasks run by the firmware

use embassy_net::Stack;
use embassy_net::tcp::TcpSocket;
use embassy_time::{Duration, Ticker, Timer};
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use esp_hal::gpio::Output;
use log::{info, warn};
use weather_core::app_state::AppState;
use weather_core::config::{HEARTBEAT_PERIOD, HTTP_PORT, HTTP_WORKER_COUNT, POLL_PERIOD};
use weather_core::http::{HttpWorker, Router};
use weather_core::polling::Poller;

use crate::hardware::{Magnetometer, PressureSensor};

const SOCKET_BUFFER_SIZE: usize = 1536;

/// Exposes a `TcpSocket` through the `embedded-io-async` traits the server
/// is written against, using only the socket's own methods.
struct Connection<'s, 'b> {
    socket: &'s mut TcpSocket<'b>,
}

impl ErrorType for Connection<'_, '_> {
    type Error = ErrorKind;
}

impl Read for Connection<'_, '_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.socket
            .read(buf)
            .await
            .map_err(|_| ErrorKind::ConnectionReset)
    }
}

impl Write for Connection<'_, '_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.socket
            .write(buf)
            .await
            .map_err(|_| ErrorKind::ConnectionReset)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.socket
            .flush()
            .await
            .map_err(|_| ErrorKind::ConnectionReset)
    }
}

#[embassy_executor::task]
pub async fn pressure_task(sensor: PressureSensor, app: &'static AppState) {
    let error = Poller::new("bmp180", sensor, app).run(POLL_PERIOD).await;
    panic!("pressure sensor unavailable: {}", error);
}

#[embassy_executor::task]
pub async fn magnetic_task(sensor: Magnetometer, app: &'static AppState) {
    let error = Poller::new("hmc5883l", sensor, app).run(POLL_PERIOD).await;
    panic!("magnetometer unavailable: {}", error);
}

/// Blink the status LED so a hung executor is visible from across the room.
#[embassy_executor::task]
pub async fn heartbeat_task(mut led: Output<'static>) {
    let mut ticker = Ticker::every(HEARTBEAT_PERIOD);
    loop {
        led.toggle();
        ticker.next().await;
    }
}

/// Accept and serve connections on the HTTP port, one at a time.
///
/// Several of these run side by side so a worker parked in a websocket
/// session does not stop page loads.
#[embassy_executor::task(pool_size = HTTP_WORKER_COUNT)]
pub async fn http_worker(
    stack: Stack<'static>,
    app: &'static AppState,
    router: &'static Router<'static>,
    id: u8,
) {
    let mut rx_buf = [0u8; SOCKET_BUFFER_SIZE];
    let mut tx_buf = [0u8; SOCKET_BUFFER_SIZE];
    let mut worker = HttpWorker::new(id, app, router);

    info!("http worker {} starting on port {}", worker.id(), HTTP_PORT);
    loop {
        stack.wait_config_up().await;

        // No socket timeout: websocket sessions sit idle between pushes and
        // HTTP reads carry their own idle timeout.
        let mut socket = TcpSocket::new(stack, &mut rx_buf, &mut tx_buf);
        match socket.accept(HTTP_PORT).await {
            Ok(()) => {
                // Failures are logged by the worker
                let _ = worker
                    .serve(&mut Connection {
                        socket: &mut socket,
                    })
                    .await;
                socket.close();
                let _ = socket.flush().await;
            }
            Err(e) => {
                warn!("http worker {} accept failed: {:?}", id, e);
                Timer::after(Duration::from_millis(200)).await;
            }
        }
        socket.abort();
    }
}
