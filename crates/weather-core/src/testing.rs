//! In-memory fakes for host tests

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{self, ErrorKind as I2cErrorKind, NoAcknowledgeSource, Operation};
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};

pub use embassy_futures::block_on;

/// Register-file I2C device.
///
/// A write sets the register pointer from its first byte and stores any
/// remaining bytes from there on. A read copies out from the pointer. Both
/// auto-increment like the BMP180 and the HMC5883L do.
pub struct FakeI2c {
    pub address: u8,
    pub regs: [u8; 256],
    pub fail: bool,
    pointer: u8,
    triggers: Vec<Trigger>,
}

struct Trigger {
    register: u8,
    value: u8,
    target: u8,
    bytes: Vec<u8>,
}

impl FakeI2c {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            regs: [0; 256],
            fail: false,
            pointer: 0,
            triggers: Vec::new(),
        }
    }

    pub fn load(&mut self, register: u8, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.regs[register.wrapping_add(i as u8) as usize] = *b;
        }
    }

    /// When `[register, value]` is written, load `bytes` at `target`.
    pub fn on_write(&mut self, register: u8, value: u8, target: u8, bytes: &[u8]) {
        self.triggers.push(Trigger {
            register,
            value,
            target,
            bytes: bytes.to_vec(),
        });
    }

    fn handle_write(&mut self, bytes: &[u8]) {
        let Some((&register, data)) = bytes.split_first() else {
            return;
        };
        self.load(register, data);
        self.pointer = register.wrapping_add(data.len() as u8);

        if let [value] = data {
            let pending: Vec<(u8, Vec<u8>)> = self
                .triggers
                .iter()
                .filter(|t| t.register == register && t.value == *value)
                .map(|t| (t.target, t.bytes.clone()))
                .collect();
            for (target, bytes) in pending {
                self.load(target, &bytes);
            }
        }
    }

    fn handle_read(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.regs[self.pointer as usize];
            self.pointer = self.pointer.wrapping_add(1);
        }
    }
}

impl i2c::ErrorType for FakeI2c {
    type Error = I2cErrorKind;
}

impl i2c::I2c for FakeI2c {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.fail {
            return Err(I2cErrorKind::Bus);
        }
        if address != self.address {
            return Err(I2cErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for op in operations {
            match op {
                Operation::Write(bytes) => self.handle_write(bytes),
                Operation::Read(buf) => self.handle_read(buf),
            }
        }
        Ok(())
    }
}

/// Delay that returns immediately.
pub struct NoDelay;

impl DelayNs for NoDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

/// Scripted TCP peer.
///
/// Each queued chunk is handed out by one `read` call. An empty chunk makes
/// that read yield to the executor once before moving on. Once the script
/// runs out, reads return 0 like a closed connection.
#[derive(Default)]
pub struct MockSocket {
    input: VecDeque<Vec<u8>>,
    pub output: Vec<u8>,
    pub fail_writes: bool,
}

impl MockSocket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_input(&mut self, chunk: impl AsRef<[u8]>) {
        self.input.push_back(chunk.as_ref().to_vec());
    }
}

impl ErrorType for MockSocket {
    type Error = ErrorKind;
}

impl Read for MockSocket {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut chunk = loop {
            match self.input.pop_front() {
                None => return Ok(0),
                Some(chunk) if chunk.is_empty() => embassy_futures::yield_now().await,
                Some(chunk) => break chunk,
            }
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.input.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

impl Write for MockSocket {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.fail_writes {
            return Err(ErrorKind::BrokenPipe);
        }
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// One HTTP response pulled apart by [`split_responses`].
#[derive(Debug)]
pub struct ParsedResponse {
    pub status: u16,
    pub head: String,
    pub body: Vec<u8>,
}

impl ParsedResponse {
    pub fn body_str(&self) -> &str {
        core::str::from_utf8(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }
}

/// Split a byte stream holding back-to-back responses. Stops at a 101
/// response, whatever follows it is websocket traffic.
pub fn split_responses(mut bytes: &[u8]) -> (Vec<ParsedResponse>, &[u8]) {
    let mut responses = Vec::new();
    while let Some(end) = bytes.windows(4).position(|w| w == b"\r\n\r\n") {
        let head = String::from(core::str::from_utf8(&bytes[..end]).unwrap());
        let status: u16 = head.split(' ').nth(1).unwrap().parse().unwrap();
        let mut response = ParsedResponse {
            status,
            head,
            body: Vec::new(),
        };
        let length: usize = response
            .header("content-length")
            .map(|v| v.parse().unwrap())
            .unwrap_or(0);
        let body_start = end + 4;
        response.body = bytes[body_start..body_start + length].to_vec();
        bytes = &bytes[body_start + length..];
        responses.push(response);
        if status == 101 {
            break;
        }
    }
    (responses, bytes)
}

/// Build a masked client frame with a short payload.
pub fn client_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];
    let mut frame = Vec::new();
    frame.push(0x80 | opcode);
    if payload.len() < 126 {
        frame.push(0x80 | payload.len() as u8);
    } else {
        frame.push(0x80 | 126);
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    }
    frame.extend_from_slice(&MASK);
    frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ MASK[i % 4]));
    frame
}

/// Pull unmasked server frames out of a byte stream as `(opcode, payload)`.
pub fn server_frames(mut bytes: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut frames = Vec::new();
    while bytes.len() >= 2 {
        assert_eq!(bytes[1] & 0x80, 0, "server frames must not be masked");
        let opcode = bytes[0] & 0x0f;
        let (len, start) = match bytes[1] & 0x7f {
            126 => (u16::from_be_bytes([bytes[2], bytes[3]]) as usize, 4),
            127 => panic!("unexpected 64-bit frame length"),
            n => (n as usize, 2),
        };
        frames.push((opcode, bytes[start..start + len].to_vec()));
        bytes = &bytes[start + len..];
    }
    frames
}
