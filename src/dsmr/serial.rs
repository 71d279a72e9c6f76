//! # P1 Serial Transport
//!
//! This module connects to the P1 port of a smart meter and buffers what it
//! sends. The acquisition state machine consumes bytes synchronously through
//! [`ByteSource`]; [`P1Reader`] sits between it and an async serial port,
//! pulling whatever the port has into a pending buffer and driving the
//! optional data request line.
//!
//! On DSMR meters the request line is pin 2 of the RJ12 connector. With a
//! USB adapter it is usually wired to DTR.

use crate::constants::P1_DEFAULT_BAUDRATE;
use crate::error::DsmrError;
use bytes::{Buf, BytesMut};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

/// Size of one read from the port.
const READ_CHUNK: usize = 256;

/// Synchronous byte supply for one acquisition tick.
pub trait ByteSource {
    /// Next buffered byte, `None` when nothing is available right now.
    fn read_byte(&mut self) -> Option<u8>;

    /// Throw away everything buffered, returning how many bytes went.
    fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        while self.read_byte().is_some() {
            discarded += 1;
        }
        discarded
    }

    /// Whether this source has a data request line.
    fn has_request_line(&self) -> bool {
        false
    }

    /// Raise or lower the data request line.
    fn set_request(&mut self, _active: bool) {}
}

impl ByteSource for VecDeque<u8> {
    fn read_byte(&mut self) -> Option<u8> {
        self.pop_front()
    }

    fn discard_pending(&mut self) -> usize {
        let n = self.len();
        self.clear();
        n
    }
}

/// An async port a P1 meter can be read from.
#[async_trait::async_trait]
pub trait P1Port: AsyncRead + Unpin + Send {
    async fn set_request_line(&mut self, active: bool) -> Result<(), DsmrError>;
}

#[async_trait::async_trait]
impl P1Port for SerialStream {
    async fn set_request_line(&mut self, active: bool) -> Result<(), DsmrError> {
        self.write_data_terminal_ready(active)
            .map_err(|e| DsmrError::SerialPortError(e.to_string()))
    }
}

/// Configuration for serial connection.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baudrate: u32,
    /// How long [`P1Reader::fill`] waits for data
    pub timeout: Duration,
    /// Drive DTR as the data request line
    pub request_line: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baudrate: P1_DEFAULT_BAUDRATE,
            timeout: Duration::from_millis(50),
            request_line: false,
        }
    }
}

/// Buffers bytes from a P1 port for the acquisition state machine.
pub struct P1Reader<P: P1Port> {
    port: P,
    config: SerialConfig,
    pending: BytesMut,
    wanted_request: bool,
    request_active: bool,
    eof: bool,
}

/// Reader over a real serial port.
pub type P1SerialHandle = P1Reader<SerialStream>;

impl P1Reader<SerialStream> {
    /// Open `port_name` at 115200 8N1.
    pub async fn connect(port_name: &str) -> Result<Self, DsmrError> {
        Self::connect_with_config(port_name, SerialConfig::default()).await
    }

    /// Open `port_name` with custom settings.
    pub async fn connect_with_config(port_name: &str, config: SerialConfig) -> Result<Self, DsmrError> {
        let port = tokio_serial::new(port_name, config.baudrate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .timeout(config.timeout)
            .open_native_async()
            .map_err(|e| DsmrError::SerialPortError(e.to_string()))?;

        log::info!("Opened P1 port {port_name} at {} baud", config.baudrate);
        Ok(Self::new(port, config))
    }
}

impl<P: P1Port> P1Reader<P> {
    pub fn new(port: P, config: SerialConfig) -> Self {
        Self {
            port,
            config,
            pending: BytesMut::with_capacity(READ_CHUNK * 4),
            wanted_request: false,
            request_active: false,
            eof: false,
        }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    pub fn get_ref(&self) -> &P {
        &self.port
    }

    pub fn get_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn into_inner(self) -> P {
        self.port
    }

    /// Bytes received but not yet consumed.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn request_active(&self) -> bool {
        self.request_active
    }

    /// The port reported end of stream.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Bring the request line to the level the state machine asked for.
    pub async fn sync_request_line(&mut self) -> Result<(), DsmrError> {
        if !self.config.request_line || self.wanted_request == self.request_active {
            return Ok(());
        }
        self.port.set_request_line(self.wanted_request).await?;
        log::trace!(
            "Data request line {}",
            if self.wanted_request { "raised" } else { "lowered" }
        );
        self.request_active = self.wanted_request;
        Ok(())
    }

    /// Wait up to the configured timeout for more bytes and buffer them.
    /// Returns the number of new bytes, 0 when the port stayed quiet.
    pub async fn fill(&mut self) -> Result<usize, DsmrError> {
        use tokio::time::timeout;

        self.sync_request_line().await?;
        let mut chunk = [0u8; READ_CHUNK];
        match timeout(self.config.timeout, self.port.read(&mut chunk)).await {
            Err(_) => Ok(0),
            Ok(Ok(0)) => {
                self.eof = true;
                Ok(0)
            }
            Ok(Ok(n)) => {
                self.pending.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Ok(Err(e)) => Err(DsmrError::SerialPortError(e.to_string())),
        }
    }
}

impl<P: P1Port> ByteSource for P1Reader<P> {
    fn read_byte(&mut self) -> Option<u8> {
        if self.pending.has_remaining() {
            Some(self.pending.get_u8())
        } else {
            None
        }
    }

    fn discard_pending(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }

    fn has_request_line(&self) -> bool {
        self.config.request_line
    }

    fn set_request(&mut self, active: bool) {
        self.wanted_request = active;
    }
}
