//! Mock serial port implementation for testing
//!
//! This module provides a mock P1 port that can be used to test telegram
//! acquisition without requiring a meter. Queued bytes are handed out by
//! reads; request line changes are recorded.

use crate::dsmr::serial::{ByteSource, P1Port};
use crate::error::DsmrError;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock P1 port
#[derive(Clone, Default)]
pub struct MockSerialPort {
    /// Data to be read from the port (incoming)
    pub rx_buffer: Arc<Mutex<VecDeque<u8>>>,
    /// Every level written to the request line, in order
    pub request_history: Arc<Mutex<Vec<bool>>>,
    /// Simulated errors
    pub next_error: Arc<Mutex<Option<io::Error>>>,
    /// Whether the port reports a request line when used as a [`ByteSource`]
    pub request_line: bool,
}

impl MockSerialPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock port that owns a request line.
    pub fn with_request_line() -> Self {
        Self {
            request_line: true,
            ..Self::default()
        }
    }

    /// Queue data to be read from the port
    pub fn queue_rx_data(&self, data: &[u8]) {
        lock(&self.rx_buffer).extend(data);
    }

    pub fn rx_len(&self) -> usize {
        lock(&self.rx_buffer).len()
    }

    pub fn request_history(&self) -> Vec<bool> {
        lock(&self.request_history).clone()
    }

    /// Current request line level (low until first raised).
    pub fn request_level(&self) -> bool {
        lock(&self.request_history).last().copied().unwrap_or(false)
    }

    /// Clear all buffers
    pub fn clear(&self) {
        lock(&self.rx_buffer).clear();
        lock(&self.request_history).clear();
    }

    /// Set an error to be returned on the next operation
    pub fn set_next_error(&self, error: io::Error) {
        *lock(&self.next_error) = Some(error);
    }
}

impl AsyncRead for MockSerialPort {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(error) = lock(&self.next_error).take() {
            return Poll::Ready(Err(error));
        }

        let mut rx = lock(&self.rx_buffer);
        let available = rx.len().min(buf.remaining());
        if available > 0 {
            let data: Vec<u8> = rx.drain(..available).collect();
            buf.put_slice(&data);
        }
        Poll::Ready(Ok(()))
    }
}

#[async_trait::async_trait]
impl P1Port for MockSerialPort {
    async fn set_request_line(&mut self, active: bool) -> Result<(), DsmrError> {
        if let Some(error) = lock(&self.next_error).take() {
            return Err(DsmrError::SerialPortError(error.to_string()));
        }
        lock(&self.request_history).push(active);
        Ok(())
    }
}

impl ByteSource for MockSerialPort {
    fn read_byte(&mut self) -> Option<u8> {
        lock(&self.rx_buffer).pop_front()
    }

    fn discard_pending(&mut self) -> usize {
        let mut rx = lock(&self.rx_buffer);
        let n = rx.len();
        rx.clear();
        n
    }

    fn has_request_line(&self) -> bool {
        self.request_line
    }

    fn set_request(&mut self, active: bool) {
        let mut history = lock(&self.request_history);
        if history.last() != Some(&active) {
            history.push(active);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_and_read_bytes() {
        let mut port = MockSerialPort::new();
        port.queue_rx_data(b"/AB");
        assert_eq!(port.read_byte(), Some(b'/'));
        assert_eq!(port.rx_len(), 2);
        assert_eq!(port.discard_pending(), 2);
        assert_eq!(port.read_byte(), None);
    }

    #[test]
    fn test_request_line_records_changes_only() {
        let mut port = MockSerialPort::with_request_line();
        port.set_request(true);
        port.set_request(true);
        port.set_request(false);
        assert_eq!(port.request_history(), vec![true, false]);
        assert!(!port.request_level());
    }
}
