//! Transport layer abstraction.
//!
//! Defines the `Transport` trait for the byte-oriented serial link,
//! allowing different implementations (serialport, mock, etc.).

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open port {port}: {message}")]
    OpenFailed { port: String, message: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Port error: {0}")]
    Port(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract serial transport interface.
///
/// This trait enables:
/// - Production implementation over a serial port
/// - Mock implementation for unit testing
///
/// Reads are non-blocking: `read` returns whatever is currently
/// buffered, up to `max_len`. Callers that need to wait for data poll
/// `bytes_available` with `delay` in between.
pub trait Transport {
    /// Write raw bytes to the device.
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read up to `max_len` currently available bytes.
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError>;

    /// Number of bytes buffered and ready to read.
    fn bytes_available(&mut self) -> Result<usize, TransportError>;

    /// Discard all currently buffered input.
    fn flush_input(&mut self) -> Result<(), TransportError>;

    /// Suspend the caller, giving the device time to respond.
    ///
    /// The mock overrides this with a no-op so poll loops run
    /// instantly under test.
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
