//! Serial port transport backed by the `serialport` crate.

use std::io::Read;
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::info;

use super::traits::{Transport, TransportError};

/// Read timeout for a single blocking read.
///
/// The protocol never relies on this timeout for correctness; reads
/// only ever ask for bytes the port has already buffered.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial port transport.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port at the given baud rate, 8N1, no flow control.
    pub fn open(device: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let port = serialport::new(device, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| TransportError::OpenFailed {
                port: device.to_string(),
                message: e.to_string(),
            })?;

        info!(port = %device, baud = baud_rate, "Opened serial port");

        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.port
            .write_all(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let n = self.bytes_available()?.min(max_len);
        let mut buf = vec![0u8; n];
        if n > 0 {
            self.port
                .read_exact(&mut buf)
                .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        }
        Ok(buf)
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| TransportError::Port(e.to_string()))
    }

    fn flush_input(&mut self) -> Result<(), TransportError> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| TransportError::Port(e.to_string()))
    }
}
