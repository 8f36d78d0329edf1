//! Generic request/response channel over a serial transport.
//!
//! Both protocol stages share one frame shape,
//! `[opcode, flag, len_lo, len_hi] ++ params`, and one status
//! convention (`OK` / `FL`). They differ in the flag byte and in how
//! long to wait for a response; those differences are injected as a
//! [`Framing`] value so the two stages are data, not duplicated code.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace};

use crate::protocol::commands::CommandSpec;
use crate::transport::{Transport, TransportError};

/// Poll granularity and the fixed post-command delay.
pub const RESPONSE_DELAY: Duration = Duration::from_millis(100);

/// Default poll budget: a single fixed delay, no extra iterations.
pub const DEFAULT_POLL_BUDGET: u32 = 1;

/// Default cap on the response payload read.
pub const DEFAULT_EXPECT: usize = 8096;

/// Number of sentinel bytes in the sync preamble.
const SYNC_PREAMBLE_LEN: usize = 70;
const SYNC_SENTINEL: u8 = b'U';

const STATUS_OK: [u8; 2] = *b"OK";
const STATUS_FAIL: [u8; 2] = *b"FL";

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Unknown command {0:?}")]
    UnknownCommand(String),

    #[error("Wrong parameter length for {command}: expected {expected}, got {actual}")]
    ParameterLength {
        command: &'static str,
        expected: u16,
        actual: usize,
    },

    #[error("Device reported failure: {0:02x?}")]
    Device(Vec<u8>),

    #[error("Unhandled response status {0:02x?}")]
    Protocol([u8; 2]),

    #[error("No response to {command} within {iterations} poll iterations")]
    Timeout {
        command: &'static str,
        iterations: u32,
    },

    #[error("Duplicate command name {0:?} in table")]
    DuplicateCommand(&'static str),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Framing rules of a protocol variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// ROM bootloader: constant 0x01 flag byte, response expected
    /// after one fixed delay.
    BootRom,
    /// Second-stage loader: mod-256 checksum over length and payload,
    /// response waited for in a bounded poll loop, trailing bytes
    /// drained after the declared payload.
    EflashLoader,
}

impl Framing {
    fn flag_byte(&self, len: u16, params: &[u8]) -> u8 {
        match self {
            Framing::BootRom => 0x01,
            Framing::EflashLoader => {
                let mut sum = u32::from(len & 0xff) + u32::from(len >> 8);
                for &b in params {
                    sum += u32::from(b);
                }
                (sum & 0xff) as u8
            }
        }
    }
}

/// Request/response channel speaking one protocol variant.
pub struct CommandChannel<T: Transport> {
    transport: T,
    commands: HashMap<&'static str, CommandSpec>,
    framing: Framing,
}

impl<T: Transport> CommandChannel<T> {
    /// Build a channel over `transport` with the given command table.
    ///
    /// The table is validated here so unknown or ambiguous names are
    /// rejected at the boundary rather than deep in call chains.
    pub fn new(
        transport: T,
        table: &'static [CommandSpec],
        framing: Framing,
    ) -> Result<Self, ChannelError> {
        let mut commands = HashMap::with_capacity(table.len());
        for spec in table {
            if commands.insert(spec.name, *spec).is_some() {
                return Err(ChannelError::DuplicateCommand(spec.name));
            }
        }
        Ok(Self {
            transport,
            commands,
            framing,
        })
    }

    /// Sync handshake: flush stale input, send the sentinel preamble,
    /// expect exactly `OK` back.
    ///
    /// Returns `Ok(false)` when the device does not answer correctly.
    /// That is a normal, recoverable condition (device not yet reset)
    /// which the caller must react to, not a protocol failure.
    pub fn sync(&mut self) -> Result<bool, TransportError> {
        self.transport.flush_input()?;
        self.transport.write(&[SYNC_SENTINEL; SYNC_PREAMBLE_LEN])?;
        self.transport.delay(RESPONSE_DELAY);

        if self.transport.bytes_available()? != 2 {
            return Ok(false);
        }
        let answer = self.transport.read(2)?;
        Ok(answer == STATUS_OK)
    }

    /// Execute one command and return the response payload.
    ///
    /// `explicit_len` overrides the table's fixed parameter length for
    /// commands with variable payloads. `poll_budget` is the timeout
    /// in poll iterations (loader framing only; the ROM always waits
    /// one fixed delay). `expect` caps the payload read.
    pub fn execute(
        &mut self,
        name: &str,
        params: &[u8],
        explicit_len: Option<u16>,
        poll_budget: u32,
        expect: usize,
    ) -> Result<Vec<u8>, ChannelError> {
        let spec = *self
            .commands
            .get(name)
            .ok_or_else(|| ChannelError::UnknownCommand(name.to_string()))?;
        let len = explicit_len.unwrap_or(spec.param_len);
        if params.len() != usize::from(len) {
            return Err(ChannelError::ParameterLength {
                command: spec.name,
                expected: len,
                actual: params.len(),
            });
        }

        let mut frame = Vec::with_capacity(4 + params.len());
        frame.push(spec.opcode);
        frame.push(self.framing.flag_byte(len, params));
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(params);

        trace!(command = spec.name, opcode = spec.opcode, len, "Sending frame");
        self.transport.write(&frame)?;
        self.transport.delay(RESPONSE_DELAY);

        if self.framing == Framing::EflashLoader {
            let mut budget = poll_budget;
            while budget > 1 && self.transport.bytes_available()? < 2 {
                self.transport.delay(RESPONSE_DELAY);
                budget -= 1;
            }
        }

        if self.transport.bytes_available()? < 2 {
            return Err(ChannelError::Timeout {
                command: spec.name,
                iterations: poll_budget,
            });
        }

        let status = self.transport.read(2)?;
        match [status[0], status[1]] {
            STATUS_OK => {
                let mut payload = self.transport.read(expect)?;
                if self.framing == Framing::EflashLoader {
                    // Trailing variable-length data may still be
                    // pending beyond the declared payload.
                    loop {
                        let pending = self.transport.bytes_available()?;
                        if pending == 0 {
                            break;
                        }
                        payload.extend(self.transport.read(pending)?);
                    }
                }
                debug!(command = spec.name, response_len = payload.len(), "Command ok");
                Ok(payload)
            }
            STATUS_FAIL => {
                let detail = self.transport.read(DEFAULT_EXPECT)?;
                Err(ChannelError::Device(detail))
            }
            other => Err(ChannelError::Protocol(other)),
        }
    }

    /// Give up the channel and recover the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }
}
