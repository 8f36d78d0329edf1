//! Flash-loader session - talks to the uploaded second-stage program.
//!
//! Only valid after the BootROM bootstrap has jumped into the loader;
//! the loader speaks its own command set with its own checksum rule,
//! so a fresh sync handshake is required.

use thiserror::Error;
use tracing::{debug, warn};

use super::SessionError;
use crate::protocol::{
    ChannelError, CommandChannel, Framing, DEFAULT_EXPECT, DEFAULT_POLL_BUDGET,
    EFLASH_LOADER_COMMANDS,
};
use crate::transport::{Transport, TransportError};

/// Chunk size for flash programming.
const WRITE_CHUNK: usize = 4092;
/// Chunk size for flash readback.
const READ_CHUNK: usize = 512;
/// Poll budget for flash operations; chip erase in particular can
/// take many seconds.
const EXTENDED_POLL_BUDGET: u32 = 100;
/// Fixed response overhead on top of the requested read length.
const READ_OVERHEAD: usize = 10;
/// Bytes preceding the data in a flash_read response payload.
const READ_PREFIX: usize = 2;

/// How `read_flash` treats a chunk that returns fewer bytes than
/// requested.
///
/// The device is allowed to under-return on an unreliable link; with
/// `Tolerant` the session logs it and advances by what it got, with
/// `Strict` (the default) it fails. A chunk returning nothing at all
/// is an error either way, so the read always terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShortReadPolicy {
    #[default]
    Strict,
    Tolerant,
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Length mismatch: wrote {expected} bytes, read back {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Mismatch at offset {offset:#x}: wrote {expected:#04x}, read {actual:#04x}")]
    Mismatch {
        offset: usize,
        expected: u8,
        actual: u8,
    },
}

/// Byte-for-byte comparison of a written buffer against its readback.
///
/// Reports the first differing offset with both values.
pub fn verify(expected: &[u8], actual: &[u8]) -> Result<(), VerifyError> {
    if expected.len() != actual.len() {
        return Err(VerifyError::LengthMismatch {
            expected: expected.len(),
            actual: actual.len(),
        });
    }
    for (offset, (&e, &a)) in expected.iter().zip(actual).enumerate() {
        if e != a {
            return Err(VerifyError::Mismatch {
                offset,
                expected: e,
                actual: a,
            });
        }
    }
    Ok(())
}

/// Session over the second-stage flash-loader command set.
pub struct EflashLoaderSession<T: Transport> {
    channel: CommandChannel<T>,
}

impl<T: Transport> EflashLoaderSession<T> {
    pub fn new(transport: T) -> Result<Self, ChannelError> {
        Ok(Self {
            channel: CommandChannel::new(transport, EFLASH_LOADER_COMMANDS, Framing::EflashLoader)?,
        })
    }

    /// Sync handshake with the loader. No channel state survives the
    /// jump from the ROM, so this must succeed before anything else.
    pub fn sync(&mut self) -> Result<bool, TransportError> {
        self.channel.sync()
    }

    /// Full chip erase. Slow; uses the extended poll budget.
    pub fn erase_flash(&mut self) -> Result<(), SessionError> {
        self.channel
            .execute("chip_erase", &[], None, EXTENDED_POLL_BUDGET, DEFAULT_EXPECT)?;
        Ok(())
    }

    /// Program `data` into flash starting at `start_addr`.
    ///
    /// 4092-byte chunks; each program command is followed by a check
    /// command before the next chunk goes out, so a failure leaves
    /// every prior chunk verified and nothing after it written.
    pub fn write_flash(
        &mut self,
        data: &[u8],
        start_addr: u32,
        mut progress: impl FnMut(u64, u64),
    ) -> Result<(), SessionError> {
        let total = data.len();
        let mut offset = 0;
        while offset < total {
            let end = (offset + WRITE_CHUNK).min(total);
            let chunk = &data[offset..end];
            let addr = start_addr + offset as u32;

            let mut params = Vec::with_capacity(4 + chunk.len());
            params.extend_from_slice(&addr.to_le_bytes());
            params.extend_from_slice(chunk);
            self.channel.execute(
                "flash_program",
                &params,
                Some((chunk.len() + 4) as u16),
                EXTENDED_POLL_BUDGET,
                DEFAULT_EXPECT,
            )?;
            self.channel
                .execute("flash_check", &[], None, EXTENDED_POLL_BUDGET, DEFAULT_EXPECT)?;

            debug!(addr = format_args!("{addr:#010x}"), len = chunk.len(), "Programmed chunk");
            offset = end;
            progress(offset as u64, total as u64);
        }
        Ok(())
    }

    /// Read `amount` bytes of flash starting at `start_addr`.
    pub fn read_flash(
        &mut self,
        start_addr: u32,
        amount: usize,
        policy: ShortReadPolicy,
        mut progress: impl FnMut(u64, u64),
    ) -> Result<Vec<u8>, SessionError> {
        let mut data = Vec::with_capacity(amount);
        let mut addr = start_addr;
        let mut remaining = amount;
        while remaining > 0 {
            let length = remaining.min(READ_CHUNK);
            let mut params = [0u8; 8];
            params[..4].copy_from_slice(&addr.to_le_bytes());
            params[4..].copy_from_slice(&(length as u32).to_le_bytes());
            let response = self.channel.execute(
                "flash_read",
                &params,
                None,
                EXTENDED_POLL_BUDGET,
                length + READ_OVERHEAD,
            )?;

            let chunk = response.get(READ_PREFIX..).unwrap_or(&[]);
            if chunk.is_empty() {
                return Err(SessionError::EmptyRead { address: addr });
            }
            if chunk.len() != length {
                match policy {
                    ShortReadPolicy::Strict => {
                        return Err(SessionError::ShortRead {
                            address: addr,
                            requested: length,
                            actual: chunk.len(),
                        });
                    }
                    ShortReadPolicy::Tolerant => {
                        warn!(
                            addr = format_args!("{addr:#010x}"),
                            requested = length,
                            actual = chunk.len(),
                            "Short flash read, continuing"
                        );
                    }
                }
            }
            let take = chunk.len().min(length);
            data.extend_from_slice(&chunk[..take]);
            addr += take as u32;
            remaining -= take;
            progress((amount - remaining) as u64, amount as u64);
        }
        Ok(data)
    }

    /// Recover the transport; the session is finished.
    pub fn into_transport(self) -> T {
        self.channel.into_transport()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn read_reply(data: &[u8]) -> Vec<u8> {
        // status + 2-byte prefix + data
        let mut reply = b"OK".to_vec();
        reply.extend_from_slice(&(data.len() as u16).to_le_bytes());
        reply.extend_from_slice(data);
        reply
    }

    fn test_pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8).collect()
    }

    #[test]
    fn write_splits_5000_bytes_into_4092_and_908() {
        let mock = MockTransport::new();
        for _ in 0..4 {
            mock.reply(b"OK");
        }
        let data = test_pattern(5000);
        let mut session = EflashLoaderSession::new(mock.clone()).unwrap();
        session.write_flash(&data, 0x2000, |_, _| {}).unwrap();

        let writes = mock.writes();
        // program, check, program, check
        let opcodes: Vec<u8> = writes.iter().map(|w| w[0]).collect();
        assert_eq!(opcodes, vec![0x31, 0x3a, 0x31, 0x3a]);

        let first = &writes[0];
        assert_eq!(&first[4..8], &0x2000u32.to_le_bytes());
        assert_eq!(first.len(), 4 + 4 + 4092);
        let second = &writes[2];
        assert_eq!(&second[4..8], &(0x2000u32 + 4092).to_le_bytes());
        assert_eq!(second.len(), 4 + 4 + 908);

        // chunks carry the source bytes in order
        assert_eq!(&first[8..], &data[..4092]);
        assert_eq!(&second[8..], &data[4092..]);
    }

    #[test]
    fn write_then_read_back_verifies_clean() {
        let mock = MockTransport::new();
        let data = test_pattern(5000);
        for _ in 0..4 {
            mock.reply(b"OK");
        }
        // 5000 / 512 = 9 full chunks + 392 remainder
        for chunk in data.chunks(512) {
            mock.reply(&read_reply(chunk));
        }

        let mut session = EflashLoaderSession::new(mock.clone()).unwrap();
        session.write_flash(&data, 0x2000, |_, _| {}).unwrap();
        let readback = session
            .read_flash(0x2000, data.len(), ShortReadPolicy::Strict, |_, _| {})
            .unwrap();

        assert_eq!(readback.len(), data.len());
        verify(&data, &readback).unwrap();
    }

    #[test]
    fn read_requests_carry_address_and_length() {
        let mock = MockTransport::new();
        mock.reply(&read_reply(&[0xab; 100]));
        let mut session = EflashLoaderSession::new(mock.clone()).unwrap();
        session
            .read_flash(0x1234, 100, ShortReadPolicy::Strict, |_, _| {})
            .unwrap();

        let frame = &mock.writes()[0];
        assert_eq!(frame[0], 0x32);
        assert_eq!(&frame[4..8], &0x1234u32.to_le_bytes());
        assert_eq!(&frame[8..12], &100u32.to_le_bytes());
    }

    #[test]
    fn short_read_fails_under_strict_policy() {
        let mock = MockTransport::new();
        mock.reply(&read_reply(&[0x11; 300]));
        let mut session = EflashLoaderSession::new(mock.clone()).unwrap();
        let err = session
            .read_flash(0, 512, ShortReadPolicy::Strict, |_, _| {})
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::ShortRead {
                requested: 512,
                actual: 300,
                ..
            }
        ));
    }

    #[test]
    fn short_read_advances_by_actual_bytes_under_tolerant_policy() {
        let mock = MockTransport::new();
        // first chunk under-returns 300 of 512; the session must ask
        // for the remaining 724 starting where the data actually ended
        mock.reply(&read_reply(&[0x11; 300]));
        mock.reply(&read_reply(&[0x22; 512]));
        mock.reply(&read_reply(&[0x33; 212]));
        let mut session = EflashLoaderSession::new(mock.clone()).unwrap();
        let data = session
            .read_flash(0x100, 1024, ShortReadPolicy::Tolerant, |_, _| {})
            .unwrap();

        assert_eq!(data.len(), 1024);
        let writes = mock.writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(&writes[1][4..8], &(0x100u32 + 300).to_le_bytes());
        assert_eq!(&writes[2][4..8], &(0x100u32 + 812).to_le_bytes());
        assert_eq!(&writes[2][8..12], &212u32.to_le_bytes());
    }

    #[test]
    fn empty_chunk_terminates_even_when_tolerant() {
        let mock = MockTransport::new();
        let mut reply = b"OK".to_vec();
        reply.extend_from_slice(&0u16.to_le_bytes());
        mock.reply(&reply);
        let mut session = EflashLoaderSession::new(mock.clone()).unwrap();
        let err = session
            .read_flash(0x40, 512, ShortReadPolicy::Tolerant, |_, _| {})
            .unwrap_err();
        assert!(matches!(err, SessionError::EmptyRead { address: 0x40 }));
    }

    #[test]
    fn progress_accounts_for_every_byte() {
        let mock = MockTransport::new();
        let data = test_pattern(1300);
        for chunk in data.chunks(512) {
            mock.reply(&read_reply(chunk));
        }
        let mut session = EflashLoaderSession::new(mock.clone()).unwrap();
        let mut reported = Vec::new();
        session
            .read_flash(0, 1300, ShortReadPolicy::Strict, |done, total| {
                reported.push((done, total));
            })
            .unwrap();
        assert_eq!(reported, vec![(512, 1300), (1024, 1300), (1300, 1300)]);
    }

    #[test]
    fn verify_reports_first_difference() {
        let a = vec![1, 2, 3, 4];
        let mut b = a.clone();
        b[2] = 9;
        match verify(&a, &b).unwrap_err() {
            VerifyError::Mismatch {
                offset,
                expected,
                actual,
            } => {
                assert_eq!((offset, expected, actual), (2, 3, 9));
            }
            other => panic!("unexpected {other:?}"),
        }
        verify(&a, &a.clone()).unwrap();
    }
}
