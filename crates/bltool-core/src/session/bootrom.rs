//! BootROM session - talks to the ROM-resident bootloader.
//!
//! The ROM exposes a small fixed command set; the only thing this
//! session ultimately does with it is upload a second-stage program
//! into RAM and jump into it. After `run_image` the ROM is gone, so
//! the bootstrap entry point consumes the session and yields a
//! loader session over the same transport.

use tracing::{debug, info};

use super::eflash::EflashLoaderSession;
use super::SessionError;
use crate::protocol::{
    ChannelError, CommandChannel, Framing, BOOTROM_COMMANDS, DEFAULT_EXPECT, DEFAULT_POLL_BUDGET,
};
use crate::transport::{Transport, TransportError};

/// Boot header record size on the wire.
pub const BOOT_HEADER_LEN: usize = 176;
/// Segment header record size on the wire.
pub const SEGMENT_HEADER_LEN: usize = 16;
/// Chunk size for segment data transfer.
const SEGMENT_CHUNK: usize = 4092;

/// Parsed `get_boot_info` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootInfo {
    pub rom_version: u32,
    /// OTP flag bytes, as reported by the ROM.
    pub otp_flags: Vec<u8>,
}

/// Session over the ROM bootloader command set.
pub struct BootRomSession<T: Transport> {
    channel: CommandChannel<T>,
}

impl<T: Transport> BootRomSession<T> {
    pub fn new(transport: T) -> Result<Self, ChannelError> {
        Ok(Self {
            channel: CommandChannel::new(transport, BOOTROM_COMMANDS, Framing::BootRom)?,
        })
    }

    /// Sync handshake. `Ok(false)` means the device has not been
    /// reset into the ROM yet; tell the user and retry.
    pub fn sync(&mut self) -> Result<bool, TransportError> {
        self.channel.sync()
    }

    /// Query ROM version and OTP flags.
    pub fn get_boot_info(&mut self) -> Result<BootInfo, SessionError> {
        let response =
            self.channel
                .execute("get_boot_info", &[], None, DEFAULT_POLL_BUDGET, DEFAULT_EXPECT)?;
        if response.len() < 6 {
            return Err(SessionError::BootInfoTooShort(response.len()));
        }
        let declared = usize::from(u16::from_le_bytes([response[0], response[1]]));
        let body = &response[2..];
        if declared != body.len() {
            return Err(SessionError::BootInfoLength {
                declared,
                actual: body.len(),
            });
        }
        let rom_version = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
        Ok(BootInfo {
            rom_version,
            otp_flags: body[4..].to_vec(),
        })
    }

    /// Load the 176-byte boot header. Length is validated by the
    /// channel against the command table.
    pub fn load_boot_header(&mut self, header: &[u8]) -> Result<(), SessionError> {
        self.channel
            .execute("load_boot_header", header, None, DEFAULT_POLL_BUDGET, DEFAULT_EXPECT)?;
        Ok(())
    }

    /// Load the 16-byte segment header.
    pub fn load_segment_header(&mut self, header: &[u8]) -> Result<(), SessionError> {
        self.channel
            .execute("load_seg_header", header, None, DEFAULT_POLL_BUDGET, DEFAULT_EXPECT)?;
        Ok(())
    }

    /// Upload segment data in 4092-byte chunks, strictly sequential.
    pub fn load_segment_data(&mut self, data: &[u8]) -> Result<(), SessionError> {
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + SEGMENT_CHUNK).min(data.len());
            let chunk = &data[offset..end];
            self.channel.execute(
                "load_seg_data",
                chunk,
                Some(chunk.len() as u16),
                DEFAULT_POLL_BUDGET,
                DEFAULT_EXPECT,
            )?;
            debug!(offset, len = chunk.len(), "Loaded segment chunk");
            offset = end;
        }
        Ok(())
    }

    pub fn check_image(&mut self) -> Result<(), SessionError> {
        self.channel
            .execute("check_image", &[], None, DEFAULT_POLL_BUDGET, DEFAULT_EXPECT)?;
        Ok(())
    }

    pub fn run_image(&mut self) -> Result<(), SessionError> {
        self.channel
            .execute("run_image", &[], None, DEFAULT_POLL_BUDGET, DEFAULT_EXPECT)?;
        Ok(())
    }

    /// Composite bootstrap: split a preprocessed image into boot
    /// header, segment header and payload, upload everything, check
    /// and run. Any step's failure aborts the rest; callers resync
    /// and rerun the whole sequence, never a part of it.
    pub fn bootstrap(&mut self, image: &[u8]) -> Result<(), SessionError> {
        let minimum = BOOT_HEADER_LEN + SEGMENT_HEADER_LEN;
        if image.len() < minimum {
            return Err(SessionError::ImageTooShort {
                actual: image.len(),
                minimum,
            });
        }
        let (boot_header, rest) = image.split_at(BOOT_HEADER_LEN);
        let (segment_header, payload) = rest.split_at(SEGMENT_HEADER_LEN);

        info!("Sending boot header");
        self.load_boot_header(boot_header)?;
        info!("Sending segment header");
        self.load_segment_header(segment_header)?;
        info!(len = payload.len(), "Writing program to RAM");
        self.load_segment_data(payload)?;
        info!("Checking image");
        self.check_image()?;
        info!("Jumping into loaded program");
        self.run_image()?;
        Ok(())
    }

    /// Recover the transport; the session is finished.
    pub fn into_transport(self) -> T {
        self.channel.into_transport()
    }

    /// Bootstrap the given second-stage image and hand the transport
    /// to a flash-loader session. The new session still needs its own
    /// sync handshake before use.
    pub fn boot_into_loader(
        mut self,
        image: &[u8],
    ) -> Result<EflashLoaderSession<T>, SessionError> {
        self.bootstrap(image)?;
        Ok(EflashLoaderSession::new(self.into_transport())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn ok() -> Vec<u8> {
        b"OK".to_vec()
    }

    fn boot_info_reply(version: u32, otp: &[u8]) -> Vec<u8> {
        let mut reply = ok();
        let body_len = (4 + otp.len()) as u16;
        reply.extend_from_slice(&body_len.to_le_bytes());
        reply.extend_from_slice(&version.to_le_bytes());
        reply.extend_from_slice(otp);
        reply
    }

    #[test]
    fn boot_info_parses_version_and_otp() {
        let mock = MockTransport::new();
        mock.reply(&boot_info_reply(0x0102_0304, &[0xde; 16]));
        let mut session = BootRomSession::new(mock.clone()).unwrap();

        let info = session.get_boot_info().unwrap();
        assert_eq!(info.rom_version, 0x0102_0304);
        assert_eq!(info.otp_flags, vec![0xde; 16]);
    }

    #[test]
    fn boot_info_rejects_wrong_length_field() {
        let mock = MockTransport::new();
        let mut reply = ok();
        reply.extend_from_slice(&99u16.to_le_bytes());
        reply.extend_from_slice(&[0u8; 8]);
        mock.reply(&reply);
        let mut session = BootRomSession::new(mock.clone()).unwrap();

        let err = session.get_boot_info().unwrap_err();
        assert!(matches!(
            err,
            SessionError::BootInfoLength {
                declared: 99,
                actual: 8
            }
        ));
    }

    #[test]
    fn segment_data_is_chunked_at_4092_and_reassembles() {
        let mock = MockTransport::new();
        mock.reply(b"OK");
        mock.reply(b"OK");
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();

        let mut session = BootRomSession::new(mock.clone()).unwrap();
        session.load_segment_data(&data).unwrap();

        let writes = mock.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0][0], 0x18);
        assert_eq!(writes[0].len(), 4 + 4092);
        assert_eq!(writes[1].len(), 4 + 908);
        // declared lengths match each chunk exactly
        assert_eq!(&writes[0][2..4], &4092u16.to_le_bytes());
        assert_eq!(&writes[1][2..4], &908u16.to_le_bytes());
        // reassembling the chunks reproduces the original bytes
        let mut reassembled = writes[0][4..].to_vec();
        reassembled.extend_from_slice(&writes[1][4..]);
        assert_eq!(reassembled, data);
    }

    #[test]
    fn bootstrap_splits_image_and_runs_all_steps() {
        let mock = MockTransport::new();
        for _ in 0..5 {
            mock.reply(b"OK");
        }
        let mut image = vec![0xbb; BOOT_HEADER_LEN];
        image.extend_from_slice(&[0xcc; SEGMENT_HEADER_LEN]);
        image.extend_from_slice(&[0xdd; 100]);

        let mut session = BootRomSession::new(mock.clone()).unwrap();
        session.bootstrap(&image).unwrap();

        let writes = mock.writes();
        let opcodes: Vec<u8> = writes.iter().map(|w| w[0]).collect();
        assert_eq!(opcodes, vec![0x11, 0x17, 0x18, 0x19, 0x1a]);
        assert_eq!(&writes[0][4..], &[0xbb; BOOT_HEADER_LEN][..]);
        assert_eq!(&writes[1][4..], &[0xcc; SEGMENT_HEADER_LEN][..]);
        assert_eq!(&writes[2][4..], &[0xdd; 100][..]);
    }

    #[test]
    fn bootstrap_rejects_truncated_image() {
        let mock = MockTransport::new();
        let mut session = BootRomSession::new(mock.clone()).unwrap();
        let err = session.bootstrap(&[0u8; 100]).unwrap_err();
        assert!(matches!(err, SessionError::ImageTooShort { actual: 100, .. }));
        assert!(mock.writes().is_empty());
    }

    #[test]
    fn bootstrap_aborts_on_first_failure() {
        let mock = MockTransport::new();
        mock.reply(b"OK");
        mock.reply(b"FL\x01\x00");
        let mut image = vec![0u8; BOOT_HEADER_LEN + SEGMENT_HEADER_LEN];
        image.extend_from_slice(&[0u8; 64]);

        let mut session = BootRomSession::new(mock.clone()).unwrap();
        assert!(session.bootstrap(&image).is_err());
        // header + segment header only; no data, check or run
        assert_eq!(mock.writes().len(), 2);
    }
}
