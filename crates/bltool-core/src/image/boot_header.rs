//! Boot header record (`BFNP`).
//!
//! 176 bytes: magic, revision, an embedded flash config and clock
//! config, four boot words, a SHA-256 of the image payload, two
//! reserved words and a CRC32 over the whole first 172 bytes. Note
//! the CRC range includes the magic here, unlike the embedded
//! records.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};

use super::{check_crc, check_len, check_magic, crc32, ClockConfig, FlashConfig, ImageError};

const RECORD: &str = "boot header";

/// Byte range covered by the trailing CRC32.
const CRC_RANGE: usize = 172;
/// Offset of the embedded payload hash.
const HASH_OFFSET: usize = 132;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootHeader {
    pub revision: u32,
    pub flash_config: FlashConfig,
    pub clock_config: ClockConfig,
    pub boot_cfg: u32,
    pub img_segment_info: u32,
    pub boot_entry: u32,
    pub img_start: u32,
    /// SHA-256 of the payload this header fronts.
    pub hash: [u8; 32],
}

impl Default for BootHeader {
    fn default() -> Self {
        Self {
            revision: 1,
            flash_config: FlashConfig::bl602_app(),
            clock_config: ClockConfig::default(),
            boot_cfg: 0x3300,
            img_segment_info: 0,
            boot_entry: 0,
            img_start: 0x2000,
            hash: [0u8; 32],
        }
    }
}

impl BootHeader {
    pub const MAGIC: [u8; 4] = *b"BFNP";
    /// Encoded size including magic and CRC trailer.
    pub const SIZE: usize = 176;

    /// Header for the given payload: length and SHA-256 filled in
    /// from the data itself.
    pub fn for_payload(payload: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        Self {
            img_segment_info: payload.len() as u32,
            hash: hasher.finalize().into(),
            ..Self::default()
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&Self::MAGIC);
        buf.write_u32::<LittleEndian>(self.revision).unwrap();
        buf.extend_from_slice(&self.flash_config.to_bytes());
        buf.extend_from_slice(&self.clock_config.to_bytes());
        buf.write_u32::<LittleEndian>(self.boot_cfg).unwrap();
        buf.write_u32::<LittleEndian>(self.img_segment_info).unwrap();
        buf.write_u32::<LittleEndian>(self.boot_entry).unwrap();
        buf.write_u32::<LittleEndian>(self.img_start).unwrap();
        buf.extend_from_slice(&self.hash);
        buf.write_u32::<LittleEndian>(0).unwrap();
        buf.write_u32::<LittleEndian>(0).unwrap();
        let crc = crc32(&buf[..CRC_RANGE]);
        buf.write_u32::<LittleEndian>(crc).unwrap();
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ImageError> {
        check_len(RECORD, Self::SIZE, data)?;
        check_magic(RECORD, Self::MAGIC, data)?;
        let mut trailer = Cursor::new(&data[CRC_RANGE..Self::SIZE]);
        let stored = trailer.read_u32::<LittleEndian>()?;
        check_crc(RECORD, stored, crc32(&data[..CRC_RANGE]))?;

        let mut cursor = Cursor::new(&data[4..8]);
        let revision = cursor.read_u32::<LittleEndian>()?;
        let flash_config = FlashConfig::from_bytes(&data[8..8 + FlashConfig::SIZE])?;
        let clock_config =
            ClockConfig::from_bytes(&data[100..100 + ClockConfig::SIZE])?;
        let mut words = Cursor::new(&data[116..HASH_OFFSET]);
        let boot_cfg = words.read_u32::<LittleEndian>()?;
        let img_segment_info = words.read_u32::<LittleEndian>()?;
        let boot_entry = words.read_u32::<LittleEndian>()?;
        let img_start = words.read_u32::<LittleEndian>()?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&data[HASH_OFFSET..HASH_OFFSET + 32]);

        Ok(Self {
            revision,
            flash_config,
            clock_config,
            boot_cfg,
            img_segment_info,
            boot_entry,
            img_start,
            hash,
        })
    }

    /// Check the embedded hash against a payload.
    pub fn verify_payload(&self, payload: &[u8]) -> bool {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        let digest: [u8; 32] = hasher.finalize().into();
        digest == self.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_size_is_176() {
        assert_eq!(BootHeader::default().to_bytes().len(), BootHeader::SIZE);
    }

    #[test]
    fn roundtrip_is_lossless() {
        let header = BootHeader::for_payload(b"firmware goes here");
        assert_eq!(BootHeader::from_bytes(&header.to_bytes()).unwrap(), header);
    }

    #[test]
    fn embedded_configs_land_at_fixed_offsets() {
        let bytes = BootHeader::default().to_bytes();
        assert_eq!(&bytes[8..12], b"FCFG");
        assert_eq!(&bytes[100..104], b"PCFG");
    }

    #[test]
    fn corrupted_byte_is_caught_by_crc() {
        let mut bytes = BootHeader::default().to_bytes();
        bytes[120] ^= 0x01;
        assert!(matches!(
            BootHeader::from_bytes(&bytes),
            Err(ImageError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn payload_hash_detects_a_bit_flip() {
        let mut payload = vec![0xa5u8; 1000];
        let header = BootHeader::for_payload(&payload);
        assert!(header.verify_payload(&payload));
        payload[500] ^= 0x01;
        assert!(!header.verify_payload(&payload));
    }

    #[test]
    fn payload_hash_is_plain_sha256() {
        let header = BootHeader::for_payload(b"");
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(header.hash.as_slice(), &expected[..]);
    }

    #[test]
    fn for_payload_records_length() {
        let header = BootHeader::for_payload(&[0u8; 4242]);
        assert_eq!(header.img_segment_info, 4242);
    }
}
