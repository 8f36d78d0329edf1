//! Clock configuration record (`PCFG`).
//!
//! 16 bytes: magic, six u8 fields, a reserved u16 and a CRC32 over
//! the 8 bytes after the magic.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{check_crc, check_len, check_magic, crc32, ImageError};

const RECORD: &str = "clock config";

/// Crystal oscillator frequency selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum XtalType {
    None = 0,
    Xtal24M = 1,
    Xtal32M = 2,
    Xtal38p4M = 3,
    #[default]
    Xtal40M = 4,
    Xtal26M = 5,
    Rc32M = 6,
}

/// PLL output frequency selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PllClock {
    Pll480M = 0,
    Pll240M = 1,
    Pll192M = 2,
    Pll160M = 3,
    #[default]
    Pll120M = 4,
    Pll96M = 5,
    Pll80M = 6,
    Pll48M = 7,
    Pll32M = 8,
}

/// System and flash clock setup the ROM applies before loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockConfig {
    pub xtal_type: u8,
    pub pll_clk: u8,
    pub hclk_div: u8,
    pub bclk_div: u8,
    pub flash_clk_type: u8,
    pub flash_clk_div: u8,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            xtal_type: XtalType::Xtal40M as u8,
            pll_clk: PllClock::Pll120M as u8,
            hclk_div: 0x00,
            bclk_div: 0x01,
            flash_clk_type: 0x03,
            flash_clk_div: 0x01,
        }
    }
}

impl ClockConfig {
    pub const MAGIC: [u8; 4] = *b"PCFG";
    /// Encoded size including magic, reserved word and CRC trailer.
    pub const SIZE: usize = 16;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&Self::MAGIC);
        buf.write_u8(self.xtal_type).unwrap();
        buf.write_u8(self.pll_clk).unwrap();
        buf.write_u8(self.hclk_div).unwrap();
        buf.write_u8(self.bclk_div).unwrap();
        buf.write_u8(self.flash_clk_type).unwrap();
        buf.write_u8(self.flash_clk_div).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap();
        let crc = crc32(&buf[4..]);
        buf.write_u32::<LittleEndian>(crc).unwrap();
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ImageError> {
        check_len(RECORD, Self::SIZE, data)?;
        check_magic(RECORD, Self::MAGIC, data)?;
        let mut cursor = Cursor::new(&data[4..Self::SIZE]);
        let config = Self {
            xtal_type: cursor.read_u8()?,
            pll_clk: cursor.read_u8()?,
            hclk_div: cursor.read_u8()?,
            bclk_div: cursor.read_u8()?,
            flash_clk_type: cursor.read_u8()?,
            flash_clk_div: cursor.read_u8()?,
        };
        let _reserved = cursor.read_u16::<LittleEndian>()?;
        let stored = cursor.read_u32::<LittleEndian>()?;
        check_crc(RECORD, stored, crc32(&data[4..Self::SIZE - 4]))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_size_is_16() {
        assert_eq!(ClockConfig::default().to_bytes().len(), ClockConfig::SIZE);
    }

    #[test]
    fn roundtrip_is_lossless() {
        let config = ClockConfig {
            xtal_type: XtalType::Xtal32M as u8,
            pll_clk: PllClock::Pll160M as u8,
            hclk_div: 2,
            bclk_div: 3,
            flash_clk_type: 1,
            flash_clk_div: 0,
        };
        assert_eq!(ClockConfig::from_bytes(&config.to_bytes()).unwrap(), config);
    }

    #[test]
    fn corrupted_field_is_caught_by_crc() {
        let mut bytes = ClockConfig::default().to_bytes();
        bytes[5] ^= 0x01;
        assert!(matches!(
            ClockConfig::from_bytes(&bytes),
            Err(ImageError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut bytes = ClockConfig::default().to_bytes();
        bytes[..4].copy_from_slice(b"QCFG");
        assert!(matches!(
            ClockConfig::from_bytes(&bytes),
            Err(ImageError::BadMagic { .. })
        ));
    }
}
