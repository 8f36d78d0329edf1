//! Boot-image record codec.
//!
//! Four fixed-layout little-endian records make up a flashable image:
//! flash timing config (`FCFG`), clock config (`PCFG`), boot header
//! (`BFNP`) and partition table (`BFPT`). Every record leads with its
//! magic and trails with a CRC32 over a record-specific sub-range;
//! the boot header additionally embeds a SHA-256 of the payload that
//! follows it.

pub mod boot_header;
pub mod clock_config;
pub mod flash_config;
pub mod layout;
pub mod partition;
pub mod pt_text;

pub use boot_header::BootHeader;
pub use clock_config::{ClockConfig, PllClock, XtalType};
pub use flash_config::FlashConfig;
pub use layout::{assemble_flash_image, FlashImageBuilder};
pub use partition::{PartitionEntry, PartitionTable};
pub use pt_text::{parse_int, PtDocument, PtTextError};

use thiserror::Error;

/// Flash erase/alignment unit; all image layout offsets are
/// sector-aligned.
pub const SECTOR_SIZE: usize = 4096;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("{record}: buffer is {actual} bytes, expected {expected}")]
    TooShort {
        record: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{record}: bad magic {actual:?}, expected {expected:?}")]
    BadMagic {
        record: &'static str,
        expected: [u8; 4],
        actual: [u8; 4],
    },

    #[error("{record}: CRC32 mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        record: &'static str,
        stored: u32,
        computed: u32,
    },

    #[error("Partition name {0:?} does not fit in 9 bytes")]
    NameTooLong(String),

    #[error("Partition name {0:?} is not ASCII")]
    NameNotAscii(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// CRC-32 as used by zlib/PNG (IEEE polynomial, seed 0).
pub(crate) fn crc32(data: &[u8]) -> u32 {
    crc::crc32::checksum_ieee(data)
}

pub(crate) fn check_magic(
    record: &'static str,
    expected: [u8; 4],
    data: &[u8],
) -> Result<(), ImageError> {
    let actual = [data[0], data[1], data[2], data[3]];
    if actual != expected {
        return Err(ImageError::BadMagic {
            record,
            expected,
            actual,
        });
    }
    Ok(())
}

pub(crate) fn check_len(
    record: &'static str,
    expected: usize,
    data: &[u8],
) -> Result<(), ImageError> {
    if data.len() < expected {
        return Err(ImageError::TooShort {
            record,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_crc(
    record: &'static str,
    stored: u32,
    computed: u32,
) -> Result<(), ImageError> {
    if stored != computed {
        return Err(ImageError::CrcMismatch {
            record,
            stored,
            computed,
        });
    }
    Ok(())
}

/// Declares a record's field list once and derives a matched
/// writer/reader pair from it, so encode and decode can never drift
/// out of sync.
macro_rules! record_layout {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $($field:ident: $ty:ident),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            $(pub $field: $ty,)+
        }

        impl $name {
            fn write_fields(&self, buf: &mut Vec<u8>) {
                use byteorder::{LittleEndian, WriteBytesExt};
                $(crate::image::record_layout!(@put buf, self.$field, $ty);)+
            }

            fn read_fields(cursor: &mut std::io::Cursor<&[u8]>) -> std::io::Result<Self> {
                use byteorder::{LittleEndian, ReadBytesExt};
                Ok(Self {
                    $($field: crate::image::record_layout!(@get cursor, $ty),)+
                })
            }
        }
    };
    (@put $buf:ident, $val:expr, u8) => { $buf.write_u8($val).unwrap() };
    (@put $buf:ident, $val:expr, u16) => { $buf.write_u16::<LittleEndian>($val).unwrap() };
    (@put $buf:ident, $val:expr, u32) => { $buf.write_u32::<LittleEndian>($val).unwrap() };
    (@get $cur:ident, u8) => { $cur.read_u8()? };
    (@get $cur:ident, u16) => { $cur.read_u16::<LittleEndian>()? };
    (@get $cur:ident, u32) => { $cur.read_u32::<LittleEndian>()? };
}
pub(crate) use record_layout;
