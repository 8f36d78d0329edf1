//! High-level sessions built on the command channel.
//!
//! A run is strictly two-phase: the [`BootRomSession`] uploads and
//! starts the second-stage program, then hands its transport to the
//! [`EflashLoaderSession`], which drives the actual flash work. The
//! two never exist at the same time.

pub mod bootrom;
pub mod eflash;

pub use bootrom::{BootInfo, BootRomSession, BOOT_HEADER_LEN, SEGMENT_HEADER_LEN};
pub use eflash::{EflashLoaderSession, ShortReadPolicy, VerifyError, verify};

use thiserror::Error;

use crate::protocol::ChannelError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Boot info response too short ({0} bytes)")]
    BootInfoTooShort(usize),

    #[error("Boot info length field mismatch: declared {declared}, got {actual}")]
    BootInfoLength { declared: usize, actual: usize },

    #[error("Image too short for bootstrap: {actual} bytes, need at least {minimum}")]
    ImageTooShort { actual: usize, minimum: usize },

    #[error("Flash read at {address:#010x} returned {actual} bytes, requested {requested}")]
    ShortRead {
        address: u32,
        requested: usize,
        actual: usize,
    },

    #[error("Flash read at {address:#010x} made no progress")]
    EmptyRead { address: u32 },
}
