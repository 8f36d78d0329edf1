//! Core library for talking to BL602-class bootloaders over serial
//! and for producing the flash images they boot.
//!
//! The crate splits into four layers:
//!
//! - [`transport`] — byte-level serial I/O behind the [`transport::Transport`]
//!   trait, with a scripted mock for tests.
//! - [`protocol`] — the framed command channel shared by both
//!   bootloader stages, plus their command tables.
//! - [`session`] — high-level flows: bootstrap the second-stage
//!   loader from the ROM, then erase/write/read flash through it.
//! - [`image`] — codec for the boot-image records and the
//!   sector-aligned flash image builder.

pub mod image;
pub mod protocol;
pub mod session;
pub mod transport;

pub use image::{
    assemble_flash_image, BootHeader, ClockConfig, FlashConfig, FlashImageBuilder, ImageError,
    PartitionEntry, PartitionTable, PtDocument, PtTextError,
};
pub use protocol::{ChannelError, CommandChannel, Framing};
pub use session::{
    verify, BootInfo, BootRomSession, EflashLoaderSession, SessionError, ShortReadPolicy,
    VerifyError,
};
pub use transport::{MockTransport, SerialTransport, Transport, TransportError};
