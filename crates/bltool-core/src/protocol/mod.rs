//! Protocol module - command tables and the serial command channel.

pub mod channel;
pub mod commands;

pub use channel::{ChannelError, CommandChannel, Framing, DEFAULT_EXPECT, DEFAULT_POLL_BUDGET};
pub use commands::{CommandSpec, BOOTROM_COMMANDS, EFLASH_LOADER_COMMANDS};
