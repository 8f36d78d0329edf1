//! Command tables for the two protocol variants.
//!
//! The BootROM set is available immediately after reset; the
//! flash-loader set is spoken by the second-stage program once it has
//! been uploaded and started. Opcodes and fixed parameter lengths are
//! defined by the device firmware.

/// One command of a protocol variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub opcode: u8,
    /// Fixed parameter length; commands with variable payloads pass an
    /// explicit length override per call.
    pub param_len: u16,
}

const fn cmd(name: &'static str, opcode: u8, param_len: u16) -> CommandSpec {
    CommandSpec {
        name,
        opcode,
        param_len,
    }
}

/// ROM bootloader command set.
pub const BOOTROM_COMMANDS: &[CommandSpec] = &[
    cmd("get_boot_info", 0x10, 0x0000),
    cmd("load_boot_header", 0x11, 0x00b0),
    cmd("load_public_key", 0x12, 0x0044),
    cmd("load_public_key2", 0x13, 0x0044),
    cmd("load_signature", 0x14, 0x0004),
    cmd("load_signature2", 0x15, 0x0004),
    cmd("load_aes_iv", 0x16, 0x0014),
    cmd("load_seg_header", 0x17, 0x0010),
    cmd("load_seg_data", 0x18, 0x0100),
    cmd("check_image", 0x19, 0x0000),
    cmd("run_image", 0x1a, 0x0000),
    cmd("change_rate", 0x20, 0x0008),
    cmd("reset", 0x21, 0x0000),
    cmd("flash_erase", 0x30, 0x0000),
    cmd("flash_write", 0x31, 0x0100),
    cmd("flash_read", 0x32, 0x0100),
    cmd("flash_boot", 0x33, 0x0000),
    cmd("efuse_write", 0x40, 0x0080),
    cmd("efuse_read", 0x41, 0x0000),
];

/// Second-stage flash-loader command set.
pub const EFLASH_LOADER_COMMANDS: &[CommandSpec] = &[
    cmd("chip_erase", 0x3c, 0x0000),
    // start-addr (4 bytes), end-addr (4 bytes)
    cmd("flash_erase", 0x30, 0x0008),
    // start-addr (4 bytes), payload (n bytes); length passed as n+4
    cmd("flash_program", 0x31, 0x0004),
    cmd("flash_check", 0x3a, 0x0000),
    // start-addr (4 bytes), read-length (4 bytes)
    cmd("flash_read", 0x32, 0x0008),
    cmd("sha256_read", 0x3d, 0x0008),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_have_unique_names() {
        for table in [BOOTROM_COMMANDS, EFLASH_LOADER_COMMANDS] {
            for (i, a) in table.iter().enumerate() {
                for b in &table[i + 1..] {
                    assert_ne!(a.name, b.name);
                }
            }
        }
    }

    #[test]
    fn loader_overlaps_rom_opcodes_with_different_semantics() {
        // flash_read exists in both sets but with different parameter
        // lengths; the channel resolves against its own table only.
        let rom = BOOTROM_COMMANDS
            .iter()
            .find(|c| c.name == "flash_read")
            .unwrap();
        let loader = EFLASH_LOADER_COMMANDS
            .iter()
            .find(|c| c.name == "flash_read")
            .unwrap();
        assert_eq!(rom.opcode, loader.opcode);
        assert_ne!(rom.param_len, loader.param_len);
    }
}
