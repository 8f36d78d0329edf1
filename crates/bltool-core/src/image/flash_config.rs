//! Flash configuration record (`FCFG`).
//!
//! Describes the SPI command opcodes and timing the ROM needs to talk
//! to the flash part. 92 bytes on the wire: magic, 84 bytes of
//! fields, CRC32 over everything after the magic.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{check_crc, check_len, check_magic, crc32, record_layout, ImageError};

const RECORD: &str = "flash config";

record_layout! {
    /// SPI flash command set and timing parameters.
    pub struct FlashConfig {
        io_mode: u8,
        c_read_support: u8,
        clk_delay: u8,
        clk_invert: u8,
        reset_en_cmd: u8,
        reset_cmd: u8,
        reset_cread_cmd: u8,
        reset_cread_cmd_size: u8,
        jedec_id_cmd: u8,
        jedec_id_cmd_dmy_clk: u8,
        qpi_jedec_id_cmd: u8,
        qpi_jedec_id_cmd_dmy_clk: u8,
        sector_size: u8,
        mid: u8,
        page_size: u16,
        chip_erase_cmd: u8,
        sector_erase_cmd: u8,
        blk32_erase_cmd: u8,
        blk64_erase_cmd: u8,
        write_enable_cmd: u8,
        page_program_cmd: u8,
        qpage_program_cmd: u8,
        qpp_addr_mode: u8,
        fast_read_cmd: u8,
        fr_dmy_clk: u8,
        qpi_fast_read_cmd: u8,
        qpi_fr_dmy_clk: u8,
        fast_read_do_cmd: u8,
        fr_do_dmy_clk: u8,
        fast_read_dio_cmd: u8,
        fr_dio_dmy_clk: u8,
        fast_read_qo_cmd: u8,
        fr_qo_dmy_clk: u8,
        fast_read_qio_cmd: u8,
        fr_qio_dmy_clk: u8,
        qpi_fast_read_qio_cmd: u8,
        qpi_fr_qio_dmy_clk: u8,
        qpi_page_program_cmd: u8,
        write_vreg_enable_cmd: u8,
        wr_enable_index: u8,
        qe_index: u8,
        busy_index: u8,
        wr_enable_bit: u8,
        qe_bit: u8,
        busy_bit: u8,
        wr_enable_write_reg_len: u8,
        wr_enable_read_reg_len: u8,
        qe_write_reg_len: u8,
        qe_read_reg_len: u8,
        release_power_down: u8,
        busy_read_reg_len: u8,
        read_reg_cmd: u32,
        write_reg_cmd: u32,
        enter_qpi: u8,
        exit_qpi: u8,
        c_read_mode: u8,
        c_read_exit: u8,
        burst_wrap_cmd: u8,
        burst_wrap_cmd_dmy_clk: u8,
        burst_wrap_data_mode: u8,
        burst_wrap_data: u8,
        de_burst_wrap_cmd: u8,
        de_burst_wrap_cmd_dmy_clk: u8,
        de_burst_wrap_data_mode: u8,
        de_burst_wrap_data: u8,
        time_e_sector: u16,
        time_e_32k: u16,
        time_e_64k: u16,
        time_page_pgm: u16,
        time_ce: u16,
        pd_delay: u8,
        qe_data: u8,
    }
}

impl FlashConfig {
    pub const MAGIC: [u8; 4] = *b"FCFG";
    /// Encoded size including magic and CRC trailer.
    pub const SIZE: usize = 92;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&Self::MAGIC);
        self.write_fields(&mut buf);
        let crc = crc32(&buf[4..]);
        buf.write_u32::<LittleEndian>(crc).unwrap();
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ImageError> {
        check_len(RECORD, Self::SIZE, data)?;
        check_magic(RECORD, Self::MAGIC, data)?;
        let mut trailer = Cursor::new(&data[Self::SIZE - 4..Self::SIZE]);
        let stored = trailer.read_u32::<LittleEndian>()?;
        check_crc(RECORD, stored, crc32(&data[4..Self::SIZE - 4]))?;
        let mut cursor = Cursor::new(&data[4..Self::SIZE - 4]);
        Ok(Self::read_fields(&mut cursor)?)
    }

    /// Config the BL602 application boot header uses; differs from the
    /// ROM default in IO mode, clock setup and programming timings.
    pub fn bl602_app() -> Self {
        Self {
            io_mode: 0x04,
            clk_delay: 0x01,
            clk_invert: 0x01,
            qe_write_reg_len: 0x01,
            write_reg_cmd: 0x0000_3101,
            c_read_mode: 0x20,
            c_read_exit: 0xff,
            time_page_pgm: 0x0005,
            time_ce: 0x0d40,
            pd_delay: 0x03,
            ..Self::default()
        }
    }
}

/// ROM default configuration (Winbond-style part, QIO continuous read).
impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            io_mode: 0x14,
            c_read_support: 0x01,
            clk_delay: 0x00,
            clk_invert: 0x0f,
            reset_en_cmd: 0x66,
            reset_cmd: 0x99,
            reset_cread_cmd: 0xff,
            reset_cread_cmd_size: 0x03,
            jedec_id_cmd: 0x9f,
            jedec_id_cmd_dmy_clk: 0x00,
            qpi_jedec_id_cmd: 0x9f,
            qpi_jedec_id_cmd_dmy_clk: 0x00,
            sector_size: 0x04,
            mid: 0xef,
            page_size: 0x0100,
            chip_erase_cmd: 0xc7,
            sector_erase_cmd: 0x20,
            blk32_erase_cmd: 0x52,
            blk64_erase_cmd: 0xd8,
            write_enable_cmd: 0x06,
            page_program_cmd: 0x02,
            qpage_program_cmd: 0x32,
            qpp_addr_mode: 0x00,
            fast_read_cmd: 0x0b,
            fr_dmy_clk: 0x01,
            qpi_fast_read_cmd: 0x0b,
            qpi_fr_dmy_clk: 0x01,
            fast_read_do_cmd: 0x3b,
            fr_do_dmy_clk: 0x01,
            fast_read_dio_cmd: 0xbb,
            fr_dio_dmy_clk: 0x00,
            fast_read_qo_cmd: 0x6b,
            fr_qo_dmy_clk: 0x01,
            fast_read_qio_cmd: 0xeb,
            fr_qio_dmy_clk: 0x02,
            qpi_fast_read_qio_cmd: 0xeb,
            qpi_fr_qio_dmy_clk: 0x02,
            qpi_page_program_cmd: 0x02,
            write_vreg_enable_cmd: 0x50,
            wr_enable_index: 0x00,
            qe_index: 0x01,
            busy_index: 0x00,
            wr_enable_bit: 0x01,
            qe_bit: 0x01,
            busy_bit: 0x00,
            wr_enable_write_reg_len: 0x02,
            wr_enable_read_reg_len: 0x01,
            qe_write_reg_len: 0x02,
            qe_read_reg_len: 0x01,
            release_power_down: 0xab,
            busy_read_reg_len: 0x01,
            read_reg_cmd: 0x0000_3505,
            write_reg_cmd: 0x0000_0101,
            enter_qpi: 0x38,
            exit_qpi: 0xff,
            c_read_mode: 0xa0,
            c_read_exit: 0xf0,
            burst_wrap_cmd: 0x77,
            burst_wrap_cmd_dmy_clk: 0x03,
            burst_wrap_data_mode: 0x02,
            burst_wrap_data: 0x40,
            de_burst_wrap_cmd: 0x77,
            de_burst_wrap_cmd_dmy_clk: 0x03,
            de_burst_wrap_data_mode: 0x02,
            de_burst_wrap_data: 0xf0,
            time_e_sector: 0x012c,
            time_e_32k: 0x04b0,
            time_e_64k: 0x04b0,
            time_page_pgm: 0x0032,
            time_ce: 0x4e20,
            pd_delay: 0x05,
            qe_data: 0x00,
        }
    }
}
