//! Sector-aligned flash image assembly.
//!
//! Builds the full flashable image: an outer boot header covering the
//! second-stage bootloader, the bootloader itself, two redundant
//! partition table copies, then the application fronted by its own
//! boot header. Gaps and alignment padding are `0xFF` (erased flash).

use tracing::debug;

use super::{BootHeader, ImageError, PartitionTable, SECTOR_SIZE};

/// The ROM hashes the bootloader with 12 trailing zero bytes; the
/// application with 4. The fillers go into the image so the stored
/// hash matches what is actually in flash.
const BOOTLOADER_FILLER: usize = 12;
const APP_FILLER: usize = 4;

/// Append-only image buffer with sector-padding helpers.
pub struct FlashImageBuilder {
    buf: Vec<u8>,
}

impl Default for FlashImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashImageBuilder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Current write offset in the image.
    pub fn offset(&self) -> usize {
        self.buf.len()
    }

    pub fn push(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    /// Pad with `0xFF` up to the next sector boundary. Already-aligned
    /// content gets no padding.
    pub fn pad_to_sector(&mut self) -> &mut Self {
        let rem = self.buf.len() % SECTOR_SIZE;
        if rem != 0 {
            self.buf.resize(self.buf.len() + SECTOR_SIZE - rem, 0xff);
        }
        self
    }

    /// Append `count` erased sectors.
    pub fn empty_sectors(&mut self, count: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + count * SECTOR_SIZE, 0xff);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

fn with_filler(data: &[u8], filler: usize) -> Vec<u8> {
    let mut padded = Vec::with_capacity(data.len() + filler);
    padded.extend_from_slice(data);
    padded.resize(data.len() + filler, 0);
    padded
}

/// Assemble a complete flash image.
///
/// Layout in sectors: outer boot header, one empty sector, the
/// bootloader, two empty sectors, the partition table twice, the
/// application boot header, the application.
pub fn assemble_flash_image(
    bootloader: &[u8],
    table: &PartitionTable,
    app: &[u8],
) -> Result<Vec<u8>, ImageError> {
    let bootloader = with_filler(bootloader, BOOTLOADER_FILLER);
    let app = with_filler(app, APP_FILLER);
    let table_bytes = table.to_bytes()?;

    let mut builder = FlashImageBuilder::new();
    builder
        .push(&BootHeader::for_payload(&bootloader).to_bytes())
        .pad_to_sector()
        .empty_sectors(1)
        .push(&bootloader)
        .pad_to_sector()
        .empty_sectors(2);

    debug!(offset = builder.offset(), "Placing partition tables");
    builder
        .push(&table_bytes)
        .pad_to_sector()
        .push(&table_bytes)
        .pad_to_sector();

    debug!(offset = builder.offset(), "Placing application");
    builder
        .push(&BootHeader::for_payload(&app).to_bytes())
        .pad_to_sector()
        .push(&app)
        .pad_to_sector();

    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PartitionEntry;

    fn table() -> PartitionTable {
        PartitionTable {
            entries: vec![PartitionEntry {
                name: "FW".into(),
                address0: 0x1_0000,
                size0: 0xf_0000,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn builder_pads_only_when_unaligned() {
        let mut builder = FlashImageBuilder::new();
        builder.push(&[0u8; SECTOR_SIZE]).pad_to_sector();
        assert_eq!(builder.offset(), SECTOR_SIZE);
        builder.push(&[0u8; 1]).pad_to_sector();
        assert_eq!(builder.offset(), 2 * SECTOR_SIZE);
    }

    #[test]
    fn padding_is_erased_flash() {
        let mut builder = FlashImageBuilder::new();
        builder.push(&[0xabu8; 10]).pad_to_sector();
        let image = builder.finish();
        assert!(image[10..].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn image_regions_land_on_expected_sectors() {
        let bootloader = vec![0x11u8; 5000];
        let app = vec![0x22u8; 3000];
        let image = assemble_flash_image(&bootloader, &table(), &app).unwrap();

        // outer header at 0, bootloader at sector 2 after an empty
        // sector, which is what the header's img_start points at
        assert_eq!(&image[..4], b"BFNP");
        assert!(image[BootHeader::SIZE..SECTOR_SIZE].iter().all(|&b| b == 0xff));
        assert!(image[SECTOR_SIZE..2 * SECTOR_SIZE].iter().all(|&b| b == 0xff));
        assert_eq!(&image[2 * SECTOR_SIZE..2 * SECTOR_SIZE + 5000], &bootloader[..]);

        // bootloader spans 2 sectors, then 2 empty, then the tables
        let pt0 = 6 * SECTOR_SIZE;
        assert_eq!(&image[pt0..pt0 + 4], b"BFPT");
        assert_eq!(&image[pt0 + SECTOR_SIZE..pt0 + SECTOR_SIZE + 4], b"BFPT");

        // app header, then the app itself
        let app_header = 8 * SECTOR_SIZE;
        assert_eq!(&image[app_header..app_header + 4], b"BFNP");
        let app_start = 9 * SECTOR_SIZE;
        assert_eq!(&image[app_start..app_start + 3000], &app[..]);
        assert_eq!(image.len(), 10 * SECTOR_SIZE);
    }

    #[test]
    fn partition_table_copies_are_identical() {
        let image = assemble_flash_image(&[0u8; 100], &table(), &[1u8; 100]).unwrap();
        let len = table().encoded_len();
        let pt0 = 5 * SECTOR_SIZE;
        let pt1 = 6 * SECTOR_SIZE;
        assert_eq!(&image[pt0..pt0 + len], &image[pt1..pt1 + len]);
    }

    #[test]
    fn headers_hash_what_is_in_the_image() {
        let bootloader = vec![0x33u8; 1000];
        let app = vec![0x44u8; 2000];
        let image = assemble_flash_image(&bootloader, &table(), &app).unwrap();

        let outer = BootHeader::from_bytes(&image[..BootHeader::SIZE]).unwrap();
        assert_eq!(outer.img_segment_info as usize, 1000 + 12);
        let boot_start = 2 * SECTOR_SIZE;
        assert!(outer.verify_payload(&image[boot_start..boot_start + 1000 + 12]));

        let app_header =
            BootHeader::from_bytes(&image[7 * SECTOR_SIZE..7 * SECTOR_SIZE + BootHeader::SIZE])
                .unwrap();
        assert_eq!(app_header.img_segment_info as usize, 2000 + 4);
        let app_start = 8 * SECTOR_SIZE;
        assert!(app_header.verify_payload(&image[app_start..app_start + 2000 + 4]));
    }
}
