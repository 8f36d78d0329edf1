//! Partition table codec (`BFPT`).
//!
//! A 16-byte header (magic, version, entry count, age, CRC32 over the
//! first 12 bytes) followed by 36-byte entries and a CRC32 over the
//! raw entry bytes. Names are ASCII, NUL-padded to 9 bytes.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{check_crc, check_len, check_magic, crc32, ImageError};

const HEADER: &str = "partition table header";
const ENTRIES: &str = "partition table entries";

const NAME_LEN: usize = 9;

/// One slot in the partition table. `address0`/`size0` describe the
/// primary copy, `address1`/`size1` the alternate used for A/B
/// updates; `active_index` picks between them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartitionEntry {
    pub entry_type: u8,
    pub device: u8,
    pub active_index: u8,
    pub name: String,
    pub address0: u32,
    pub address1: u32,
    pub size0: u32,
    pub size1: u32,
    pub len: u32,
    pub age: u32,
}

impl PartitionEntry {
    /// Encoded entry size.
    pub const SIZE: usize = 36;

    fn encoded_name(&self) -> Result<[u8; NAME_LEN], ImageError> {
        if !self.name.is_ascii() {
            return Err(ImageError::NameNotAscii(self.name.clone()));
        }
        if self.name.len() > NAME_LEN {
            return Err(ImageError::NameTooLong(self.name.clone()));
        }
        let mut padded = [0u8; NAME_LEN];
        padded[..self.name.len()].copy_from_slice(self.name.as_bytes());
        Ok(padded)
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), ImageError> {
        let name = self.encoded_name()?;
        buf.write_u8(self.entry_type).unwrap();
        buf.write_u8(self.device).unwrap();
        buf.write_u8(self.active_index).unwrap();
        buf.extend_from_slice(&name);
        buf.write_u32::<LittleEndian>(self.address0).unwrap();
        buf.write_u32::<LittleEndian>(self.address1).unwrap();
        buf.write_u32::<LittleEndian>(self.size0).unwrap();
        buf.write_u32::<LittleEndian>(self.size1).unwrap();
        buf.write_u32::<LittleEndian>(self.len).unwrap();
        buf.write_u32::<LittleEndian>(self.age).unwrap();
        Ok(())
    }

    fn read_from(cursor: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        let entry_type = cursor.read_u8()?;
        let device = cursor.read_u8()?;
        let active_index = cursor.read_u8()?;
        let mut name = [0u8; NAME_LEN];
        std::io::Read::read_exact(cursor, &mut name)?;
        let end = name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        Ok(Self {
            entry_type,
            device,
            active_index,
            name: String::from_utf8_lossy(&name[..end]).into_owned(),
            address0: cursor.read_u32::<LittleEndian>()?,
            address1: cursor.read_u32::<LittleEndian>()?,
            size0: cursor.read_u32::<LittleEndian>()?,
            size1: cursor.read_u32::<LittleEndian>()?,
            len: cursor.read_u32::<LittleEndian>()?,
            age: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartitionTable {
    pub version: u16,
    pub age: u32,
    pub entries: Vec<PartitionEntry>,
}

impl PartitionTable {
    pub const MAGIC: [u8; 4] = *b"BFPT";
    /// Fixed header size, entries follow.
    pub const HEADER_SIZE: usize = 16;

    pub fn to_bytes(&self) -> Result<Vec<u8>, ImageError> {
        let mut buf =
            Vec::with_capacity(Self::HEADER_SIZE + self.entries.len() * PartitionEntry::SIZE + 4);
        buf.extend_from_slice(&Self::MAGIC);
        buf.write_u16::<LittleEndian>(self.version).unwrap();
        buf.write_u16::<LittleEndian>(self.entries.len() as u16).unwrap();
        buf.write_u32::<LittleEndian>(self.age).unwrap();
        let header_crc = crc32(&buf[..12]);
        buf.write_u32::<LittleEndian>(header_crc).unwrap();

        let mut body = Vec::with_capacity(self.entries.len() * PartitionEntry::SIZE);
        for entry in &self.entries {
            entry.write_to(&mut body)?;
        }
        let body_crc = crc32(&body);
        buf.extend_from_slice(&body);
        buf.write_u32::<LittleEndian>(body_crc).unwrap();
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ImageError> {
        check_len(HEADER, Self::HEADER_SIZE, data)?;
        check_magic(HEADER, Self::MAGIC, data)?;
        let mut cursor = Cursor::new(&data[4..Self::HEADER_SIZE]);
        let version = cursor.read_u16::<LittleEndian>()?;
        let count = usize::from(cursor.read_u16::<LittleEndian>()?);
        let age = cursor.read_u32::<LittleEndian>()?;
        let stored = cursor.read_u32::<LittleEndian>()?;
        check_crc(HEADER, stored, crc32(&data[..12]))?;

        let body_end = Self::HEADER_SIZE + count * PartitionEntry::SIZE;
        check_len(ENTRIES, body_end + 4, data)?;
        let body = &data[Self::HEADER_SIZE..body_end];
        let mut trailer = Cursor::new(&data[body_end..body_end + 4]);
        let stored = trailer.read_u32::<LittleEndian>()?;
        check_crc(ENTRIES, stored, crc32(body))?;

        let mut entries = Vec::with_capacity(count);
        let mut cursor = Cursor::new(body);
        for _ in 0..count {
            entries.push(PartitionEntry::read_from(&mut cursor)?);
        }
        Ok(Self {
            version,
            age,
            entries,
        })
    }

    /// Encoded size for the current entry count.
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE + self.entries.len() * PartitionEntry::SIZE + 4
    }
}
