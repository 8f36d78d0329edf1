//! Text form of the partition table.
//!
//! A line-oriented format: a `[pt_table]` section with table-wide
//! keys, then one `[[pt_entry]]` section per partition. `#` starts a
//! comment line, values may be double-quoted, and numbers accept
//! both decimal and `0x` hex. Hex values are not required to be
//! valid TOML, so this is parsed by hand rather than with a TOML
//! crate.

use std::fmt::Write as _;

use thiserror::Error;

use super::partition::{PartitionEntry, PartitionTable};

#[derive(Error, Debug)]
pub enum PtTextError {
    #[error("Input does not start with a [pt_table] section")]
    MissingTableSection,

    #[error("Line {line}: unknown section {section:?}")]
    UnknownSection { line: usize, section: String },

    #[error("Line {line}: unknown entry key {key:?}")]
    UnknownEntryKey { line: usize, key: String },

    #[error("Line {line}: expected key = value")]
    MalformedLine { line: usize },

    #[error("Line {line}: {value:?} is not a number")]
    BadNumber { line: usize, value: String },
}

/// Parse a decimal or `0x`-prefixed hex integer.
pub fn parse_int(value: &str) -> Option<u32> {
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

/// A parsed partition table description: the table itself plus the
/// flash locations its two copies are expected to live at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtDocument {
    pub address0: Option<u32>,
    pub address1: Option<u32>,
    pub table: PartitionTable,
}

impl PtDocument {
    pub fn new(table: PartitionTable) -> Self {
        Self {
            address0: None,
            address1: None,
            table,
        }
    }

    pub fn parse(input: &str) -> Result<Self, PtTextError> {
        let mut lines = input
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'));

        match lines.next() {
            Some((_, "[pt_table]")) => {}
            _ => return Err(PtTextError::MissingTableSection),
        }

        let mut doc = Self::new(PartitionTable::default());
        let mut current: Option<PartitionEntry> = None;

        for (line, text) in lines {
            if text.starts_with('[') {
                if text != "[[pt_entry]]" {
                    return Err(PtTextError::UnknownSection {
                        line,
                        section: text.to_string(),
                    });
                }
                if let Some(entry) = current.take() {
                    doc.table.entries.push(entry);
                }
                current = Some(PartitionEntry::default());
                continue;
            }

            let (key, value) = split_assignment(line, text)?;
            match current.as_mut() {
                Some(entry) => apply_entry_key(entry, line, key, value)?,
                None => apply_table_key(&mut doc, line, key, value)?,
            }
        }
        if let Some(entry) = current.take() {
            doc.table.entries.push(entry);
        }
        Ok(doc)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("[pt_table]\n");
        if let Some(address0) = self.address0 {
            let _ = writeln!(out, "address0 = {address0:#x}");
        }
        if let Some(address1) = self.address1 {
            let _ = writeln!(out, "address1 = {address1:#x}");
        }
        let _ = writeln!(out, "version = {}", self.table.version);
        let _ = writeln!(out, "age = {}", self.table.age);
        for entry in &self.table.entries {
            out.push('\n');
            out.push_str("[[pt_entry]]\n");
            let _ = writeln!(out, "type = {}", entry.entry_type);
            let _ = writeln!(out, "name = \"{}\"", entry.name);
            let _ = writeln!(out, "device = {}", entry.device);
            let _ = writeln!(out, "address0 = {:#x}", entry.address0);
            let _ = writeln!(out, "size0 = {:#x}", entry.size0);
            let _ = writeln!(out, "address1 = {:#x}", entry.address1);
            let _ = writeln!(out, "size1 = {:#x}", entry.size1);
            let _ = writeln!(out, "len = {}", entry.len);
            let _ = writeln!(out, "age = {}", entry.age);
            let _ = writeln!(out, "activeindex = {}", entry.active_index);
        }
        out
    }
}

fn split_assignment<'a>(line: usize, text: &'a str) -> Result<(&'a str, &'a str), PtTextError> {
    let mut parts = text.splitn(2, '=');
    let key = parts.next().unwrap_or("").trim();
    let value = parts
        .next()
        .ok_or(PtTextError::MalformedLine { line })?
        .trim()
        .trim_matches('"');
    if key.is_empty() || value.is_empty() {
        return Err(PtTextError::MalformedLine { line });
    }
    Ok((key, value))
}

fn number(line: usize, value: &str) -> Result<u32, PtTextError> {
    parse_int(value).ok_or_else(|| PtTextError::BadNumber {
        line,
        value: value.to_string(),
    })
}

/// Table-wide keys. Unrecognized keys are tolerated so annotated
/// files from other tools still parse.
fn apply_table_key(
    doc: &mut PtDocument,
    line: usize,
    key: &str,
    value: &str,
) -> Result<(), PtTextError> {
    match key {
        "address0" => doc.address0 = Some(number(line, value)?),
        "address1" => doc.address1 = Some(number(line, value)?),
        "version" => doc.table.version = number(line, value)? as u16,
        "age" => doc.table.age = number(line, value)?,
        _ => {}
    }
    Ok(())
}

fn apply_entry_key(
    entry: &mut PartitionEntry,
    line: usize,
    key: &str,
    value: &str,
) -> Result<(), PtTextError> {
    match key {
        "type" => entry.entry_type = number(line, value)? as u8,
        "device" => entry.device = number(line, value)? as u8,
        "activeindex" | "activeIndex" => entry.active_index = number(line, value)? as u8,
        "name" => entry.name = value.to_string(),
        "address0" => entry.address0 = number(line, value)?,
        "address1" => entry.address1 = number(line, value)?,
        "size0" => entry.size0 = number(line, value)?,
        "size1" => entry.size1 = number(line, value)?,
        "len" => entry.len = number(line, value)?,
        "age" => entry.age = number(line, value)?,
        _ => {
            return Err(PtTextError::UnknownEntryKey {
                line,
                key: key.to_string(),
            })
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# BL602 partition layout
[pt_table]
address0 = 0xE000
address1 = 0xF000

[[pt_entry]]
type = 0
name = "FW"
device = 0
address0 = 0x10000
size0 = 0xF0000
address1 = 0x100000
size1 = 0xF0000
len = 0

[[pt_entry]]
type = 2
name = "mfg"
address0 = 0x1F0000
size0 = 0x32000
"#;

    #[test]
    fn parses_sections_and_hex_values() {
        let doc = PtDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.address0, Some(0xe000));
        assert_eq!(doc.address1, Some(0xf000));
        assert_eq!(doc.table.entries.len(), 2);
        assert_eq!(doc.table.entries[0].name, "FW");
        assert_eq!(doc.table.entries[0].address0, 0x1_0000);
        assert_eq!(doc.table.entries[1].entry_type, 2);
        assert_eq!(doc.table.entries[1].size0, 0x3_2000);
    }

    #[test]
    fn text_roundtrip_preserves_the_table() {
        let doc = PtDocument::parse(SAMPLE).unwrap();
        let reparsed = PtDocument::parse(&doc.render()).unwrap();
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn missing_table_section_is_rejected() {
        assert!(matches!(
            PtDocument::parse("[[pt_entry]]\ntype = 0\n"),
            Err(PtTextError::MissingTableSection)
        ));
    }

    #[test]
    fn unknown_entry_key_is_rejected_with_line_number() {
        let input = "[pt_table]\n[[pt_entry]]\nbogus = 1\n";
        assert!(matches!(
            PtDocument::parse(input),
            Err(PtTextError::UnknownEntryKey { line: 3, .. })
        ));
    }

    #[test]
    fn unknown_table_key_is_ignored() {
        let input = "[pt_table]\nnote = something\n[[pt_entry]]\ntype = 1\nname = \"x\"\n";
        let doc = PtDocument::parse(input).unwrap();
        assert_eq!(doc.table.entries.len(), 1);
    }

    #[test]
    fn unknown_section_is_rejected() {
        let input = "[pt_table]\n[pt_entry]\n";
        assert!(matches!(
            PtDocument::parse(input),
            Err(PtTextError::UnknownSection { line: 2, .. })
        ));
    }

    #[test]
    fn bad_number_reports_the_value() {
        let input = "[pt_table]\naddress0 = 0xZZ\n";
        assert!(matches!(
            PtDocument::parse(input),
            Err(PtTextError::BadNumber { line: 2, .. })
        ));
    }

    #[test]
    fn parse_int_accepts_both_radixes() {
        assert_eq!(parse_int("0x10"), Some(16));
        assert_eq!(parse_int("16"), Some(16));
        assert_eq!(parse_int("banana"), None);
    }
}
