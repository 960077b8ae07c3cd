/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! The object-file data model shared by the assembler (producer) and
//! the linker (consumer), plus its text serialisation: a `#.symtab`
//! block, one `#.<section>` hex dump per section and one
//! `#.rela.<section>` relocation table per section.

use crate::errors::LinkError;
use std::io::{self, Write};

/// Column width of the symbol and relocation tables.
const WIDTH: usize = 14;

/// Bytes per hex-dump line.
const LINE_BREAK: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolEntry {
    pub name: String,
    /// Index of the defining section; 0 is the UND sentinel.
    pub section_id: usize,
    /// Offset within the defining section. The linker rewrites this to
    /// an absolute address while resolving.
    pub offset: u32,
    pub is_global: bool,
    pub is_section: bool,
}

impl SymbolEntry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            section_id: 0,
            offset: 0,
            is_global: false,
            is_section: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelocationEntry {
    /// Offset of the patched 4-byte slot within the owning section.
    pub offset: u32,
    /// Index into the owning object's symbol table.
    pub symbol_id: usize,
    pub addend: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionEntry {
    pub name: String,
    pub size: u32,
    pub bytes: Vec<u8>,
    pub relocs: Vec<RelocationEntry>,
    /// Assigned by the linker during placement.
    pub base_address: u32,
}

impl SectionEntry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            size: 0,
            bytes: Vec::new(),
            relocs: Vec::new(),
            base_address: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectFile {
    pub name: String,
    pub symbols: Vec<SymbolEntry>,
    pub sections: Vec<SectionEntry>,
}

impl ObjectFile {
    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        write_symbols(w, &self.symbols)?;
        write_sections(w, &self.sections)?;
        write_relocations(w, &self.sections)?;
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        self.write(&mut buf).expect("writing to a Vec cannot fail");
        String::from_utf8(buf).expect("object text is ASCII")
    }

    /// Parse the object text emitted by [`ObjectFile::write`]. `name`
    /// tags diagnostics with the originating file.
    pub fn parse(name: &str, text: &str) -> Result<Self, LinkError> {
        let fail = |reason: String| LinkError::FormatError {
            file: name.to_string(),
            reason,
        };

        let lines: Vec<&str> = text.lines().collect();
        let mut idx = 0;
        while idx < lines.len() && lines[idx].trim().is_empty() {
            idx += 1;
        }
        if idx >= lines.len() || lines[idx].trim() != "#.symtab" {
            return Err(fail("missing #.symtab block".to_string()));
        }
        idx += 2; // skip the "#.symtab" marker and the column header

        let mut symbols = Vec::new();
        while idx < lines.len() && !lines[idx].trim().is_empty() {
            symbols.push(parse_symbol_row(lines[idx]).map_err(&fail)?);
            idx += 1;
        }

        let mut sections = vec![SectionEntry::new("UND")];
        while idx < lines.len() {
            let line = lines[idx].trim();
            if line.is_empty() {
                idx += 1;
                continue;
            }
            if let Some(section_name) = line.strip_prefix("#.rela.") {
                idx += 2; // skip the marker and the column header
                let mut relocs = Vec::new();
                while idx < lines.len() && !lines[idx].trim().is_empty() {
                    relocs.push(parse_reloc_row(lines[idx]).map_err(&fail)?);
                    idx += 1;
                }
                let section = sections
                    .iter_mut()
                    .find(|s| s.name == section_name)
                    .ok_or_else(|| {
                        fail(format!("relocations for unknown section {section_name}"))
                    })?;
                section.relocs = relocs;
            } else if let Some(section_name) = line.strip_prefix("#.") {
                let mut entry = SectionEntry::new(section_name);
                idx += 1;
                while idx < lines.len()
                    && !lines[idx].trim().is_empty()
                    && !lines[idx].trim_start().starts_with("#.")
                {
                    for token in lines[idx].split_whitespace() {
                        let byte = u8::from_str_radix(token, 16)
                            .map_err(|_| fail(format!("bad hex byte \"{token}\"")))?;
                        entry.bytes.push(byte);
                    }
                    idx += 1;
                }
                entry.size = entry.bytes.len() as u32;
                sections.push(entry);
            } else {
                return Err(fail(format!("unexpected line \"{line}\"")));
            }
        }

        Ok(Self {
            name: name.to_string(),
            symbols,
            sections,
        })
    }
}

fn parse_symbol_row(line: &str) -> Result<SymbolEntry, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(format!("bad symbol row \"{}\"", line.trim()));
    }
    let (value, kind, bind, ndx, name) = (fields[1], fields[2], fields[3], fields[4], fields[5]);
    Ok(SymbolEntry {
        name: name.to_string(),
        section_id: if ndx == "UND" {
            0
        } else {
            ndx.parse()
                .map_err(|_| format!("bad section index \"{ndx}\""))?
        },
        offset: value
            .parse()
            .map_err(|_| format!("bad symbol value \"{value}\""))?,
        is_global: bind == "GLOB",
        is_section: kind == "SCTN",
    })
}

fn parse_reloc_row(line: &str) -> Result<RelocationEntry, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 3 {
        return Err(format!("bad relocation row \"{}\"", line.trim()));
    }
    let (offset, symbol, addend) = (fields[0], fields[1], fields[2]);
    Ok(RelocationEntry {
        offset: offset
            .parse()
            .map_err(|_| format!("bad relocation offset \"{offset}\""))?,
        symbol_id: symbol
            .parse()
            .map_err(|_| format!("bad relocation symbol \"{symbol}\""))?,
        addend: addend
            .parse()
            .map_err(|_| format!("bad relocation addend \"{addend}\""))?,
    })
}

pub fn write_symbols(w: &mut impl Write, table: &[SymbolEntry]) -> io::Result<()> {
    writeln!(w, "#.symtab")?;
    writeln!(
        w,
        "{:<WIDTH$}{:<WIDTH$}{:<WIDTH$}{:<WIDTH$}{:<WIDTH$}{:<WIDTH$}",
        "Num", "Value", "Type", "Bind", "Ndx", "Name"
    )?;
    for (i, symbol) in table.iter().enumerate() {
        let ndx = if symbol.section_id == 0 {
            "UND".to_string()
        } else {
            symbol.section_id.to_string()
        };
        writeln!(
            w,
            "{:<WIDTH$}{:<WIDTH$}{:<WIDTH$}{:<WIDTH$}{:<WIDTH$}{:<WIDTH$}",
            i,
            symbol.offset,
            if symbol.is_section { "SCTN" } else { "NOTYP" },
            if symbol.is_global { "GLOB" } else { "LOC" },
            ndx,
            symbol.name
        )?;
    }
    writeln!(w)?;
    Ok(())
}

pub fn write_sections(w: &mut impl Write, table: &[SectionEntry]) -> io::Result<()> {
    for section in table {
        if section.name.is_empty() || section.name == "UND" {
            continue;
        }
        writeln!(w, "#.{}", section.name)?;
        for (j, byte) in section.bytes.iter().enumerate() {
            write!(w, "{byte:02x} ")?;
            if (j + 1) % LINE_BREAK == 0 {
                writeln!(w)?;
            }
        }
        if section.bytes.len() % LINE_BREAK != 0 {
            writeln!(w)?;
        }
        writeln!(w)?;
    }
    Ok(())
}

pub fn write_relocations(w: &mut impl Write, table: &[SectionEntry]) -> io::Result<()> {
    for section in table {
        if section.name.is_empty() || section.name == "UND" {
            continue;
        }
        writeln!(w, "#.rela.{}", section.name)?;
        writeln!(
            w,
            "{:<WIDTH$}{:<WIDTH$}{:<WIDTH$}",
            "Offset", "Symbol", "Addend"
        )?;
        for reloc in &section.relocs {
            writeln!(
                w,
                "{:<WIDTH$}{:<WIDTH$}{:<WIDTH$}",
                reloc.offset, reloc.symbol_id, reloc.addend
            )?;
        }
        writeln!(w)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_object() -> ObjectFile {
        let mut text = SectionEntry::new("text");
        text.bytes = vec![0x91, 0x10, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00];
        text.size = 9;
        text.relocs.push(RelocationEntry {
            offset: 4,
            symbol_id: 2,
            addend: 0,
        });

        let mut und_symbol = SymbolEntry::new("UND");
        und_symbol.is_section = true;
        let mut text_symbol = SymbolEntry::new("text");
        text_symbol.is_section = true;
        text_symbol.section_id = 1;
        let mut target = SymbolEntry::new("target");
        target.section_id = 1;
        target.offset = 4;
        target.is_global = true;

        ObjectFile {
            name: "sample.o".to_string(),
            symbols: vec![und_symbol, text_symbol, target],
            sections: vec![SectionEntry::new("UND"), text],
        }
    }

    #[test]
    fn test_symtab_rows() {
        let text = sample_object().render();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("#.symtab"));
        let header = lines.next().unwrap();
        assert!(header.starts_with("Num"));
        let row: Vec<&str> = lines.next().unwrap().split_whitespace().collect();
        assert_eq!(row, vec!["0", "0", "SCTN", "LOC", "UND", "UND"]);
        let row: Vec<&str> = lines.next().unwrap().split_whitespace().collect();
        assert_eq!(row, vec!["1", "0", "SCTN", "LOC", "1", "text"]);
        let row: Vec<&str> = lines.next().unwrap().split_whitespace().collect();
        assert_eq!(row, vec!["2", "4", "NOTYP", "GLOB", "1", "target"]);
    }

    #[test]
    fn test_section_dump_breaks_lines_of_eight() {
        let text = sample_object().render();
        let dump_start = text.find("#.text").unwrap();
        let dump: Vec<&str> = text[dump_start..].lines().take(3).collect();
        assert_eq!(dump[0], "#.text");
        assert_eq!(dump[1], "91 10 00 05 00 00 00 00 ");
        assert_eq!(dump[2], "00 ");
    }

    #[test]
    fn test_parse_roundtrip() {
        let original = sample_object();
        let parsed = ObjectFile::parse("sample.o", &original.render()).unwrap();
        assert_eq!(parsed.symbols, original.symbols);
        assert_eq!(parsed.sections.len(), original.sections.len());
        assert_eq!(parsed.sections[1].name, "text");
        assert_eq!(parsed.sections[1].bytes, original.sections[1].bytes);
        assert_eq!(parsed.sections[1].size, 9);
        assert_eq!(parsed.sections[1].relocs, original.sections[1].relocs);
    }

    #[test]
    fn test_parse_rejects_missing_symtab() {
        let result = ObjectFile::parse("bad.o", "#.text\n00 00 00 00\n");
        assert!(matches!(result, Err(LinkError::FormatError { .. })));
    }

    #[test]
    fn test_parse_rejects_bad_hex() {
        let object = sample_object();
        let text = object.render().replace("91", "zz");
        let result = ObjectFile::parse("bad.o", &text);
        assert!(matches!(result, Err(LinkError::FormatError { .. })));
    }
}
