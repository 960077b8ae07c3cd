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

//! The linker: ordered section placement with operator-pinned bases,
//! cross-file symbol resolution, in-place relocation patching and
//! hex-image emission.

use crate::errors::LinkError;
use crate::objfile::{self, ObjectFile};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{self, Write};

/// Column width of the placement report table.
const WIDTH: usize = 14;

/// One `-place=<section>@<hex-base>` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionPlace {
    pub section_name: String,
    pub base_address: u32,
}

impl SectionPlace {
    /// Parse the `<section>@<hex-base>` payload of a placement flag.
    pub fn parse(text: &str) -> Result<Self, LinkError> {
        let (name, base) = text.split_once('@').ok_or_else(|| LinkError::PlacementError {
            reason: format!("\"{text}\" must have the form <section>@<hex-base>"),
        })?;
        let base = base.strip_prefix("0x").unwrap_or(base);
        let base_address =
            u32::from_str_radix(base, 16).map_err(|_| LinkError::PlacementError {
                reason: format!("bad base address \"{base}\" in \"{text}\""),
            })?;
        Ok(Self {
            section_name: name.to_string(),
            base_address,
        })
    }
}

/// A placed run of like-named sections concatenated across the input
/// files, at its assigned base address.
#[derive(Debug, Clone)]
pub struct PlacedBlock {
    pub section_name: String,
    pub base_address: u32,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct Linker {
    files: Vec<ObjectFile>,
    memory: Vec<PlacedBlock>,
    processed: HashSet<String>,
    resolved: bool,
}

impl Linker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&mut self, object: ObjectFile) {
        self.files.push(object);
    }

    pub fn files(&self) -> &[ObjectFile] {
        &self.files
    }

    pub fn memory(&self) -> &[PlacedBlock] {
        &self.memory
    }

    /// Lay out every section. Pinned sections go first in ascending
    /// base order, each concatenating its like-named contributions
    /// across files in input order; the rest follow the last pinned
    /// block in first-appearance order.
    pub fn place_sections(&mut self, places: &[SectionPlace]) -> Result<(), LinkError> {
        let mut places = places.to_vec();
        places.sort_by_key(|p| p.base_address);

        for place in &places {
            self.place_one(&place.section_name, place.base_address);
        }

        // A pinned block running into the next pinned base is fatal.
        for pair in self.memory.windows(2) {
            let end = pair[0].base_address as u64 + pair[0].bytes.len() as u64;
            if end >= pair[1].base_address as u64 {
                return Err(LinkError::PlacementError {
                    reason: format!(
                        "sections \"{}\" and \"{}\" are overlapping",
                        pair[0].section_name, pair[1].section_name
                    ),
                });
            }
        }

        // Remaining sections start where the last pinned block ends.
        let mut next_base = self
            .memory
            .last()
            .map(|block| block.base_address + block.bytes.len() as u32)
            .unwrap_or(0);

        let mut remaining: Vec<String> = Vec::new();
        for object in &self.files {
            for section in &object.sections {
                if section.name == "UND"
                    || self.processed.contains(&section.name)
                    || remaining.contains(&section.name)
                {
                    continue;
                }
                remaining.push(section.name.clone());
            }
        }
        for name in remaining {
            next_base = self.place_one(&name, next_base);
        }

        Ok(())
    }

    /// Concatenate every file's copy of `name` starting at `base`,
    /// recording each contribution's base in the owning file's
    /// section table. Returns the end address of the block.
    fn place_one(&mut self, name: &str, base: u32) -> u32 {
        let mut block = PlacedBlock {
            section_name: name.to_string(),
            base_address: base,
            bytes: Vec::new(),
        };
        let mut cursor = base;
        for object in &mut self.files {
            if let Some(section) = object.sections.iter_mut().find(|s| s.name == name) {
                section.base_address = cursor;
                cursor += section.size;
                block.bytes.extend_from_slice(&section.bytes);
            }
        }
        self.processed.insert(name.to_string());
        self.memory.push(block);
        cursor
    }

    /// Two passes over every symbol table: first rebase internally
    /// defined symbols to absolute addresses, then copy each extern's
    /// value from whichever file defines it as a global. An extern
    /// nobody defines is fatal. Rebasing happens at most once, so a
    /// repeated call leaves the offsets untouched.
    pub fn resolve_symbols(&mut self) -> Result<(), LinkError> {
        if self.resolved {
            return Ok(());
        }
        self.resolved = true;

        for object in &mut self.files {
            for i in 1..object.symbols.len() {
                let section_id = object.symbols[i].section_id;
                if section_id == 0 {
                    continue;
                }
                let Some(section) = object.sections.get(section_id) else {
                    return Err(LinkError::FormatError {
                        file: object.name.clone(),
                        reason: format!(
                            "symbol {} references missing section {section_id}",
                            object.symbols[i].name
                        ),
                    });
                };
                object.symbols[i].offset += section.base_address;
            }
        }

        let mut definitions: HashMap<String, u32> = HashMap::new();
        for object in &self.files {
            for symbol in &object.symbols {
                if symbol.is_global && symbol.section_id != 0 {
                    definitions.insert(symbol.name.clone(), symbol.offset);
                }
            }
        }

        for object in &mut self.files {
            for symbol in object.symbols.iter_mut().skip(1) {
                if symbol.section_id == 0 {
                    match definitions.get(&symbol.name) {
                        Some(address) => symbol.offset = *address,
                        None => {
                            return Err(LinkError::SymbolError {
                                reason: format!(
                                    "extern symbol {} is not defined as global anywhere",
                                    symbol.name
                                ),
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Patch every relocated 4-byte slot with the resolved symbol
    /// value, little-endian, inside the placed block that carries the
    /// owning section.
    pub fn apply_relocations(&mut self) -> Result<(), LinkError> {
        let Linker { files, memory, .. } = self;
        for object in files.iter() {
            for section in &object.sections {
                let Some(block) = memory
                    .iter_mut()
                    .find(|block| block.section_name == section.name)
                else {
                    continue;
                };
                for reloc in &section.relocs {
                    let symbol = object.symbols.get(reloc.symbol_id).ok_or_else(|| {
                        LinkError::SymbolError {
                            reason: format!(
                                "relocation in {} references missing symbol {}",
                                section.name, reloc.symbol_id
                            ),
                        }
                    })?;
                    let value = (symbol.offset as i64).wrapping_add(reloc.addend as i64) as u32;
                    let offset =
                        (section.base_address + reloc.offset - block.base_address) as usize;
                    let slot =
                        block
                            .bytes
                            .get_mut(offset..offset + 4)
                            .ok_or_else(|| LinkError::FormatError {
                                file: object.name.clone(),
                                reason: format!(
                                    "relocation offset {} outside section {}",
                                    reloc.offset, section.name
                                ),
                            })?;
                    slot.copy_from_slice(&value.to_le_bytes());
                }
            }
        }
        Ok(())
    }

    /// Emit the memory image: one line per 8-byte-aligned group,
    /// `AAAA: BB BB BB BB BB BB BB BB`. Bytes no block covers print
    /// as zero, which both pads a short block's final line and knits
    /// adjacent blocks sharing a line together.
    pub fn write_image(&self, w: &mut impl Write) -> io::Result<()> {
        let mut lines: BTreeMap<u32, [u8; 8]> = BTreeMap::new();
        for block in &self.memory {
            for (i, byte) in block.bytes.iter().enumerate() {
                let address = block.base_address + i as u32;
                lines.entry(address & !7).or_insert([0; 8])[(address & 7) as usize] = *byte;
            }
        }
        for (base, bytes) in &lines {
            write!(w, "{base:04x}:")?;
            for byte in bytes {
                write!(w, " {byte:02x}")?;
            }
            writeln!(w)?;
        }
        Ok(())
    }

    pub fn render_image(&self) -> String {
        let mut buf = Vec::new();
        self.write_image(&mut buf).expect("writing to a Vec cannot fail");
        String::from_utf8(buf).expect("image text is ASCII")
    }

    /// The human-readable companion report: the placement table plus
    /// every input file's (now rebased) tables.
    pub fn write_report(&self, w: &mut impl Write) -> io::Result<()> {
        writeln!(w, "#.LinkerMemory")?;
        writeln!(w, "{:<WIDTH$}{:<WIDTH$}{:<WIDTH$}", "Section", "Base", "Size")?;
        for block in &self.memory {
            writeln!(
                w,
                "{:<WIDTH$}{:<WIDTH$}{:<WIDTH$}",
                block.section_name,
                block.base_address,
                block.bytes.len()
            )?;
        }
        writeln!(w)?;
        for object in &self.files {
            writeln!(
                w,
                "---------------------------------- {} ----------------------------------",
                object.name
            )?;
            objfile::write_symbols(w, &object.symbols)?;
            objfile::write_sections(w, &object.sections)?;
            objfile::write_relocations(w, &object.sections)?;
        }
        Ok(())
    }
}

/// Run the whole pipeline over already-parsed objects.
pub fn link(objects: Vec<ObjectFile>, places: &[SectionPlace]) -> Result<Linker, LinkError> {
    let mut linker = Linker::new();
    for object in objects {
        linker.add_object(object);
    }
    linker.place_sections(places)?;
    linker.resolve_symbols()?;
    linker.apply_relocations()?;
    Ok(linker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objfile::{RelocationEntry, SectionEntry, SymbolEntry};

    fn object_with_section(file: &str, section: &str, bytes: Vec<u8>) -> ObjectFile {
        let mut und_symbol = SymbolEntry::new("UND");
        und_symbol.is_section = true;
        let mut section_symbol = SymbolEntry::new(section);
        section_symbol.is_section = true;
        section_symbol.section_id = 1;

        let mut entry = SectionEntry::new(section);
        entry.size = bytes.len() as u32;
        entry.bytes = bytes;

        ObjectFile {
            name: file.to_string(),
            symbols: vec![und_symbol, section_symbol],
            sections: vec![SectionEntry::new("UND"), entry],
        }
    }

    fn place(name: &str, base: u32) -> SectionPlace {
        SectionPlace {
            section_name: name.to_string(),
            base_address: base,
        }
    }

    #[test]
    fn test_parse_place_flag() {
        let place = SectionPlace::parse("text@0x40000000").unwrap();
        assert_eq!(place.section_name, "text");
        assert_eq!(place.base_address, 0x4000_0000);
        assert!(SectionPlace::parse("no_base").is_err());
        assert!(SectionPlace::parse("text@zz").is_err());
    }

    #[test]
    fn test_like_named_sections_concatenate_in_input_order() {
        let a = object_with_section("a.o", "text", vec![1, 2, 3, 4]);
        let b = object_with_section("b.o", "text", vec![5, 6, 7, 8]);
        let linker = link(vec![a, b], &[place("text", 0x1000)]).unwrap();

        assert_eq!(linker.memory().len(), 1);
        assert_eq!(linker.memory()[0].base_address, 0x1000);
        assert_eq!(linker.memory()[0].bytes, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        // the second file's copy starts where the first ends
        assert_eq!(linker.files()[0].sections[1].base_address, 0x1000);
        assert_eq!(linker.files()[1].sections[1].base_address, 0x1004);
    }

    #[test]
    fn test_placements_sort_by_base_address() {
        let a = object_with_section("a.o", "hi", vec![1, 1]);
        let b = object_with_section("b.o", "lo", vec![2, 2]);
        let linker = link(vec![a, b], &[place("hi", 0x2000), place("lo", 0x1000)]).unwrap();
        assert_eq!(linker.memory()[0].section_name, "lo");
        assert_eq!(linker.memory()[1].section_name, "hi");
    }

    #[test]
    fn test_unpinned_sections_follow_last_pinned_block() {
        let mut a = object_with_section("a.o", "text", vec![0; 8]);
        let mut data_symbol = SymbolEntry::new("data");
        data_symbol.is_section = true;
        data_symbol.section_id = 2;
        a.symbols.push(data_symbol);
        let mut data = SectionEntry::new("data");
        data.size = 4;
        data.bytes = vec![9, 9, 9, 9];
        a.sections.push(data);

        let linker = link(vec![a], &[place("text", 0x1000)]).unwrap();
        assert_eq!(linker.memory()[1].section_name, "data");
        assert_eq!(linker.memory()[1].base_address, 0x1008);
    }

    #[test]
    fn test_no_placements_start_at_zero() {
        let a = object_with_section("a.o", "text", vec![1, 2, 3, 4]);
        let linker = link(vec![a], &[]).unwrap();
        assert_eq!(linker.memory()[0].base_address, 0);
    }

    #[test]
    fn test_overlap_is_fatal() {
        let a = object_with_section("a.o", "a", vec![0; 16]);
        let b = object_with_section("b.o", "b", vec![0; 4]);
        let result = link(vec![a, b], &[place("a", 0x1000), place("b", 0x1008)]);
        assert!(matches!(result, Err(LinkError::PlacementError { .. })));
    }

    #[test]
    fn test_touching_blocks_are_also_fatal() {
        let a = object_with_section("a.o", "a", vec![0; 8]);
        let b = object_with_section("b.o", "b", vec![0; 8]);
        let result = link(vec![a, b], &[place("a", 0x1000), place("b", 0x1008)]);
        assert!(matches!(result, Err(LinkError::PlacementError { .. })));
    }

    #[test]
    fn test_resolution_rebases_and_copies_externs() {
        // a.o defines global x at offset 4 of data
        let mut a = object_with_section("a.o", "data", vec![0; 8]);
        let mut x = SymbolEntry::new("x");
        x.section_id = 1;
        x.offset = 4;
        x.is_global = true;
        a.symbols.push(x);

        // b.o refers to x as an extern
        let mut b = object_with_section("b.o", "text", vec![0; 4]);
        let mut x_ref = SymbolEntry::new("x");
        x_ref.is_global = true;
        b.symbols.push(x_ref);

        let linker = link(
            vec![a, b],
            &[place("data", 0x1000), place("text", 0x2000)],
        )
        .unwrap();

        let a_x = linker.files()[0]
            .symbols
            .iter()
            .find(|s| s.name == "x")
            .unwrap();
        assert_eq!(a_x.offset, 0x1004);
        let b_x = linker.files()[1]
            .symbols
            .iter()
            .find(|s| s.name == "x")
            .unwrap();
        assert_eq!(b_x.offset, 0x1004);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut a = object_with_section("a.o", "data", vec![0; 8]);
        let mut x = SymbolEntry::new("x");
        x.section_id = 1;
        x.offset = 4;
        x.is_global = true;
        a.symbols.push(x);

        let mut linker = link(vec![a], &[place("data", 0x1000)]).unwrap();
        let first: Vec<u32> = linker.files()[0].symbols.iter().map(|s| s.offset).collect();
        linker.resolve_symbols().unwrap();
        let second: Vec<u32> = linker.files()[0].symbols.iter().map(|s| s.offset).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_undefined_extern_is_fatal() {
        let mut a = object_with_section("a.o", "text", vec![0; 4]);
        let mut missing = SymbolEntry::new("missing");
        missing.is_global = true;
        a.symbols.push(missing);

        let result = link(vec![a], &[place("text", 0x1000)]);
        assert!(matches!(result, Err(LinkError::SymbolError { .. })));
    }

    #[test]
    fn test_extern_resolving_to_address_zero_is_defined() {
        // a section placed at 0 makes a perfectly valid symbol value 0
        let mut a = object_with_section("a.o", "data", vec![0; 4]);
        let mut x = SymbolEntry::new("x");
        x.section_id = 1;
        x.offset = 0;
        x.is_global = true;
        a.symbols.push(x);

        let mut b = object_with_section("b.o", "text", vec![0; 4]);
        let mut x_ref = SymbolEntry::new("x");
        x_ref.is_global = true;
        b.symbols.push(x_ref);

        let linker = link(vec![a, b], &[place("data", 0x0), place("text", 0x2000)]).unwrap();
        let b_x = linker.files()[1]
            .symbols
            .iter()
            .find(|s| s.name == "x")
            .unwrap();
        assert_eq!(b_x.offset, 0);
    }

    #[test]
    fn test_relocation_patches_placed_bytes() {
        let mut a = object_with_section("a.o", "text", vec![0; 8]);
        let mut target = SymbolEntry::new("target");
        target.section_id = 1;
        target.offset = 4;
        a.symbols.push(target);
        a.sections[1].relocs.push(RelocationEntry {
            offset: 0,
            symbol_id: 2,
            addend: 0,
        });

        let linker = link(vec![a], &[place("text", 0x1000)]).unwrap();
        assert_eq!(&linker.memory()[0].bytes[0..4], &[0x04, 0x10, 0x00, 0x00]);
    }

    #[test]
    fn test_image_pads_short_lines_with_zeroes() {
        let a = object_with_section("a.o", "a", vec![0xAA; 6]);
        let b = object_with_section("b.o", "b", vec![0xBB; 2]);
        let linker = link(vec![a, b], &[place("a", 0x1000), place("b", 0x2000)]).unwrap();
        let image = linker.render_image();
        let lines: Vec<&str> = image.lines().collect();
        assert_eq!(lines[0], "1000: aa aa aa aa aa aa 00 00");
        assert_eq!(lines[1], "2000: bb bb 00 00 00 00 00 00");
    }

    #[test]
    fn test_image_knits_adjacent_blocks_into_one_line() {
        let a = object_with_section("a.o", "a", vec![0xAA; 4]);
        let mut b = object_with_section("b.o", "b", vec![0xBB; 4]);
        b.sections[1].size = 4;
        let linker = link(vec![a, b], &[place("a", 0x1000)]).unwrap();
        // "b" is unpinned and lands right after "a" at 0x1004
        let image = linker.render_image();
        assert_eq!(image.lines().next(), Some("1000: aa aa aa aa bb bb bb bb"));
    }
}
