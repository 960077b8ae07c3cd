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

//! The assembler context. The front end calls one entry point per
//! directive or instruction in source order; each instruction method
//! appends 4 bytes to the current section, or a pool-expanded
//! sequence when a wide operand has to be materialised through the
//! literal pool.

use crate::ast::{AssemblyLine, Csr, Directive, Instruction, Operand, Register};
use crate::errors::AssemblyError;
use crate::isa::*;
use crate::objfile::{ObjectFile, SectionEntry, SymbolEntry};

/// The fixed fields of one instruction encoding, used to pick between
/// the inline and the pool form of a mnemonic.
#[derive(Debug, Clone, Copy)]
struct OpPattern {
    op: u8,
    mode: u8,
    a: u8,
    b: u8,
    c: u8,
}

pub struct Assembler {
    location_counter: u32,
    current_section: usize,
    finished: bool,
    symbols: Vec<SymbolEntry>,
    sections: Vec<SectionEntry>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            location_counter: 0,
            current_section: 0,
            finished: false,
            symbols: Vec::new(),
            sections: vec![SectionEntry::new("UND")],
        }
    }

    pub fn symbols(&self) -> &[SymbolEntry] {
        &self.symbols
    }

    pub fn sections(&self) -> &[SectionEntry] {
        &self.sections
    }

    pub fn into_object(self, name: &str) -> ObjectFile {
        ObjectFile {
            name: name.to_string(),
            symbols: self.symbols,
            sections: self.sections,
        }
    }

    /// Process one parsed source line: label first, then the
    /// instruction or directive sharing the line.
    pub fn apply(&mut self, line: &AssemblyLine) -> Result<(), AssemblyError> {
        if let Some(name) = &line.label {
            self.label(name)
                .map_err(|e| at_line(line.line_number, e))?;
        }
        if let Some(instruction) = &line.instruction {
            self.instruction(instruction)
                .map_err(|e| at_line(line.line_number, e))?;
        }
        if let Some(directive) = &line.directive {
            self.directive(directive)
                .map_err(|e| at_line(line.line_number, e))?;
        }
        Ok(())
    }

    fn instruction(&mut self, instruction: &Instruction) -> Result<(), AssemblyError> {
        match instruction {
            Instruction::Halt => self.halt(),
            Instruction::Int => self.int(),
            Instruction::Iret => self.iret(),
            Instruction::Ret => self.ret(),
            Instruction::Call(Operand::Literal(literal)) => self.call_literal(*literal),
            Instruction::Call(Operand::Symbol(name)) => self.call_symbol(name)?,
            Instruction::Jmp(Operand::Literal(literal)) => self.jmp_literal(*literal),
            Instruction::Jmp(Operand::Symbol(name)) => self.jmp_symbol(name)?,
            Instruction::Beq(gpr1, gpr2, Operand::Literal(literal)) => {
                self.beq_literal(*gpr1, *gpr2, *literal)
            }
            Instruction::Beq(gpr1, gpr2, Operand::Symbol(name)) => {
                self.beq_symbol(*gpr1, *gpr2, name)?
            }
            Instruction::Bne(gpr1, gpr2, Operand::Literal(literal)) => {
                self.bne_literal(*gpr1, *gpr2, *literal)
            }
            Instruction::Bne(gpr1, gpr2, Operand::Symbol(name)) => {
                self.bne_symbol(*gpr1, *gpr2, name)?
            }
            Instruction::Bgt(gpr1, gpr2, Operand::Literal(literal)) => {
                self.bgt_literal(*gpr1, *gpr2, *literal)
            }
            Instruction::Bgt(gpr1, gpr2, Operand::Symbol(name)) => {
                self.bgt_symbol(*gpr1, *gpr2, name)?
            }
            Instruction::Push(gpr) => self.push(*gpr),
            Instruction::Pop(gpr) => self.pop(*gpr),
            Instruction::Xchg(gpr1, gpr2) => self.xchg(*gpr1, *gpr2),
            Instruction::Add(src, dst) => self.add(*src, *dst),
            Instruction::Sub(src, dst) => self.sub(*src, *dst),
            Instruction::Mul(src, dst) => self.mul(*src, *dst),
            Instruction::Div(src, dst) => self.div(*src, *dst),
            Instruction::Not(gpr) => self.not(*gpr),
            Instruction::And(src, dst) => self.and(*src, *dst),
            Instruction::Or(src, dst) => self.or(*src, *dst),
            Instruction::Xor(src, dst) => self.xor(*src, *dst),
            Instruction::Shl(src, dst) => self.shl(*src, *dst),
            Instruction::Shr(src, dst) => self.shr(*src, *dst),
            Instruction::LdImm(Operand::Literal(literal), dst) => {
                self.ld_imm_literal(*literal, *dst)
            }
            Instruction::LdImm(Operand::Symbol(name), dst) => self.ld_imm_symbol(name, *dst)?,
            Instruction::LdRegDir(src, dst) => self.ld_reg_dir(*src, *dst),
            Instruction::LdRegInd(src, dst) => self.ld_reg_ind(*src, *dst),
            Instruction::LdRegIndOff(src, offset, dst) => {
                self.ld_reg_ind_off(*src, *offset, *dst)?
            }
            Instruction::LdMemDir(Operand::Literal(literal), dst) => {
                self.ld_mem_dir_literal(*literal, *dst)
            }
            Instruction::LdMemDir(Operand::Symbol(name), dst) => {
                self.ld_mem_dir_symbol(name, *dst)?
            }
            Instruction::StMemDir(src, Operand::Literal(literal)) => {
                self.st_mem_dir_literal(*src, *literal)
            }
            Instruction::StMemDir(src, Operand::Symbol(name)) => {
                self.st_mem_dir_symbol(*src, name)?
            }
            Instruction::StRegInd(src, dst) => self.st_reg_ind(*src, *dst),
            Instruction::StRegIndOff(src, dst, offset) => {
                self.st_reg_ind_off(*src, *dst, *offset)?
            }
            Instruction::Csrrd(csr, gpr) => self.csrrd(*csr, *gpr),
            Instruction::Csrwr(gpr, csr) => self.csrwr(*gpr, *csr),
        }
        Ok(())
    }

    fn directive(&mut self, directive: &Directive) -> Result<(), AssemblyError> {
        match directive {
            Directive::Global(names) => {
                for name in names {
                    self.global(name);
                }
            }
            Directive::Extern(names) => {
                for name in names {
                    self.extern_symbol(name);
                }
            }
            Directive::Section(name) => self.section(name),
            Directive::Word(words) => {
                for word in words {
                    match word {
                        Operand::Literal(literal) => self.word_literal(*literal),
                        Operand::Symbol(name) => self.word_symbol(name)?,
                    }
                }
            }
            Directive::Skip(count) => self.skip(*count),
            Directive::End => self.end(),
        }
        Ok(())
    }

    // ------------- symbol and section bookkeeping -------------

    fn symbol_id(&self, name: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s.name == name)
    }

    fn add_symbol(&mut self, name: &str) -> usize {
        self.symbols.push(SymbolEntry::new(name));
        self.symbols.len() - 1
    }

    fn add_reloc(&mut self, name: &str, offset: u32) -> Result<(), AssemblyError> {
        let symbol_id = self
            .symbol_id(name)
            .ok_or_else(|| AssemblyError::SemanticErrorNoLine {
                reason: format!("Symbol {name} is not in the table"),
            })?;
        self.sections[self.current_section]
            .relocs
            .push(crate::objfile::RelocationEntry {
                offset,
                symbol_id,
                addend: 0,
            });
        Ok(())
    }

    /// Append 4 bytes to the current section and advance the location
    /// counter.
    fn emit(&mut self, bytes: [u8; 4]) {
        self.sections[self.current_section]
            .bytes
            .extend_from_slice(&bytes);
        self.location_counter += 4;
    }

    // ------------- literal pool engine -------------

    /// An 8-byte pool expansion is about to be emitted: symbols of the
    /// current section already bound past the location counter move
    /// down by 8, and the running section size grows to match.
    fn make_room_for_pool(&mut self) {
        for symbol in &mut self.symbols {
            if symbol.section_id == self.current_section && symbol.offset > self.location_counter {
                symbol.offset += 8;
            }
        }
        self.sections[self.current_section].size += 8;
    }

    /// Emit the pool form of an instruction: the operation reading its
    /// operand pc-relative from the literal slot, a jump over the
    /// slot, then the slot itself holding `literal`.
    fn emit_pooled_literal(&mut self, pattern: OpPattern, literal: i32) {
        self.make_room_for_pool();
        self.emit(encode_word(
            pattern.op | pattern.mode,
            pattern.a,
            pattern.b,
            pattern.c,
            4,
        ));
        self.jmp_literal(4);
        self.emit((literal as u32).to_le_bytes());
    }

    /// Same layout for a symbolic operand: the slot is zero-filled and
    /// a relocation against the symbol marks it for the linker.
    fn pool_symbol(&mut self, pattern: OpPattern, name: &str) -> Result<(), AssemblyError> {
        self.make_room_for_pool();
        self.emit(encode_word(
            pattern.op | pattern.mode,
            pattern.a,
            pattern.b,
            pattern.c,
            4,
        ));
        self.jmp_literal(4);
        self.add_reloc(name, self.location_counter)?;
        self.emit([0, 0, 0, 0]);
        Ok(())
    }

    /// Choose between the inline encoding (literal fits 12 signed
    /// bits) and the pool expansion.
    fn pool_literal(&mut self, literal: i32, inline: OpPattern, pool: OpPattern) {
        if fits_in_12(literal) {
            self.emit(encode_word(
                inline.op | inline.mode,
                inline.a,
                inline.b,
                inline.c,
                to_field_12(literal),
            ));
        } else {
            self.emit_pooled_literal(pool, literal);
        }
    }

    /// Symbolic operands always pool; create the symbol on first
    /// mention so the relocation has something to reference.
    fn ensure_symbol(&mut self, name: &str) {
        if self.symbol_id(name).is_none() {
            self.add_symbol(name);
        }
    }

    // ------------- directives -------------

    pub fn global(&mut self, name: &str) {
        if self.symbol_id(name).is_none() {
            let id = self.add_symbol(name);
            self.symbols[id].is_global = true;
        }
    }

    /// `extern` and `global` are deliberately identical: both create
    /// an undefined global row; the linker tells the cases apart by
    /// whether a definition follows.
    pub fn extern_symbol(&mut self, name: &str) {
        self.global(name);
    }

    pub fn section(&mut self, name: &str) {
        if self.current_section != 0 {
            self.sections[self.current_section].size = self.location_counter;
        }
        self.location_counter = 0;
        self.current_section = self.sections.len();
        self.sections.push(SectionEntry::new(name));
    }

    pub fn word_literal(&mut self, literal: i32) {
        self.emit((literal as u32).to_le_bytes());
    }

    pub fn word_symbol(&mut self, name: &str) -> Result<(), AssemblyError> {
        self.ensure_symbol(name);
        self.add_reloc(name, self.location_counter)?;
        self.emit([0, 0, 0, 0]);
        Ok(())
    }

    pub fn skip(&mut self, count: u32) {
        let section = &mut self.sections[self.current_section];
        section.bytes.resize(section.bytes.len() + count as usize, 0);
        self.location_counter += count;
    }

    /// Commit the last section's size, then inject every section into
    /// the symbol table as a section symbol. The section rows go in
    /// front so their row index equals their section id; existing
    /// relocations shift by the number of inserted rows.
    pub fn end(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if self.current_section != 0 {
            self.sections[self.current_section].size = self.location_counter;
        }

        let added = self.sections.len();
        let mut table: Vec<SymbolEntry> = self
            .sections
            .iter()
            .enumerate()
            .map(|(id, section)| SymbolEntry {
                name: section.name.clone(),
                section_id: id,
                offset: 0,
                is_global: false,
                is_section: true,
            })
            .collect();
        table.append(&mut self.symbols);
        self.symbols = table;

        for section in &mut self.sections {
            for reloc in &mut section.relocs {
                reloc.symbol_id += added;
            }
        }

        self.location_counter = 0;
    }

    pub fn label(&mut self, name: &str) -> Result<(), AssemblyError> {
        let id = match self.symbol_id(name) {
            Some(id) if self.symbols[id].section_id != 0 => {
                return Err(AssemblyError::SemanticErrorNoLine {
                    reason: format!("Label {name} is already defined"),
                });
            }
            Some(id) => id,
            None => self.add_symbol(name),
        };
        self.symbols[id].offset = self.location_counter;
        self.symbols[id].section_id = self.current_section;
        Ok(())
    }

    // ------------- instructions -------------

    pub fn halt(&mut self) {
        self.emit(encode_word(HALT_OC, 0, 0, 0, 0));
    }

    /// Software interrupt: the emulator pushes status and pc, then
    /// vectors through the handler register.
    pub fn int(&mut self) {
        self.emit(encode_word(INT_OC, 0, 0, 0, 0));
    }

    /// pop pc; pop status; expanded as sp += 8, then two loads
    /// addressed below the moved stack pointer.
    pub fn iret(&mut self) {
        self.emit(encode_word(
            LOAD_OC | LOAD_MOD1,
            SP_REG,
            SP_REG,
            0,
            to_field_12(8),
        ));
        self.emit(encode_word(
            LOAD_OC | LOAD_MOD6,
            STATUS_REG,
            SP_REG,
            0,
            to_field_12(-4),
        ));
        self.emit(encode_word(
            LOAD_OC | LOAD_MOD2,
            PC_REG,
            SP_REG,
            0,
            to_field_12(-8),
        ));
    }

    pub fn call_literal(&mut self, literal: i32) {
        // push pc; pc <= operand;
        let no_pool = OpPattern {
            op: CALL_OC,
            mode: CALL_MOD0,
            a: 0,
            b: 0,
            c: 0,
        };
        let pool = OpPattern {
            op: CALL_OC,
            mode: CALL_MOD1,
            a: PC_REG,
            b: 0,
            c: 0,
        };
        self.pool_literal(literal, no_pool, pool);
    }

    pub fn call_symbol(&mut self, name: &str) -> Result<(), AssemblyError> {
        self.ensure_symbol(name);
        self.pool_symbol(
            OpPattern {
                op: CALL_OC,
                mode: CALL_MOD1,
                a: PC_REG,
                b: 0,
                c: 0,
            },
            name,
        )
    }

    pub fn ret(&mut self) {
        // pop pc;
        self.pop(Register::PC);
    }

    pub fn jmp_literal(&mut self, literal: i32) {
        // pc <= operand;
        let no_pool = OpPattern {
            op: JUMP_OC,
            mode: JMP_MOD0,
            a: PC_REG,
            b: 0,
            c: 0,
        };
        let pool = OpPattern {
            op: JUMP_OC,
            mode: JMP_MOD4,
            a: PC_REG,
            b: 0,
            c: 0,
        };
        self.pool_literal(literal, no_pool, pool);
    }

    pub fn jmp_symbol(&mut self, name: &str) -> Result<(), AssemblyError> {
        self.ensure_symbol(name);
        self.pool_symbol(
            OpPattern {
                op: JUMP_OC,
                mode: JMP_MOD4,
                a: PC_REG,
                b: 0,
                c: 0,
            },
            name,
        )
    }

    pub fn beq_literal(&mut self, gpr1: Register, gpr2: Register, literal: i32) {
        // if (gpr1 == gpr2) pc <= operand;
        self.branch_literal(JMP_MOD1, JMP_MOD5, gpr1, gpr2, literal);
    }

    pub fn beq_symbol(
        &mut self,
        gpr1: Register,
        gpr2: Register,
        name: &str,
    ) -> Result<(), AssemblyError> {
        self.branch_symbol(JMP_MOD5, gpr1, gpr2, name)
    }

    pub fn bne_literal(&mut self, gpr1: Register, gpr2: Register, literal: i32) {
        // if (gpr1 != gpr2) pc <= operand;
        self.branch_literal(JMP_MOD2, JMP_MOD6, gpr1, gpr2, literal);
    }

    pub fn bne_symbol(
        &mut self,
        gpr1: Register,
        gpr2: Register,
        name: &str,
    ) -> Result<(), AssemblyError> {
        self.branch_symbol(JMP_MOD6, gpr1, gpr2, name)
    }

    pub fn bgt_literal(&mut self, gpr1: Register, gpr2: Register, literal: i32) {
        // if (gpr1 signed> gpr2) pc <= operand;
        self.branch_literal(JMP_MOD3, JMP_MOD7, gpr1, gpr2, literal);
    }

    pub fn bgt_symbol(
        &mut self,
        gpr1: Register,
        gpr2: Register,
        name: &str,
    ) -> Result<(), AssemblyError> {
        self.branch_symbol(JMP_MOD7, gpr1, gpr2, name)
    }

    fn branch_literal(
        &mut self,
        inline_mode: u8,
        pool_mode: u8,
        gpr1: Register,
        gpr2: Register,
        literal: i32,
    ) {
        let no_pool = OpPattern {
            op: JUMP_OC,
            mode: inline_mode,
            a: 0,
            b: gpr1.index(),
            c: gpr2.index(),
        };
        let pool = OpPattern {
            op: JUMP_OC,
            mode: pool_mode,
            a: PC_REG,
            b: gpr1.index(),
            c: gpr2.index(),
        };
        self.pool_literal(literal, no_pool, pool);
    }

    fn branch_symbol(
        &mut self,
        pool_mode: u8,
        gpr1: Register,
        gpr2: Register,
        name: &str,
    ) -> Result<(), AssemblyError> {
        self.ensure_symbol(name);
        self.pool_symbol(
            OpPattern {
                op: JUMP_OC,
                mode: pool_mode,
                a: PC_REG,
                b: gpr1.index(),
                c: gpr2.index(),
            },
            name,
        )
    }

    pub fn push(&mut self, gpr: Register) {
        // sp <= sp - 4; mem32[sp] <= gpr;
        self.emit(encode_word(
            STORE_OC | STORE_MOD2,
            SP_REG,
            0,
            gpr.index(),
            to_field_12(-4),
        ));
    }

    pub fn pop(&mut self, gpr: Register) {
        // gpr <= mem32[sp]; sp <= sp + 4;
        self.emit(encode_word(
            LOAD_OC | LOAD_MOD3,
            gpr.index(),
            SP_REG,
            0,
            to_field_12(4),
        ));
    }

    pub fn xchg(&mut self, gpr1: Register, gpr2: Register) {
        self.emit(encode_word(XCHG_OC, 0, gpr1.index(), gpr2.index(), 0));
    }

    pub fn add(&mut self, src: Register, dst: Register) {
        self.arithmetic(ADD_MOD, src, dst);
    }

    pub fn sub(&mut self, src: Register, dst: Register) {
        self.arithmetic(SUB_MOD, src, dst);
    }

    pub fn mul(&mut self, src: Register, dst: Register) {
        self.arithmetic(MUL_MOD, src, dst);
    }

    pub fn div(&mut self, src: Register, dst: Register) {
        self.arithmetic(DIV_MOD, src, dst);
    }

    // gprD <= gprD <op> gprS;
    fn arithmetic(&mut self, mode: u8, src: Register, dst: Register) {
        self.emit(encode_word(
            ARIT_OC | mode,
            dst.index(),
            dst.index(),
            src.index(),
            0,
        ));
    }

    pub fn not(&mut self, gpr: Register) {
        // gpr <= ~gpr;
        self.emit(encode_word(
            LOGIC_OC | NOT_MOD,
            gpr.index(),
            gpr.index(),
            0,
            0,
        ));
    }

    pub fn and(&mut self, src: Register, dst: Register) {
        self.logic(AND_MOD, src, dst);
    }

    pub fn or(&mut self, src: Register, dst: Register) {
        self.logic(OR_MOD, src, dst);
    }

    pub fn xor(&mut self, src: Register, dst: Register) {
        self.logic(XOR_MOD, src, dst);
    }

    fn logic(&mut self, mode: u8, src: Register, dst: Register) {
        self.emit(encode_word(
            LOGIC_OC | mode,
            dst.index(),
            dst.index(),
            src.index(),
            0,
        ));
    }

    pub fn shl(&mut self, src: Register, dst: Register) {
        self.emit(encode_word(
            SHIFT_OC | SHL_MOD,
            dst.index(),
            dst.index(),
            src.index(),
            0,
        ));
    }

    pub fn shr(&mut self, src: Register, dst: Register) {
        self.emit(encode_word(
            SHIFT_OC | SHR_MOD,
            dst.index(),
            dst.index(),
            src.index(),
            0,
        ));
    }

    pub fn ld_imm_literal(&mut self, literal: i32, dst: Register) {
        // gprD <= literal;
        let no_pool = OpPattern {
            op: LOAD_OC,
            mode: LOAD_MOD1,
            a: dst.index(),
            b: 0,
            c: 0,
        };
        let pool = OpPattern {
            op: LOAD_OC,
            mode: LOAD_MOD2,
            a: dst.index(),
            b: 0,
            c: PC_REG,
        };
        self.pool_literal(literal, no_pool, pool);
    }

    pub fn ld_imm_symbol(&mut self, name: &str, dst: Register) -> Result<(), AssemblyError> {
        self.ensure_symbol(name);
        self.pool_symbol(
            OpPattern {
                op: LOAD_OC,
                mode: LOAD_MOD2,
                a: dst.index(),
                b: 0,
                c: PC_REG,
            },
            name,
        )
    }

    pub fn ld_reg_dir(&mut self, src: Register, dst: Register) {
        // gprD <= gprS;
        self.emit(encode_word(
            LOAD_OC | LOAD_MOD1,
            dst.index(),
            src.index(),
            0,
            0,
        ));
    }

    pub fn ld_reg_ind(&mut self, src: Register, dst: Register) {
        // gprD <= mem32[gprS];
        self.emit(encode_word(
            LOAD_OC | LOAD_MOD2,
            dst.index(),
            src.index(),
            0,
            0,
        ));
    }

    pub fn ld_reg_ind_off(
        &mut self,
        src: Register,
        offset: i32,
        dst: Register,
    ) -> Result<(), AssemblyError> {
        // gprD <= mem32[gprS + offset]; the offset never pools.
        if !fits_in_12(offset) {
            return Err(AssemblyError::SemanticErrorNoLine {
                reason: "Literal can't fit into 12 bits".to_string(),
            });
        }
        self.emit(encode_word(
            LOAD_OC | LOAD_MOD2,
            dst.index(),
            src.index(),
            0,
            to_field_12(offset),
        ));
        Ok(())
    }

    pub fn ld_mem_dir_literal(&mut self, literal: i32, dst: Register) {
        // gprD <= mem32[literal];
        if fits_in_12(literal) {
            self.emit(encode_word(
                LOAD_OC | LOAD_MOD2,
                dst.index(),
                0,
                0,
                to_field_12(literal),
            ));
        } else {
            // The pool slot holds the address; load it, then
            // dereference through the same register.
            self.emit_pooled_literal(
                OpPattern {
                    op: LOAD_OC,
                    mode: LOAD_MOD2,
                    a: dst.index(),
                    b: PC_REG,
                    c: 0,
                },
                literal,
            );
            self.ld_reg_ind(dst, dst);
        }
    }

    pub fn ld_mem_dir_symbol(&mut self, name: &str, dst: Register) -> Result<(), AssemblyError> {
        self.ensure_symbol(name);
        self.pool_symbol(
            OpPattern {
                op: LOAD_OC,
                mode: LOAD_MOD2,
                a: dst.index(),
                b: PC_REG,
                c: 0,
            },
            name,
        )?;
        self.ld_reg_ind(dst, dst);
        Ok(())
    }

    pub fn st_mem_dir_literal(&mut self, src: Register, literal: i32) {
        // mem32[literal] <= gprS;
        let no_pool = OpPattern {
            op: STORE_OC,
            mode: STORE_MOD0,
            a: 0,
            b: 0,
            c: src.index(),
        };
        let pool = OpPattern {
            op: STORE_OC,
            mode: STORE_MOD1,
            a: PC_REG,
            b: 0,
            c: src.index(),
        };
        self.pool_literal(literal, no_pool, pool);
    }

    pub fn st_mem_dir_symbol(&mut self, src: Register, name: &str) -> Result<(), AssemblyError> {
        self.ensure_symbol(name);
        self.pool_symbol(
            OpPattern {
                op: STORE_OC,
                mode: STORE_MOD1,
                a: PC_REG,
                b: 0,
                c: src.index(),
            },
            name,
        )
    }

    pub fn st_reg_ind(&mut self, src: Register, dst: Register) {
        // mem32[gprD] <= gprS;
        self.emit(encode_word(
            STORE_OC | STORE_MOD0,
            0,
            dst.index(),
            src.index(),
            0,
        ));
    }

    pub fn st_reg_ind_off(
        &mut self,
        src: Register,
        dst: Register,
        offset: i32,
    ) -> Result<(), AssemblyError> {
        // mem32[gprD + offset] <= gprS; the offset never pools.
        if !fits_in_12(offset) {
            return Err(AssemblyError::SemanticErrorNoLine {
                reason: "Literal can't fit into 12 bits".to_string(),
            });
        }
        self.emit(encode_word(
            STORE_OC | STORE_MOD0,
            0,
            dst.index(),
            src.index(),
            to_field_12(offset),
        ));
        Ok(())
    }

    pub fn csrrd(&mut self, src: Csr, dst: Register) {
        // gpr <= csr;
        self.emit(encode_word(
            LOAD_OC | LOAD_MOD0,
            dst.index(),
            src.index(),
            0,
            0,
        ));
    }

    pub fn csrwr(&mut self, src: Register, dst: Csr) {
        // csr <= gpr;
        self.emit(encode_word(
            LOAD_OC | LOAD_MOD4,
            dst.index(),
            src.index(),
            0,
            0,
        ));
    }
}

fn at_line(line: usize, error: AssemblyError) -> AssemblyError {
    match error {
        AssemblyError::SemanticErrorNoLine { reason } => {
            AssemblyError::SemanticError { line, reason }
        }
        other => other,
    }
}
