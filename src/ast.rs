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

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Register {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl Register {
    /// `%sp` is an alias for r14.
    pub const SP: Register = Register::R14;
    /// `%pc` is an alias for r15.
    pub const PC: Register = Register::R15;

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Register> {
        use Register::*;
        const ALL: [Register; 16] = [
            R0, R1, R2, R3, R4, R5, R6, R7, R8, R9, R10, R11, R12, R13, R14, R15,
        ];
        ALL.get(index as usize).copied()
    }
}

// The three control/status registers.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Csr {
    Status,
    Handler,
    Cause,
}

impl Csr {
    pub fn index(self) -> u8 {
        self as u8
    }
}

// A jump target, word initialiser or wide-load operand: either a
// plain integer literal or a symbol resolved later.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(i32),
    Symbol(String),
}

// One mnemonic with its parsed operands. Arithmetic, logic and shift
// instructions follow the `op %rS, %rD` source order.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Halt,
    Int,
    Iret,
    Ret,

    Call(Operand),
    Jmp(Operand),
    Beq(Register, Register, Operand),
    Bne(Register, Register, Operand),
    Bgt(Register, Register, Operand),

    Push(Register),
    Pop(Register),

    Xchg(Register, Register),
    Add(Register, Register),
    Sub(Register, Register),
    Mul(Register, Register),
    Div(Register, Register),
    Not(Register),
    And(Register, Register),
    Or(Register, Register),
    Xor(Register, Register),
    Shl(Register, Register),
    Shr(Register, Register),

    LdImm(Operand, Register),             // ld $op, %rD
    LdRegDir(Register, Register),         // ld %rS, %rD
    LdRegInd(Register, Register),         // ld [%rS], %rD
    LdRegIndOff(Register, i32, Register), // ld [%rS + lit], %rD
    LdMemDir(Operand, Register),          // ld op, %rD
    StMemDir(Register, Operand),          // st %rS, op
    StRegInd(Register, Register),         // st %rS, [%rD]
    StRegIndOff(Register, Register, i32), // st %rS, [%rD + lit]

    Csrrd(Csr, Register),
    Csrwr(Register, Csr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Global(Vec<String>), // .global a, b
    Extern(Vec<String>), // .extern a, b
    Section(String),     // .section name
    Word(Vec<Operand>),  // .word 4, label
    Skip(u32),           // .skip 12
    End,                 // .end
}

// --- Assembly Line Structure ---

// Represents a single line of code, which can have a label, an
// instruction or directive, or both.
#[derive(Debug, Clone, Default)]
pub struct AssemblyLine {
    pub line_number: usize,
    pub label: Option<String>,
    pub instruction: Option<Instruction>,
    pub directive: Option<Directive>,
}
