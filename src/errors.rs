use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum AssemblyError {
    #[error("Syntax Error: {0}")]
    PestError(#[from] Box<pest::error::Error<crate::parser::Rule>>),

    #[error("Structural Error on line {line}: {reason}")]
    StructuralError { line: usize, reason: String },

    #[error("Semantic Error on line {line}: {reason}")]
    SemanticError { line: usize, reason: String },

    #[error("Semantic Error: {reason}")]
    SemanticErrorNoLine { reason: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum LinkError {
    #[error("Format Error in {file}: {reason}")]
    FormatError { file: String, reason: String },

    #[error("Placement Error: {reason}")]
    PlacementError { reason: String },

    #[error("Symbol Error: {reason}")]
    SymbolError { reason: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum EmulationError {
    #[error("Format Error on image line {line}: {reason}")]
    FormatError { line: usize, reason: String },

    #[error("Memory Error: read of unmapped address 0x{address:08x}")]
    UnmappedRead { address: u32 },

    #[error("Arithmetic Error: division by zero at pc=0x{pc:08x}")]
    DivisionByZero { pc: u32 },

    #[error("Decode Error: unknown instruction 0x{op:02x} at pc=0x{pc:08x}")]
    UnknownInstruction { op: u8, pc: u32 },

    #[error("Decode Error: control register index {index} out of range")]
    BadCsrIndex { index: u8 },
}
