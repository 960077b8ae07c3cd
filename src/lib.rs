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

pub mod assembler;
pub mod ast;
pub mod emulator;
pub mod errors;
pub mod isa;
pub mod linker;
pub mod objfile;
pub mod parser;

use anyhow::{Context, Result};
use assembler::Assembler;
use objfile::ObjectFile;

extern crate pest;
extern crate pest_derive;

/// Translate one assembly source into an object file: parse the text,
/// then drive the assembler's directive and instruction entry points
/// in source order.
pub fn assemble(name: &str, source: &str) -> Result<ObjectFile> {
    let lines = parser::parse_source(source).context("Failed during parsing stage")?;

    let mut assembler = Assembler::new();
    for line in &lines {
        assembler
            .apply(line)
            .with_context(|| format!("Failed on line {}", line.line_number))?;
    }

    Ok(assembler.into_object(name))
}
