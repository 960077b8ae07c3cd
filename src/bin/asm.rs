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

use anyhow::{Context, Result};
use clap::Parser as clap_parser;
use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

#[derive(clap_parser)]
#[clap(version = "0.1.0", about = "Assembler for the Vela-32 toolchain")]
struct Opts {
    #[clap(short)]
    output: PathBuf,
    /// Input file name, looked up under tests/.
    input: PathBuf,
}

fn run() -> Result<()> {
    let opts: Opts = Opts::parse();

    let input_path = Path::new("tests").join(&opts.input);
    let source = fs::read_to_string(&input_path)
        .with_context(|| format!("Failed to read input file: {}", input_path.display()))?;

    println!("ASSEMBLER | {}: Start", input_path.display());

    let object = vela::assemble(&opts.input.display().to_string(), &source)?;

    let output = File::create(&opts.output)
        .with_context(|| format!("Failed to open the file: {}", opts.output.display()))?;
    let mut output = BufWriter::new(output);
    object.write(&mut output)?;

    println!("ASSEMBLER | {}: End", input_path.display());
    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("ASSEMBLER | {error:#}");
        std::process::exit(1);
    }
}
