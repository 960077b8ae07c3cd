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
use std::io::stdout;
use std::path::PathBuf;
use vela::emulator::Emulator;

#[derive(clap_parser)]
#[clap(version = "0.1.0", about = "Emulator for the Vela-32 toolchain")]
struct Opts {
    /// Hex memory image produced by the linker.
    image: PathBuf,
}

fn run() -> Result<()> {
    let opts: Opts = Opts::parse();

    println!("EMULATOR | Start");

    let image = fs::read_to_string(&opts.image)
        .with_context(|| format!("Cannot open input file: {}", opts.image.display()))?;

    let mut emulator = Emulator::new();
    emulator.load_image(&image)?;
    emulator.run()?;

    println!("EMULATOR | End");
    println!("-----------------------------------------------------------------");
    println!("Emulated processor executed halt instruction");
    println!("Emulated processor state:");
    emulator.write_state(&mut stdout())?;

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("EMULATOR | {error:#}");
        std::process::exit(1);
    }
}
