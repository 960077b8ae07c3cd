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

use anyhow::{Context, Result, bail};
use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use vela::linker::{Linker, SectionPlace};
use vela::objfile::ObjectFile;

// The `-place=<section>@<hex-base>` flags predate clap conventions
// (single dash, long name), so the argument list is scanned by hand.
struct Opts {
    places: Vec<SectionPlace>,
    output: PathBuf,
    inputs: Vec<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<Opts> {
    let mut places = Vec::new();
    let mut output = None;
    let mut inputs = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(payload) = arg.strip_prefix("-place=") {
            places.push(SectionPlace::parse(payload)?);
        } else if arg == "-o" {
            match iter.next() {
                Some(path) => output = Some(PathBuf::from(path)),
                None => bail!("-o needs an output file"),
            }
        } else if arg.starts_with('-') {
            bail!("unknown flag {arg}");
        } else {
            inputs.push(PathBuf::from(arg));
        }
    }

    let Some(output) = output else {
        bail!("no output file given, use -o <output>");
    };
    if inputs.is_empty() {
        bail!("at least one input file is required");
    }

    Ok(Opts {
        places,
        output,
        inputs,
    })
}

fn run() -> Result<()> {
    println!("LINKER | Start");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = parse_args(&args)?;

    let mut linker = Linker::new();
    for input in &opts.inputs {
        println!("LINKER | Parsing file: {}", input.display());
        let text = fs::read_to_string(input)
            .with_context(|| format!("Failed to open the file: {}", input.display()))?;
        linker.add_object(ObjectFile::parse(&input.display().to_string(), &text)?);
    }

    linker.place_sections(&opts.places)?;
    linker.resolve_symbols()?;
    linker.apply_relocations()?;

    let image = File::create(&opts.output)
        .with_context(|| format!("Failed to open the file: {}", opts.output.display()))?;
    linker.write_image(&mut BufWriter::new(image))?;

    // The human-readable report lands beside the main output.
    let report_path = opts
        .output
        .parent()
        .unwrap_or(Path::new("."))
        .join("linker.txt");
    let report = File::create(&report_path)
        .with_context(|| format!("Failed to open the file: {}", report_path.display()))?;
    linker.write_report(&mut BufWriter::new(report))?;

    println!("LINKER | End");
    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("LINKER | {error:#}");
        std::process::exit(1);
    }
}
