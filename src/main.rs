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

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use vasm::file_reader::DiskReader;
use vasm::{APP_NAME, APP_VERSION, Options, logging, output, target};

#[derive(Parser)]
#[command(name = "vasm", version, about = "Multi-target macro assembler for 8-bit processors")]
struct Opts {
    /// Case-insensitive symbol lookup
    #[arg(short = 'C')]
    ignore_case: bool,

    /// Pre-define a symbol (defaults to 1)
    #[arg(short = 'D', value_name = "SYM[=VAL]")]
    define: Vec<String>,

    /// Disable autofill on origin changes
    #[arg(short = 'F')]
    no_autofill: bool,

    /// Printer mode (condensed-print escapes for wide listings)
    #[arg(short = 'P')]
    printer: bool,

    /// Select the target processor
    #[arg(short = 'p', value_name = "CPU")]
    cpu: Option<String>,

    /// Write a listing to this file
    #[arg(short = 'l', value_name = "FILE")]
    listing: Option<PathBuf>,

    /// Write the object to this file
    #[arg(short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,

    /// Suppress the banner
    #[arg(short = 'q')]
    quiet: bool,

    /// Dump the symbol table
    #[arg(short = 's')]
    symbols: bool,

    /// Increase verbosity
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Internal debug tracing
    #[arg(short = 'd')]
    debug: bool,

    /// List the supported target processors
    #[arg(short = 'T')]
    list_targets: bool,

    /// Source files
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,
}

fn banner() {
    println!("{} version {}", APP_NAME, APP_VERSION);
    println!("A table-driven assembler for 8-bit processors.\n");
}

/// Listing files default to a .lst extension.
fn listing_path(p: &Path) -> PathBuf {
    if p.extension().is_none() {
        p.with_extension("lst")
    } else {
        p.to_path_buf()
    }
}

fn main() -> ExitCode {
    let args = Opts::parse();

    if args.list_targets {
        print!("{}", target::list_targets());
        return ExitCode::SUCCESS;
    }

    if !args.quiet {
        banner();
    }

    if args.files.is_empty() {
        logging::error("no input files");
        return ExitCode::FAILURE;
    }
    let Some(out_arg) = args.output.as_deref() else {
        logging::error("no output file specified");
        return ExitCode::FAILURE;
    };
    let out_arg = out_arg.to_string_lossy().into_owned();

    // Resolve the format up front so a bad name fails before assembly
    // and the prefix is gone from the path we create.
    let out_path = match output::mode_for(&out_arg) {
        Ok((_, path)) => PathBuf::from(path),
        Err(e) => {
            logging::error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    let opts = Options {
        cpu: args.cpu.clone(),
        case_insensitive: args.ignore_case,
        autofill: !args.no_autofill,
        printer: args.printer,
        quiet: args.quiet,
        verbose: args.verbose,
        debug: args.debug || std::env::var_os("DEBUG").is_some(),
        symdump: args.symbols,
        listing: args.listing.is_some(),
        defines: args.define.clone(),
    };

    let inputs: Vec<&Path> = args.files.iter().map(PathBuf::as_path).collect();
    let list_path = args.listing.as_deref().map(listing_path);

    let result = vasm::assemble(&inputs, &out_arg, &opts, &DiskReader);

    let res = match result {
        Ok(res) => res,
        Err(diag) => {
            logging::error(&diag.to_string());
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = write_outputs(&res, &out_path, list_path.as_deref()) {
        logging::error(&e.to_string());
        // Never leave partial files behind.
        let _ = fs::remove_file(&out_path);
        if let Some(lp) = &list_path {
            let _ = fs::remove_file(lp);
        }
        return ExitCode::FAILURE;
    }

    if !args.quiet {
        println!("Generated {} bytes of output.", res.size);
    }

    ExitCode::SUCCESS
}

fn write_outputs(
    res: &vasm::Assembled,
    out_path: &Path,
    list_path: Option<&Path>,
) -> std::io::Result<()> {
    fs::write(out_path, &res.object)?;
    if let (Some(lp), Some(text)) = (list_path, res.listing.as_deref()) {
        fs::write(lp, text)?;
    }
    Ok(())
}
