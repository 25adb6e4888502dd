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

//! A retargetable two-pass macro assembler for 8-bit processors.
//!
//! The library entry point is [`assemble`]: it loads the sources through
//! a [`file_reader::FileReader`], runs both passes, and hands back the
//! encoded object image plus the rendered listing; writing files is the
//! caller's business.

pub mod assembler;
pub mod errors;
pub mod file_reader;
pub mod listing;
pub mod logging;
pub mod output;
pub mod source;
pub mod target;
pub mod value;

use std::path::Path;

pub use assembler::Assembler;
pub use errors::Diagnostic;
use file_reader::FileReader;

pub const APP_NAME: &str = "vasm";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Invocation options, mirroring the command line flags.
#[derive(Debug, Clone)]
pub struct Options {
    /// Pre-selected processor (`-p`).
    pub cpu: Option<String>,
    /// Case-insensitive symbol matching (`-C`).
    pub case_insensitive: bool,
    /// Zero-fill gaps on origin changes in binary mode (on by default).
    pub autofill: bool,
    /// Emit condensed-print escapes for wide listings (`-P`).
    pub printer: bool,
    pub quiet: bool,
    pub verbose: u8,
    pub debug: bool,
    /// Dump the full symbol table after assembly (`-s`).
    pub symdump: bool,
    /// Produce a listing.
    pub listing: bool,
    /// `sym[=val]` pre-definitions (`-D`).
    pub defines: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            cpu: None,
            case_insensitive: false,
            autofill: true,
            printer: false,
            quiet: false,
            verbose: 0,
            debug: false,
            symdump: false,
            listing: false,
            defines: Vec::new(),
        }
    }
}

/// The result of a successful assembly.
#[derive(Debug)]
pub struct Assembled {
    /// The encoded object: raw bytes, or the HEX/S-record text.
    pub object: Vec<u8>,
    /// The rendered listing, when one was requested.
    pub listing: Option<String>,
    /// Total count of emitted code bytes.
    pub size: u32,
}

/// Assembles `inputs` into one object image. The output format is
/// inferred from `output_name` (a `fmt:` prefix or the extension);
/// nothing is written to disk here.
pub fn assemble<R: FileReader>(
    inputs: &[&Path],
    output_name: &str,
    opts: &Options,
    reader: &R,
) -> Result<Assembled, Diagnostic> {
    let mut asm = Assembler::new(opts.clone(), reader);
    asm.load(inputs)?;
    asm.run(output_name)
}
