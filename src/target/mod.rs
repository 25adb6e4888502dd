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

//! Pluggable CPU back-ends.

pub mod mos6502;

use crate::assembler::Assembler;
use crate::errors::AsmResult;
use crate::value::Value;

/// One CPU family back-end. The dispatcher routes each mnemonic line to
/// the active target, which parses the addressing mode, emits the
/// instruction bytes in pass 2, and reports how far the program counter
/// moves. Byte counts must not depend on the pass.
pub trait Target: Sync {
    /// Matched case-insensitively against the `CPU` directive argument.
    fn name(&self) -> &'static str;

    fn descr(&self) -> &'static str;

    /// Assembles one mnemonic line, returning the instruction length.
    fn assemble(&self, asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<u32>;

    /// True when the identifier is a reserved instruction name; such
    /// names cannot become plain labels.
    fn is_mnemonic(&self, id: &str) -> bool;

    /// Text for a back-end specific error code.
    fn error_text(&self, code: u16) -> &'static str;
}

/// Every built-in back-end, selectable via `CPU` or `-p`.
pub static TARGETS: &[&dyn Target] = &[
    &mos6502::M6502_OLD,
    &mos6502::M6502,
    &mos6502::M6510,
    &mos6502::M8500,
    &mos6502::R65C02,
    &mos6502::W65C02,
];

pub fn find(name: &str) -> Option<&'static dyn Target> {
    TARGETS
        .iter()
        .find(|t| t.name().eq_ignore_ascii_case(name))
        .copied()
}

/// Activates a back-end and defines its `_Pxxx = 1` marker symbol.
pub fn set_cpu(asm: &mut Assembler, name: &str, pass: u8) -> bool {
    let Some(t) = find(name) else {
        return false;
    };

    if asm.opts.verbose > 0 && pass == 1 {
        println!("Setting processor to '{}'", t.name());
    }

    asm.target = Some(t);

    let marker = format!("_P{}", t.name().to_ascii_uppercase());
    let ci = asm.opts.case_insensitive;
    let loc = Some((asm.files.idx(), asm.line));
    // Same marker, same value on every select, so this cannot conflict.
    let _ = asm
        .symbols
        .define_variable(&marker, Value::byte(1), false, pass, ci, loc);

    true
}

/// The `-T` table of supported processors.
pub fn list_targets() -> String {
    let mut s = String::new();
    for t in TARGETS {
        s.push_str(&format!("{:<10} {}\n", t.name(), t.descr()));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_is_case_insensitive() {
        assert!(find("6502").is_some());
        assert!(find("W65C02").is_some());
        assert!(find("z80").is_none());
    }

    #[test]
    fn test_list_targets_mentions_all() {
        let s = list_targets();
        for t in TARGETS {
            assert!(s.contains(t.name()));
        }
    }
}
