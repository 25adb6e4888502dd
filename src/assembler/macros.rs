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

//! Macro definition capture, parameter substitution, and invocation.
//!
//! A definition records its formal parameter list and body text
//! verbatim. Invoking a macro substitutes actuals for formals, makes the
//! expansion the active source buffer, and saves the previous buffer and
//! position on a frame stack; the ETX terminator restores them.

use super::Assembler;
use crate::errors::{AsmError, AsmResult, ErrorKind};
use crate::source::{COMMENT_CHAR, ETX_CHAR, SourceText, is_end, is_space};

/// Longest actual/formal parameter string.
pub const PARAM_LEN: usize = 128;

#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    pub formal: String,
    pub def: String,
}

/// Saved source state for one active invocation.
#[derive(Debug)]
pub struct MacroFrame {
    pub text: SourceText,
    pub pos: usize,
}

fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

/// Replaces whole-identifier occurrences of `from` with `to`. Plain
/// substring replacement would hit letters inside mnemonics (a formal
/// named `b` must not rewrite `.byte`), so matches are bounded by
/// non-identifier characters.
fn subst_param(text: &str, from: &str, to: &str) -> String {
    let tb = text.as_bytes();
    let fb = from.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < tb.len() {
        let at_boundary = i == 0 || !is_word(tb[i - 1]);
        if at_boundary
            && tb[i..].starts_with(fb)
            && !tb.get(i + fb.len()).copied().is_some_and(is_word)
        {
            out.push_str(to);
            i += fb.len();
        } else {
            out.push(tb[i] as char);
            i += 1;
        }
    }

    out
}

impl Assembler<'_> {
    pub(super) fn macro_lookup(&self, name: &str) -> Option<usize> {
        self.macros
            .iter()
            .position(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// Appends the line starting at `start` (leading whitespace
    /// included) to the macro being defined.
    pub(super) fn macro_add(&mut self, start: usize) {
        let line = self.text.line_at(start);
        if let Some(i) = self.cur_macro {
            self.macros[i].def.push_str(&line);
            self.macros[i].def.push('\n');
        }
    }

    /// Expands a macro call. The actual parameter string runs to the end
    /// of the line, comments stripped; the expansion is handed to the
    /// pass driver, which switches buffers once the invocation line is
    /// fully processed.
    pub(super) fn macro_invoke(&mut self, name: &str, p: &mut usize) -> AsmResult<()> {
        let mi = match self.macro_lookup(name) {
            Some(mi) => mi,
            None => return Ok(()),
        };

        let mut actual = String::new();
        loop {
            let c = self.text.at(*p);
            if is_end(c) {
                break;
            }
            if c == COMMENT_CHAR {
                while actual.as_bytes().last().copied().is_some_and(is_space) {
                    actual.pop();
                }
                self.text.skip_white_and_comment(p);
            } else {
                if actual.len() >= PARAM_LEN {
                    return Err(AsmError::hint(ErrorKind::OutOfMemory, "macro parameters"));
                }
                actual.push(c as char);
                *p += 1;
            }
        }

        let formal = self.macros[mi].formal.clone();
        let mut expansion = self.macros[mi].def.clone();

        if !formal.is_empty() && !actual.is_empty() {
            let formals: Vec<&str> = formal.split(',').map(str::trim).collect();
            let actuals: Vec<&str> = actual.split(',').map(str::trim).collect();
            if actuals.len() < formals.len() {
                return Err(AsmError::hint(ErrorKind::MacroActual, name));
            }
            if actuals.len() > formals.len() {
                return Err(AsmError::hint(ErrorKind::MacroFormal, name));
            }
            for (f, a) in formals.iter().zip(actuals.iter()) {
                if f.is_empty() {
                    continue;
                }
                expansion = subst_param(&expansion, f, a);
            }
        }

        self.pending_macro = Some(expansion.into_bytes());

        Ok(())
    }

    /// End of an expansion: back to the saved buffer and position.
    pub(super) fn macro_close(&mut self, p: &mut usize) {
        if let Some(frame) = self.mac_frames.pop() {
            self.text = frame.text;
            *p = frame.pos;
        }
    }
}

/// The `MACRO` directive. The preceding label names the macro; the rest
/// of the line is the formal parameter list. Capture mode starts on the
/// next line.
pub fn do_macro(asm: &mut Assembler, p: &mut usize, _pass: u8) -> AsmResult<()> {
    if asm.defining {
        return Err(ErrorKind::MacroNest.into());
    }

    let label = asm
        .current_label
        .clone()
        .ok_or(ErrorKind::LabelRequired)?;

    let ci = asm.opts.case_insensitive;
    let sym = asm
        .symbols
        .lookup_mut(&label, ci)
        .ok_or(ErrorKind::LabelRequired)?;
    if sym.colon {
        return Err(AsmError::hint(ErrorKind::LabelNotAllowed, &label));
    }
    sym.kind = super::symbol_table::SymKind::Macro;

    asm.text.skip_white(p);
    let mut formal = String::new();
    while !is_end(asm.text.at(*p)) && asm.text.at(*p) != COMMENT_CHAR {
        if formal.len() >= PARAM_LEN {
            return Err(AsmError::hint(ErrorKind::OutOfMemory, "macro parameters"));
        }
        formal.push(asm.text.at(*p) as char);
        *p += 1;
    }
    while formal.ends_with([' ', '\t']) {
        formal.pop();
    }

    asm.macros.push(MacroDef {
        name: label,
        formal,
        def: String::new(),
    });
    asm.cur_macro = Some(asm.macros.len() - 1);
    asm.new_defining = true;

    Ok(())
}

/// The `ENDM` directive: terminate the definition with the ETX sentinel.
pub fn do_endm(asm: &mut Assembler, p: &mut usize, _pass: u8) -> AsmResult<()> {
    asm.text.skip_white_and_comment(p);
    if !is_end(asm.text.at(*p)) {
        return Err(ErrorKind::EolExpected.into());
    }

    if !asm.defining {
        return Err(ErrorKind::EndmWithoutMacro.into());
    }

    if let Some(i) = asm.cur_macro {
        asm.macros[i].def.push(ETX_CHAR as char);
    }
    asm.cur_macro = None;
    asm.new_defining = false;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subst_respects_identifier_boundaries() {
        let body = "  .byte b\n";
        assert_eq!(subst_param(body, "b", "$22"), "  .byte $22\n");
    }

    #[test]
    fn test_subst_replaces_all_occurrences() {
        assert_eq!(subst_param("a+a*a", "a", "2"), "2+2*2");
    }

    #[test]
    fn test_subst_leaves_longer_names_alone() {
        assert_eq!(subst_param("abc a", "a", "9"), "abc 9");
    }
}
