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

//! The assembler core: all shared state, the statement parser, and the
//! two-pass driver.
//!
//! Pass 1 discovers symbols and byte counts; pass 2 replays the same
//! decisions and emits bytes. Symbols survive between passes, everything
//! else is reset.

pub(crate) mod expr;
pub(crate) mod func;
pub(crate) mod macros;
pub(crate) mod pseudo;
pub mod symbol_table;

use std::path::Path;

use crate::errors::{AsmError, AsmResult, Diagnostic, ErrorKind};
use crate::file_reader::FileReader;
use crate::listing::{self, Listing, SYMS_FULL, SYMS_OFF};
use crate::output::{self, Output};
use crate::source::{
    ALPHA_CHAR, COLON_CHAR, DOT_CHAR, EOF_CHAR, EQUAL_CHAR, ETX_CHAR, FileRegistry, ID_LEN,
    SourceText, is_end, is_ident_extra,
};
use crate::target::{self, Target};
use crate::value::Value;
use crate::{APP_NAME, APP_VERSION, Assembled, Options};
use macros::{MacroDef, MacroFrame};
use pseudo::Pseudo;
use symbol_table::SymbolTable;

pub const MAX_IF_LEVEL: usize = 16;
pub const MAX_RPT_LEVEL: usize = 8;
pub const RADIX_DEFAULT: u32 = 10;

/// One active `REPEAT` block.
#[derive(Debug)]
pub struct Repeat {
    pub file: usize,
    pub line: u32,
    pub pos: usize,
    pub count: u32,
    pub repeating: bool,
}

/// The whole assembly context for one invocation of the tool.
pub struct Assembler<'r> {
    pub opts: Options,
    pub(crate) reader: &'r dyn FileReader,

    pub text: SourceText,
    pub files: FileRegistry,
    pub symbols: SymbolTable,

    pub line: u32,
    newline: u32,
    pub radix: u32,
    pub pc: u32,
    pub org: u32,
    pub sa: u32,
    found_end: bool,
    pub current_label: Option<String>,

    if_stack: Vec<bool>,
    ifstate: bool,
    new_ifstate: bool,

    rpt: Vec<Repeat>,
    rptstate: bool,
    new_rptstate: bool,
    rpt_skip_nest: u32,

    pub(crate) macros: Vec<MacroDef>,
    defining: bool,
    new_defining: bool,
    cur_macro: Option<usize>,
    mac_frames: Vec<MacroFrame>,
    pending_macro: Option<Vec<u8>>,

    pub output: Output,
    pub listing: Listing,
    pub target: Option<&'static dyn Target>,
    psop: Option<&'static Pseudo>,
    last_define: Option<String>,
}

impl<'r> Assembler<'r> {
    pub fn new(opts: Options, reader: &'r dyn FileReader) -> Self {
        let product = format!("{} version {}", APP_NAME, APP_VERSION);
        let syms = if opts.symdump { SYMS_FULL } else { SYMS_OFF };
        let listing = Listing::new(opts.listing, opts.printer, syms, product);

        Assembler {
            reader,
            text: SourceText::default(),
            files: FileRegistry::default(),
            symbols: SymbolTable::default(),
            line: 1,
            newline: 2,
            radix: RADIX_DEFAULT,
            pc: 0,
            org: 0,
            sa: 0,
            found_end: false,
            current_label: None,
            if_stack: Vec::new(),
            ifstate: true,
            new_ifstate: true,
            rpt: Vec::new(),
            rptstate: false,
            new_rptstate: false,
            rpt_skip_nest: 0,
            macros: Vec::new(),
            defining: false,
            new_defining: false,
            cur_macro: None,
            mac_frames: Vec::new(),
            pending_macro: None,
            output: Output::default(),
            listing,
            target: None,
            psop: None,
            last_define: None,
            opts,
        }
    }

    /// Loads and concatenates the input files; the EOF separator between
    /// them drives the registry index during parsing.
    pub fn load(&mut self, inputs: &[&Path]) -> Result<(), Diagnostic> {
        for path in inputs {
            let name = path.display().to_string();
            let content = self.reader.read_text(path).map_err(|_| Diagnostic {
                file: name.clone(),
                line: 0,
                message: ErrorKind::FileOpen.to_string(),
            })?;
            self.text.append_file(&content);
            self.files.add(&name, 1).map_err(|e| Diagnostic {
                file: name.clone(),
                line: 0,
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Replaces the source with a single in-memory buffer.
    pub fn set_source(&mut self, src: &str) {
        self.text = SourceText::from_str(src);
        self.files = FileRegistry::default();
        let _ = self.files.add("<source>", 1);
    }

    /// Runs both passes and collects the encoded object and listing.
    pub fn run(&mut self, output_name: &str) -> Result<Assembled, Diagnostic> {
        let (mode, _) = output::mode_for(output_name).map_err(|e| self.diag(e))?;
        self.output.mode = mode;

        self.predefine().map_err(|e| self.diag(e))?;
        for spec in self.opts.defines.clone() {
            self.apply_define(&spec).map_err(|e| self.diag(e))?;
        }
        if let Some(cpu) = self.opts.cpu.clone() {
            if !target::set_cpu(self, &cpu, 1) {
                return Err(self.diag(AsmError::hint(ErrorKind::UnknownCpu, &cpu)));
            }
        }

        self.pass(1).map_err(|e| self.diag(e))?;
        self.pass(2).map_err(|e| self.diag(e))?;
        self.output.finish(2);

        if self.listing.enabled {
            let Self {
                listing,
                symbols,
                files,
                opts,
                ..
            } = self;
            listing.append_symbols(symbols, files, opts.verbose > 0);
            listing.close();
        } else if self.listing.syms != SYMS_OFF {
            println!("Symbol table:");
            print!(
                "{}",
                listing::symbols_text(
                    &self.symbols,
                    &self.files,
                    self.opts.verbose > 0,
                    self.listing.syms == SYMS_FULL,
                )
            );
        }

        Ok(Assembled {
            size: self.output.total(),
            object: self.output.object(),
            listing: self.listing.take(),
        })
    }

    /// Built-in marker symbols.
    fn predefine(&mut self) -> AsmResult<()> {
        let ci = self.opts.case_insensitive;
        self.symbols
            .define_variable("__VASM__", Value::byte(1), false, 1, ci, None)?;

        let mut parts = APP_VERSION.split('.');
        let major: u32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let minor: u32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        self.symbols.define_variable(
            "__VASM_VER__",
            Value::num((major << 8) | minor),
            false,
            1,
            ci,
            None,
        )?;

        Ok(())
    }

    /// A `-D sym[=val]` command line definition; the value is a full
    /// expression, defaulting to byte 1.
    fn apply_define(&mut self, spec: &str) -> AsmResult<()> {
        let saved = std::mem::replace(&mut self.text, SourceText::from_str(spec));
        let res = self.parse_define();
        self.text = saved;
        res
    }

    fn parse_define(&mut self) -> AsmResult<()> {
        let mut p = 0usize;
        let id = self.text.ident(&mut p)?;

        let mut v = Value::byte(1);
        if self.text.at(p) == EQUAL_CHAR {
            p += 1;
            if !is_end(self.text.at(p)) {
                v = expr::expr(self, &mut p)?;
            }
        }

        let ci = self.opts.case_insensitive;
        self.symbols.define_variable(&id, v, false, 1, ci, None)
    }

    fn diag(&self, e: AsmError) -> Diagnostic {
        let message = match e.kind {
            ErrorKind::Target(code) => {
                let text = self
                    .target
                    .map(|t| t.error_text(code))
                    .unwrap_or("target error");
                match &e.hint {
                    Some(h) => format!("{} ({})", text, h),
                    None => text.to_string(),
                }
            }
            _ => e.to_string(),
        };
        Diagnostic {
            file: self.files.current_name().to_string(),
            line: self.line,
            message,
        }
    }

    pub(crate) fn rpt_skipping(&self) -> bool {
        self.rpt.last().map_or(false, |r| r.count == 0)
    }

    /// Statements only take effect outside skipped conditionals and
    /// skipped zero-count repeat bodies.
    pub(crate) fn active(&self) -> bool {
        self.ifstate && !self.rpt_skipping()
    }

    fn define_label_here(
        &mut self,
        name: &str,
        parent: Option<&str>,
        colon: bool,
        pass: u8,
    ) -> AsmResult<()> {
        let ci = self.opts.case_insensitive;
        let file = self.files.idx();
        let line = self.line;
        let pc = self.pc;
        self.symbols
            .define_label(name, parent, pc, pass, colon, ci, file, line)?;
        Ok(())
    }

    pub(crate) fn define_var(
        &mut self,
        name: &str,
        v: Value,
        force: bool,
        pass: u8,
    ) -> AsmResult<()> {
        let ci = self.opts.case_insensitive;
        let loc = Some((self.files.idx(), self.line));
        self.symbols.define_variable(name, v, force, pass, ci, loc)
    }

    fn is_statement_word(&self, id: &str) -> bool {
        self.macro_lookup(id).is_some()
            || pseudo::is_pseudo(id, false).is_some()
            || self.target.map_or(false, |t| t.is_mnemonic(id))
    }

    /// One character plus any identifier continuation, upper-cased.
    /// Never fails; the caller decides what a non-name means.
    fn lenient_ident_upcase(&self, p: &mut usize) -> String {
        let mut s = String::new();
        let c = self.text.at(*p);
        if is_end(c) {
            return s;
        }
        s.push(c.to_ascii_uppercase() as char);
        *p += 1;
        loop {
            let c = self.text.at(*p);
            if !(c.is_ascii_alphanumeric() || is_ident_extra(c)) || s.len() >= ID_LEN {
                break;
            }
            s.push(c.to_ascii_uppercase() as char);
            *p += 1;
        }
        s
    }

    fn pseudo_exec(&mut self, op: &'static Pseudo, p: &mut usize, pass: u8) -> AsmResult<()> {
        let run = op.always || (self.ifstate && (!self.rpt_skipping() || op.rpt));
        if run {
            (op.exec)(self, p, pass)?;
        }
        self.text.skip_to_eol(p);
        Ok(())
    }

    /// While a macro is being defined every line is captured verbatim;
    /// only `ENDM` executes, and a nested `MACRO` is an error.
    fn capture_line(&mut self, line_start: usize, p: &mut usize, pass: u8) -> AsmResult<()> {
        let mut q = *p;
        if self.text.at(q) == DOT_CHAR {
            q += 1;
        }
        let mut id = String::new();
        if self.text.at(q).is_ascii_alphabetic() {
            id = self.text.nident_upcase(&mut q).unwrap_or_default();
        }

        if id == "ENDM" {
            *p = q;
            macros::do_endm(self, p, pass)?;
            self.text.skip_to_eol(p);
            return Ok(());
        }
        if id == "MACRO" {
            return Err(ErrorKind::MacroNest.into());
        }

        self.macro_add(line_start);
        self.text.skip_to_eol(p);
        Ok(())
    }

    /// Processes one statement: optional label, then a directive, macro
    /// invocation, or processor mnemonic.
    fn statement(&mut self, p: &mut usize, pass: u8) -> AsmResult<()> {
        let line_start = *p;

        self.text.skip_white_and_comment(p);
        if is_end(self.text.at(*p)) {
            return Ok(());
        }

        if self.defining {
            return self.capture_line(line_start, p, pass);
        }

        // Leading label, global or local.
        let mut label = 0u8;
        let mut local = false;
        let mut id = String::new();
        let pt = *p;

        if self.text.at(*p) == ALPHA_CHAR {
            *p += 1;
            if !self.text.at(*p).is_ascii_alphanumeric() {
                return Err(ErrorKind::IdExpected.into());
            }
            id = self.text.nident(p)?;
            label = 1;
            local = true;
        } else if self.text.at(*p).is_ascii_alphabetic() {
            id = self.text.ident(p)?;
            label = 1;
        }

        // A trailing colon forces the word to be a label even when it
        // collides with an instruction name.
        if self.text.at(*p) == COLON_CHAR {
            *p += 1;
            label += 1;
        }

        self.text.skip_white_and_comment(p);

        if label > 0 {
            if label == 2 || !self.is_statement_word(&id) {
                if self.active() {
                    if is_end(self.text.at(*p)) && label != 2 {
                        return Err(ErrorKind::StatementExpected.into());
                    }
                    if local {
                        let parent = self
                            .current_label
                            .clone()
                            .ok_or(ErrorKind::LocalNeedsGlobal)?;
                        self.define_label_here(&id, Some(&parent), label == 2, pass)?;
                    } else {
                        self.define_label_here(&id, None, label == 2, pass)?;
                        self.current_label = Some(id.clone());
                    }
                }
            } else {
                // The word is an instruction, directive, or macro after
                // all; reparse it below.
                *p = pt;
            }
        }

        if is_end(self.text.at(*p)) {
            return Ok(());
        }

        // "*= expr", "$= expr", and ".= expr" assign the program
        // counter; treat them as ORG.
        if matches!(self.text.at(*p), b'*' | b'$' | b'.') {
            let save = *p;
            *p += 1;
            self.text.skip_white_and_comment(p);
            if self.text.at(*p) == EQUAL_CHAR {
                *p += 1;
                self.text.skip_white_and_comment(p);
                self.psop = Some(&pseudo::ORG_STMT);
                return self.pseudo_exec(&pseudo::ORG_STMT, p, pass);
            }
            *p = save;
        }

        // "sym = expr" is EQU for the label just defined.
        if self.text.at(*p) == EQUAL_CHAR {
            if label == 2 {
                return Err(ErrorKind::LabelNotAllowed.into());
            }
            *p += 1;
            self.psop = Some(&pseudo::EQU_STMT);
            return self.pseudo_exec(&pseudo::EQU_STMT, p, pass);
        }

        // Dot directives, and dot labels (shorthand for a global label
        // carrying the current label's name as prefix). A dot label may
        // be followed by more statements on the same line.
        while self.text.at(*p) == DOT_CHAR {
            let save = *p;
            *p += 1;
            let id = self.text.nident_upcase(p)?;
            if let Some(op) = pseudo::is_pseudo(&id, true) {
                self.text.skip_white(p);
                self.psop = Some(op);
                return self.pseudo_exec(op, p, pass);
            }

            let parent = self
                .current_label
                .clone()
                .ok_or(ErrorKind::LocalNeedsGlobal)?;
            *p = save;
            let id2 = self.text.nident(p)?;
            if self.text.at(*p) == COLON_CHAR {
                *p += 1;
            }
            if parent.len() + id2.len() > ID_LEN {
                return Err(AsmError::hint(ErrorKind::IdTooLong, &id2));
            }
            let full = format!("{parent}{id2}");
            if self.active() {
                self.define_label_here(&full, None, false, pass)?;
            }

            self.text.skip_white_and_comment(p);
            if is_end(self.text.at(*p)) {
                return Ok(());
            }
        }

        // Bare directive name?
        let pt2 = *p;
        let id = self.lenient_ident_upcase(p);
        if let Some(op) = pseudo::is_pseudo(&id, false) {
            self.text.skip_white(p);
            self.psop = Some(op);
            return self.pseudo_exec(op, p, pass);
        }

        // Macro invocation?
        self.text.skip_white(p);
        if self.active() && self.macro_lookup(&id).is_some() {
            self.macro_invoke(&id, p)?;
            return Ok(());
        }

        // Must be a processor mnemonic then.
        *p = pt2;
        self.text.skip_white_and_comment(p);
        if is_end(self.text.at(*p)) {
            return Ok(());
        }

        if self.active() {
            if self.text.at(*p).is_ascii_alphabetic() {
                let t = self.target.ok_or(ErrorKind::NoCpu)?;
                let n = t.assemble(self, p, pass)?;
                self.pc = self.pc.wrapping_add(n);

                self.text.skip_white_and_comment(p);
                if !is_end(self.text.at(*p)) {
                    return Err(ErrorKind::EolExpected.into());
                }
            } else {
                return Err(ErrorKind::IllegalStatement.into());
            }
        }

        self.text.skip_to_eol(p);
        Ok(())
    }

    /// One full traversal of the source.
    pub fn pass(&mut self, pass: u8) -> AsmResult<()> {
        if self.opts.verbose > 0 {
            println!("Pass {}:", pass);
        }

        // A failed earlier pass may have left a macro expansion active;
        // get the real buffer back before resetting.
        if let Some(first) = self.mac_frames.drain(..).next() {
            self.text = first.text;
        }
        self.pending_macro = None;

        self.found_end = false;
        self.line = 1;
        self.newline = 2;
        self.current_label = None;
        self.radix = RADIX_DEFAULT;
        self.files.reset();
        self.if_stack.clear();
        self.ifstate = true;
        self.new_ifstate = true;
        self.rpt.clear();
        self.rptstate = false;
        self.new_rptstate = false;
        self.rpt_skip_nest = 0;
        self.macros.clear();
        self.defining = false;
        self.new_defining = false;
        self.cur_macro = None;
        self.pc = 0;
        self.sa = 0;
        self.output.reset(pass, self.opts.autofill);
        self.listing.reset();
        self.psop = None;
        self.last_define = None;
        self.listing.save(self.pc, self.output.total());

        let mut p: usize = 0;

        while self.text.at(p) != 0 {
            let list_start = p;
            self.psop = None;
            self.newline = self.line + 1;
            self.new_ifstate = self.ifstate;
            self.new_rptstate = self.rptstate;
            self.new_defining = self.defining;

            if self.opts.debug && ((self.opts.verbose > 0 && pass == 1) || pass == 2) {
                eprintln!("<< '{}'", self.text.line_at(p));
            }

            self.statement(&mut p, pass)?;

            self.text.skip_white_and_comment(&mut p);
            if !is_end(self.text.at(p)) {
                return Err(ErrorKind::EolExpected.into());
            }

            if pass == 2 && (self.rpt.is_empty() || self.rptstate) {
                self.list_line(list_start);
            }

            self.defining = self.new_defining;
            self.ifstate = self.new_ifstate;
            self.rptstate = self.new_rptstate;

            self.text.skip_eol(&mut p);

            if self.text.at(p) == ETX_CHAR {
                // End of a macro expansion.
                p += 1;
                self.macro_close(&mut p);
            }
            if self.text.at(p) == EOF_CHAR {
                // Crossing into the next registry entry.
                p += 1;
                self.line = self.files.advance();
                self.newline = self.line;
            }
            if self.found_end {
                self.found_end = false;
            }

            if let Some(expansion) = self.pending_macro.take() {
                let saved = std::mem::replace(&mut self.text, SourceText::new(expansion));
                self.mac_frames.push(MacroFrame { text: saved, pos: p });
                p = 0;
            }

            if self.mac_frames.is_empty()
                && (!self.rptstate || !self.rpt.last().map_or(false, |r| r.repeating))
            {
                self.line = self.newline;
            }

            self.listing.save(self.pc, self.output.total());
        }

        if self.defining || !self.mac_frames.is_empty() {
            return Err(AsmError::hint(ErrorKind::MacroNest, "end of input"));
        }
        if !self.if_stack.is_empty() {
            return Err(AsmError::hint(ErrorKind::EndifWithoutIf, "end of input"));
        }
        if !self.rpt.is_empty() || self.rpt_skip_nest != 0 {
            return Err(AsmError::hint(ErrorKind::RepeatWithoutEndrep, "end of input"));
        }

        Ok(())
    }

    fn list_line(&mut self, start: usize) {
        if !self.listing.enabled {
            return;
        }

        let note = match self.psop {
            Some(op) if op.always || self.ifstate => op.list.map(|f| f(self)),
            _ => None,
        };
        let src = self.text.line_at(start);
        let line_no = self.line;
        let active = self.ifstate;

        let Self {
            listing,
            output,
            files,
            ..
        } = self;
        listing.line(
            &src,
            line_no,
            active,
            note.as_deref(),
            output.image(),
            output.total(),
            files.current_name(),
        );
    }

    pub(crate) fn list_page_now(&mut self) {
        let Self { listing, files, .. } = self;
        listing.page(None, files.current_name());
    }
}
