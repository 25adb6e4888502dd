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

//! Paginated listing output and the symbol table dump.

use std::fmt::Write as _;

use chrono::Local;

use crate::assembler::symbol_table::{SymKind, SymbolTable};
use crate::source::FileRegistry;

/// Default page dimensions; both include the margins, so the usable
/// area is smaller.
pub const LIST_PLENGTH: i32 = 66;
pub const LIST_PWIDTH: i32 = 80;

/// Code bytes shown per listing line.
const LIST_NBYTES: i32 = 4;

const CHAR_FF: char = '\u{c}';
const CHAR_SI: char = '\u{f}';
const CHAR_DC2: char = '\u{12}';

/// Symbol dump modes set by `.syms`: off, globals, globals + locals.
pub const SYMS_OFF: u8 = 0;
pub const SYMS_ON: u8 = 1;
pub const SYMS_FULL: u8 = 2;

#[derive(Debug)]
pub struct Listing {
    pub enabled: bool,
    pub syms: u8,
    pub plength: i32,
    pub pwidth: i32,
    printer: bool,
    product: String,
    out: String,
    lnr: u32,
    pnr: u32,
    pln: i32,
    pc: u32,
    oc: u32,
    title: Option<String>,
    subttl: Option<String>,
}

impl Listing {
    pub fn new(enabled: bool, printer: bool, syms: u8, product: String) -> Self {
        Listing {
            enabled,
            syms,
            plength: LIST_PLENGTH,
            pwidth: LIST_PWIDTH,
            printer,
            product,
            out: String::new(),
            lnr: 1,
            pnr: 0,
            pln: 0,
            pc: 0,
            oc: 0,
            title: None,
            subttl: None,
        }
    }

    /// Per-pass reset. Only pass 2 actually writes, but titles must not
    /// leak from one pass into the other.
    pub fn reset(&mut self) {
        self.out.clear();
        self.lnr = 1;
        self.pnr = 0;
        self.pln = 0;
        self.pc = 0;
        self.oc = 0;
        self.title = None;
        self.subttl = None;
    }

    pub fn set_title(&mut self, s: Option<String>) {
        self.title = s;
    }

    pub fn set_subtitle(&mut self, s: Option<String>) {
        self.subttl = s;
    }

    /// Snapshot of the program counter and output counter at the start
    /// of the next statement.
    pub fn save(&mut self, pc: u32, oc: u32) {
        self.pc = pc;
        self.oc = oc;
    }

    fn pad(s: &mut String, n: i32) {
        for _ in 0..n.max(0) {
            s.push(' ');
        }
    }

    /// Starts a new page: product/version/date/page line, then the
    /// title line with the current file name.
    pub fn page(&mut self, head: Option<&str>, file: &str) {
        if !self.enabled {
            return;
        }

        if self.printer && self.pnr == 0 && self.pwidth > 80 {
            self.out.push(CHAR_SI);
        }
        self.pnr += 1;

        let date = Local::now().format("%a %b %e %H:%M:%S %Y");
        let page = format!("{}    Page {}", date, self.pnr);

        if self.pnr > 1 {
            self.out.push(CHAR_FF);
        }
        let mut line = self.product.clone();
        Self::pad(
            &mut line,
            self.pwidth - (self.product.len() + page.len()) as i32,
        );
        line.push_str(&page);
        let _ = writeln!(self.out, "{}", line);

        let filestr = format!("File: {}", file);
        let mut head = match (head.or(self.title.as_deref()), self.subttl.as_deref()) {
            (Some(h), Some(s)) => format!("{} : {}", h, s),
            (Some(h), None) => h.to_string(),
            (None, Some(s)) => format!(" : {}", s),
            (None, None) => String::new(),
        };
        let room = (self.pwidth - filestr.len() as i32).max(0) as usize;
        if head.len() > room {
            head.truncate(room.saturating_sub(1));
        }
        let mut line = head.clone();
        Self::pad(
            &mut line,
            self.pwidth - (head.len() + filestr.len()) as i32,
        );
        line.push_str(&filestr);
        let _ = writeln!(self.out, "{}\n", line);

        // Three header lines plus margins.
        self.pln = self.plength - 6;
    }

    /// One statement's listing: line number, PC, up to four code bytes
    /// (overflow wraps), source line number with its active/skipped
    /// marker, and the raw source text. A directive with nothing emitted
    /// may show a synthesized annotation instead of code bytes.
    #[allow(clippy::too_many_arguments)]
    pub fn line(
        &mut self,
        src: &str,
        line_no: u32,
        active: bool,
        note: Option<&str>,
        image: &[u8],
        total: u32,
        file: &str,
    ) {
        if !self.enabled {
            return;
        }

        let mut first = true;
        loop {
            if self.pln <= 0 {
                self.page(None, file);
            }

            let _ = write!(self.out, "{:05} {:06X}", self.lnr, self.pc);
            self.lnr += 1;

            let mut count = LIST_NBYTES * 3;
            if self.oc < total {
                while self.oc < total && count > 0 {
                    let b = image.get(self.oc as usize).copied().unwrap_or(0);
                    let _ = write!(self.out, " {:02X}", b);
                    self.oc += 1;
                    self.pc = self.pc.wrapping_add(1);
                    count -= 3;
                }
            } else if first {
                if let Some(n) = note {
                    self.out.push(' ');
                    count -= 1;
                    for ch in n.chars() {
                        if count == 0 {
                            break;
                        }
                        self.out.push(ch);
                        count -= 1;
                    }
                }
            }
            Self::pad(&mut self.out, count);

            let _ = write!(
                self.out,
                "{:6}{} ",
                line_no,
                if active { ':' } else { '-' }
            );
            if first {
                self.out.push_str(src);
            }
            self.out.push('\n');

            if self.plength != 255 {
                self.pln -= 1;
            }

            first = false;
            if self.oc >= total {
                break;
            }
        }
    }

    /// Appends the symbol table dump on a fresh page.
    pub fn append_symbols(&mut self, table: &SymbolTable, files: &FileRegistry, verbose: bool) {
        if !self.enabled || self.syms == SYMS_OFF {
            return;
        }

        self.page(Some("** SYMBOL TABLE **"), files.name(0));
        if table.is_empty() {
            self.out.push_str("No symbols defined.\n");
            return;
        }

        let full = self.syms == SYMS_FULL;
        let text = symbols_text(table, files, verbose, full);
        for line in text.lines() {
            if self.pln <= 0 {
                self.page(Some("** SYMBOL TABLE **"), files.name(0));
            }
            let _ = writeln!(self.out, "{}", line);
            if self.plength != 255 {
                self.pln -= 1;
            }
        }
    }

    /// Final printer reset.
    pub fn close(&mut self) {
        if self.enabled && self.printer && self.pwidth > 80 && self.pnr > 0 {
            self.out.push(CHAR_DC2);
        }
    }

    pub fn take(&mut self) -> Option<String> {
        if self.enabled {
            Some(std::mem::take(&mut self.out))
        } else {
            None
        }
    }
}

fn location(files: &FileRegistry, file: Option<usize>, line: u32) -> String {
    match file {
        Some(f) if line != 0 => format!("{}:{}", files.name(f), line),
        _ => "-command line-".to_string(),
    }
}

/// Renders the symbol table as plain text, one symbol per line, locals
/// indented under their parents in full mode. Double-underscore names
/// are internal and stay hidden unless verbose.
pub fn symbols_text(
    table: &SymbolTable,
    files: &FileRegistry,
    verbose: bool,
    full: bool,
) -> String {
    let mut out = String::new();

    for sym in table.iter() {
        if !verbose && sym.name.starts_with("__") {
            continue;
        }

        let _ = write!(out, "{:<32} {} ", sym.name, sym.kind.tag());
        if sym.value.defined {
            let _ = write!(out, "{:>9} ", sym.value.print());
            if sym.kind == SymKind::Variable {
                out.push(sym.value.width.tag());
            } else {
                out.push(' ');
            }
            let _ = write!(out, "        {}", location(files, sym.file, sym.line));
        } else {
            let _ = write!(out, "{:>9}", "??");
        }
        out.push('\n');

        if full && sym.kind == SymKind::Label {
            for loc in sym.locals.iter() {
                let _ = writeln!(
                    out,
                    "  @{:<29} {} {:>9}          {}",
                    loc.name,
                    loc.kind.tag(),
                    loc.value.print(),
                    location(files, loc.file, loc.line)
                );
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_disabled_listing_stays_empty() {
        let mut l = Listing::new(false, false, SYMS_OFF, "vasm test".into());
        l.line("lda #1", 1, true, None, &[0xa9, 0x01], 2, "t.asm");
        assert_eq!(l.take(), None);
    }

    #[test]
    fn test_line_layout() {
        let mut l = Listing::new(true, false, SYMS_OFF, "vasm test".into());
        l.save(0xc000, 0);
        l.line("start: lda #$41", 3, true, None, &[0xa9, 0x41], 2, "t.asm");
        let out = l.take().unwrap();
        let line = out.lines().last().unwrap();
        assert!(line.starts_with("00001 00C000 A9 41"));
        assert!(line.contains("     3: start: lda #$41"));
    }

    #[test]
    fn test_overflow_bytes_wrap() {
        let mut l = Listing::new(true, false, SYMS_OFF, "vasm test".into());
        let bytes = [1u8, 2, 3, 4, 5, 6];
        l.save(0, 0);
        l.line(".byte 1,2,3,4,5,6", 1, true, None, &bytes, 6, "t.asm");
        let out = l.take().unwrap();
        let body: Vec<&str> = out
            .lines()
            .filter(|l| l.starts_with("0000"))
            .collect();
        assert_eq!(body.len(), 2);
        assert!(body[0].contains("01 02 03 04"));
        assert!(body[1].contains("05 06"));
        // Source text only on the first row.
        assert!(body[0].contains(".byte"));
        assert!(!body[1].contains(".byte"));
    }

    #[test]
    fn test_skipped_line_marker() {
        let mut l = Listing::new(true, false, SYMS_OFF, "vasm test".into());
        l.line(".byte 9", 7, false, None, &[], 0, "t.asm");
        let out = l.take().unwrap();
        assert!(out.lines().last().unwrap().contains("     7- .byte 9"));
    }

    #[test]
    fn test_note_replaces_bytes() {
        let mut l = Listing::new(true, false, SYMS_OFF, "vasm test".into());
        l.line("five = 5", 1, true, Some("= 05"), &[], 0, "t.asm");
        let out = l.take().unwrap();
        assert!(out.lines().last().unwrap().contains(" = 05"));
    }

    #[test]
    fn test_symbols_text_hides_internal_names() {
        let mut table = SymbolTable::default();
        table
            .define_variable("__VASM__", Value::byte(1), false, 1, false, None)
            .unwrap();
        table
            .define_variable("seen", Value::byte(2), false, 1, false, None)
            .unwrap();
        let files = FileRegistry::default();
        let text = symbols_text(&table, &files, false, false);
        assert!(!text.contains("__VASM__"));
        assert!(text.contains("seen"));
        let text = symbols_text(&table, &files, true, false);
        assert!(text.contains("__VASM__"));
    }
}
