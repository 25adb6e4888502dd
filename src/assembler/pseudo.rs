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

//! The directive (pseudo-op) engine.
//!
//! Directives are dispatched through a table keyed by upper-cased name.
//! Entries flagged `always` run even while a false conditional is being
//! skipped; `dotted` entries are only recognized with the `.` prefix;
//! `rpt` marks the repeat pair, which must stay live while a zero-count
//! repeat body is skipped.

use std::path::Path;

use super::symbol_table::SymKind;
use super::{Assembler, MAX_IF_LEVEL, MAX_RPT_LEVEL, Repeat, expr, macros};
use crate::errors::{AsmError, AsmResult, ErrorKind};
use crate::source::{EOF_CHAR, is_end};
use crate::value::{Value, ValueFormat, Width, print_format, value_format};

pub type PseudoFn = fn(&mut Assembler, &mut usize, u8) -> AsmResult<()>;
pub type ListFn = fn(&Assembler) -> String;

pub struct Pseudo {
    pub name: &'static str,
    pub always: bool,
    pub dotted: bool,
    pub rpt: bool,
    pub exec: PseudoFn,
    pub list: Option<ListFn>,
}

const fn p(name: &'static str, always: bool, dotted: bool, exec: PseudoFn) -> Pseudo {
    Pseudo {
        name,
        always,
        dotted,
        rpt: false,
        exec,
        list: None,
    }
}

const fn pl(name: &'static str, exec: PseudoFn, list: ListFn) -> Pseudo {
    Pseudo {
        name,
        always: false,
        dotted: false,
        rpt: false,
        exec,
        list: Some(list),
    }
}

const fn pr(name: &'static str, exec: PseudoFn) -> Pseudo {
    Pseudo {
        name,
        always: false,
        dotted: false,
        rpt: true,
        exec,
        list: None,
    }
}

static PSEUDOS: &[Pseudo] = &[
    p("ALIGN", false, false, do_align),
    p("ASCII", false, true, do_byte),
    p("ASCIIZ", false, true, do_asciz),
    p("ASCIZ", false, true, do_asciz),
    p("ASSERT", false, true, do_assert),
    p("BINARY", false, true, do_blob),
    p("BLOB", false, true, do_blob),
    p("BYTE", false, false, do_byte),
    p("CPU", false, true, do_cpu),
    p("DATA", false, true, do_byte),
    p("DB", false, false, do_byte),
    pl("DEFINE", do_define, do_define_list),
    p("DL", false, false, do_dword),
    p("DS", false, false, do_fill),
    p("DW", false, false, do_word),
    p("DWORD", false, false, do_dword),
    p("ECHO", false, true, do_echo),
    p("ELSE", true, false, do_else),
    pl("END", do_end, do_end_list),
    p("ENDIF", true, false, do_endif),
    p("ENDM", false, false, macros::do_endm),
    pr("ENDREP", do_endrep),
    pl("EQU", do_equ, do_equ_list),
    p("ERROR", false, true, do_error),
    p("FI", true, false, do_endif),
    p("FILL", false, true, do_fill),
    p("IF", true, false, do_if),
    p("IFDEF", true, false, do_ifdef),
    p("IFN", true, false, do_ifn),
    p("IFNDEF", true, false, do_ifndef),
    p("INCLUDE", false, false, do_include),
    p("MACRO", false, false, macros::do_macro),
    p("NOFILL", false, false, do_nofill),
    pl("ORG", do_org, do_org_list),
    p("PAGE", false, false, do_page),
    p("RADIX", false, false, do_radix),
    p("RADX", false, false, do_radix),
    pr("REPEAT", do_repeat),
    p("SBTTL", false, false, do_subttl),
    p("STITLE", false, false, do_subttl),
    p("STR", false, true, do_byte),
    p("STRING", false, true, do_byte),
    p("SUBTTL", false, false, do_subttl),
    p("SYM", false, false, do_syms),
    p("SYMS", false, false, do_syms),
    p("TITLE", false, false, do_title),
    p("WARN", false, true, do_warn),
    p("WARNING", false, true, do_warn),
    p("WIDTH", false, false, do_width),
    p("WORD", false, false, do_word),
];

/// Statement-form shorthands (`*= expr`, `sym = expr`) dispatch through
/// these entries so their listing annotations match the spelled-out
/// directives.
pub static ORG_STMT: Pseudo = pl("ORG", do_org, do_org_list);
pub static EQU_STMT: Pseudo = pl("EQU", do_equ, do_equ_list);

/// Looks a directive up by name. Dot-only directives are invisible
/// without their dot.
pub fn is_pseudo(name: &str, dot: bool) -> Option<&'static Pseudo> {
    let id = name.to_ascii_uppercase();
    let op = PSEUDOS.iter().find(|op| op.name == id)?;
    if op.dotted && !dot {
        return None;
    }
    Some(op)
}

/// The `.align [count]` directive: pad with zero bytes to a 1/2/4/8
/// boundary.
fn do_align(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    let mut count: u32 = 2;

    asm.text.skip_white(p);
    if !is_end(asm.text.at(*p)) {
        let v = expr::expr(asm, p)?;
        if pass == 2 && !v.defined {
            return Err(ErrorKind::Undefined.into());
        }
        count = v.v;
    }

    if !matches!(count, 1 | 2 | 4 | 8) {
        return Err(ErrorKind::Range.into());
    }

    let mask = count - 1;
    while asm.pc & mask != 0 {
        asm.output.emit_byte(0x00, pass);
        asm.pc = asm.pc.wrapping_add(1);
    }

    Ok(())
}

/// The `.asciz "string"[,"string",...]` directive: NUL-terminated
/// strings.
fn do_asciz(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    loop {
        asm.text.skip_white(p);
        if asm.text.at(*p) != b'"' {
            return Err(ErrorKind::StringExpected.into());
        }
        let s = asm.text.string_lit(p, true)?;
        asm.output.emit_str(&s, pass);
        asm.pc = asm.pc.wrapping_add(s.len() as u32);
        asm.output.emit_byte(0x00, pass);
        asm.pc = asm.pc.wrapping_add(1);

        asm.text.skip_white(p);
        if asm.text.at(*p) != b',' {
            break;
        }
        asm.text.skip_curr_and_white(p);
    }

    Ok(())
}

/// The `.assert <expr>` directive.
fn do_assert(asm: &mut Assembler, p: &mut usize, _pass: u8) -> AsmResult<()> {
    asm.text.skip_white_and_comment(p);
    if is_end(asm.text.at(*p)) {
        return Err(ErrorKind::EolExpected.into());
    }

    let v = expr::expr(asm, p)?;
    if !v.defined || v.v == 0 {
        return Err(ErrorKind::AssertFailed.into());
    }

    Ok(())
}

/// The `.blob <filename>[,[skip][,count]]` directive: inline a byte
/// file.
fn do_blob(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    asm.text.skip_white(p);
    let filename = asm.text.string_lit(p, true)?;
    asm.text.skip_white_and_comment(p);

    let mut skip: usize = 0;
    let mut count: usize = 0;
    if asm.text.at(*p) == b',' {
        asm.text.skip_curr_and_white(p);
        if !is_end(asm.text.at(*p)) && asm.text.at(*p) != b',' {
            let v = expr::expr(asm, p)?;
            if !v.defined {
                return Err(ErrorKind::Undefined.into());
            }
            skip = v.v as usize;
        }

        asm.text.skip_white(p);
        if asm.text.at(*p) == b',' {
            asm.text.skip_curr_and_white(p);
            let v = expr::expr(asm, p)?;
            if !v.defined {
                return Err(ErrorKind::Undefined.into());
            }
            count = v.v as usize;
        }
    }

    let data = asm
        .reader
        .read_bytes(Path::new(&filename))
        .map_err(|_| AsmError::hint(ErrorKind::FileOpen, &filename))?;

    let slice = data.iter().skip(skip);
    let take = if count > 0 { count } else { usize::MAX };
    for &b in slice.take(take) {
        asm.output.emit_byte(b, pass);
        asm.pc = asm.pc.wrapping_add(1);
    }

    Ok(())
}

/// The `.byte <data>[,<data>,...]` directive: expressions, strings, and
/// character constants.
fn do_byte(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    loop {
        asm.text.skip_white(p);

        match asm.text.at(*p) {
            b'"' => {
                let s = asm.text.string_lit(p, true)?;
                asm.output.emit_str(&s, pass);
                asm.pc = asm.pc.wrapping_add(s.len() as u32);
            }
            b'\'' => {
                *p += 1;
                if asm.text.at(*p) == b'\'' {
                    return Err(ErrorKind::MalformedChar.into());
                }
                let c = asm.text.at(*p);
                *p += 1;
                if asm.text.at(*p) != b'\'' {
                    return Err(ErrorKind::CharUnterminated.into());
                }
                *p += 1;
                asm.output.emit_byte(c, pass);
                asm.pc = asm.pc.wrapping_add(1);
            }
            _ => {
                let v = expr::expr(asm, p)?;
                if pass == 2 {
                    if !v.defined {
                        return Err(ErrorKind::Undefined.into());
                    }
                    if v.width != Width::Byte && v.v > 0xff {
                        return Err(ErrorKind::IllegalType.into());
                    }
                }
                asm.output.emit_byte(v.to_byte(false)?.v as u8, pass);
                asm.pc = asm.pc.wrapping_add(1);
            }
        }

        asm.text.skip_white(p);
        if asm.text.at(*p) != b',' {
            break;
        }
        asm.text.skip_curr_and_white(p);
    }

    Ok(())
}

/// The `.cpu <name>` directive. The name may be quoted.
fn do_cpu(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    asm.text.skip_white_and_comment(p);
    if is_end(asm.text.at(*p)) {
        return Err(ErrorKind::IdExpected.into());
    }

    let name = if asm.text.at(*p) == b'"' {
        asm.text.string_lit(p, true)?
    } else {
        asm.text.nident_upcase(p)?
    };

    if !crate::target::set_cpu(asm, &name, pass) {
        return Err(AsmError::hint(ErrorKind::UnknownCpu, &name));
    }

    Ok(())
}

/// The `.define name[=expr]` directive; the value defaults to byte 1.
fn do_define(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    asm.text.skip_white(p);
    let id = asm.text.ident(p)?;

    asm.text.skip_white(p);
    let mut v = Value::byte(1);
    if asm.text.at(*p) == b'=' {
        *p += 1;
        asm.text.skip_white(p);
        if !is_end(asm.text.at(*p)) {
            v = expr::expr(asm, p)?;
        }
    }

    asm.define_var(&id, v, false, pass)?;
    asm.last_define = Some(id);

    Ok(())
}

fn do_define_list(asm: &Assembler) -> String {
    let ci = asm.opts.case_insensitive;
    match asm
        .last_define
        .as_deref()
        .and_then(|n| asm.symbols.lookup(n, ci))
    {
        Some(sym) => format!("= {}", sym.value.print()),
        None => String::new(),
    }
}

/// The `.dword <data>[,<data>,...]` directive: little-endian 32-bit.
fn do_dword(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    loop {
        asm.text.skip_white(p);

        let v = expr::expr(asm, p)?;
        if pass == 2 && !v.defined {
            return Err(ErrorKind::Undefined.into());
        }
        asm.output.emit_dword_le(v.v, pass);
        asm.pc = asm.pc.wrapping_add(4);

        asm.text.skip_white(p);
        if asm.text.at(*p) != b',' {
            break;
        }
        asm.text.skip_curr_and_white(p);
    }

    Ok(())
}

/// The `.echo [<expr>[,<expr>,...]]` directive: pass-1 console output.
fn do_echo(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    if pass == 2 {
        asm.text.skip_to_eol(p);
        return Ok(());
    }

    let line = echo_text(asm, p)?;
    println!("{}", line);

    Ok(())
}

/// Shared piece builder for ECHO, WARN, and ERROR: strings are copied,
/// expressions are rendered in an optional `[c]` format.
fn echo_text(asm: &mut Assembler, p: &mut usize) -> AsmResult<String> {
    let mut out = String::new();

    loop {
        asm.text.skip_white(p);
        if asm.text.at(*p) == b'"' {
            out.push_str(&asm.text.string_lit(p, true)?);
        } else {
            let fmt = value_format(&asm.text, p)?.unwrap_or(ValueFormat::Dec);
            let v = expr::expr(asm, p)?;
            if v.defined {
                out.push_str(&print_format(v, fmt));
            } else {
                out.push_str("??");
            }
        }

        asm.text.skip_white(p);
        if asm.text.at(*p) != b',' {
            break;
        }
        asm.text.skip_curr_and_white(p);
    }

    Ok(out)
}

/// The `.else` directive. An outer skip stays a skip.
fn do_else(asm: &mut Assembler, p: &mut usize, _pass: u8) -> AsmResult<()> {
    asm.text.skip_white_and_comment(p);
    if !is_end(asm.text.at(*p)) {
        return Err(ErrorKind::EolExpected.into());
    }

    match asm.if_stack.last() {
        Some(&outer) => asm.new_ifstate = outer && !asm.ifstate,
        None => return Err(ErrorKind::ElseWithoutIf.into()),
    }

    Ok(())
}

/// The `.end [<start_address>]` directive: record the start address and
/// read out the rest of the current file.
fn do_end(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    asm.text.skip_white(p);
    if !is_end(asm.text.at(*p)) {
        let v = expr::expr(asm, p)?;
        if pass == 2 && !v.defined {
            return Err(ErrorKind::Undefined.into());
        }
        asm.sa = v.v;
        asm.output.set_start(asm.sa, pass);
    }

    while asm.text.at(*p) != 0 && asm.text.at(*p) != EOF_CHAR {
        *p += 1;
    }
    asm.found_end = true;

    Ok(())
}

fn do_end_list(asm: &Assembler) -> String {
    format!("$= {:06X}", asm.sa)
}

/// The `.endif` directive.
fn do_endif(asm: &mut Assembler, p: &mut usize, _pass: u8) -> AsmResult<()> {
    asm.text.skip_white_and_comment(p);
    if !is_end(asm.text.at(*p)) {
        return Err(ErrorKind::EolExpected.into());
    }

    match asm.if_stack.pop() {
        Some(outer) => {
            asm.ifstate = outer;
            asm.new_ifstate = outer;
        }
        None => return Err(ErrorKind::EndifWithoutIf.into()),
    }

    Ok(())
}

/// The `.endrep` directive: loop back while iterations remain.
fn do_endrep(asm: &mut Assembler, p: &mut usize, _pass: u8) -> AsmResult<()> {
    if asm.rpt_skip_nest > 0 {
        // Closes a REPEAT nested inside a skipped zero-count body.
        asm.rpt_skip_nest -= 1;
        return Ok(());
    }

    let file = asm.files.idx();
    let (count, pos, line) = match asm.rpt.last() {
        Some(top) if top.file == file => (top.count, top.pos, top.line),
        _ => return Err(ErrorKind::EndrepWithoutRepeat.into()),
    };

    if count > 1 {
        if let Some(top) = asm.rpt.last_mut() {
            top.count -= 1;
            top.repeating = true;
        }
        *p = pos;
        asm.line = line;
        asm.newline = line;
    } else {
        asm.rpt.pop();
    }

    asm.rptstate = false;
    asm.new_rptstate = asm.rpt.last().map_or(false, |r| r.count > 0);

    Ok(())
}

/// The `.equ <expr>` directive: re-define the current label as a
/// variable.
fn do_equ(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    let label = asm
        .current_label
        .clone()
        .ok_or(ErrorKind::LabelRequired)?;

    let v = expr::expr(asm, p)?;
    asm.define_var(&label, v, true, pass)?;

    Ok(())
}

fn do_equ_list(asm: &Assembler) -> String {
    let ci = asm.opts.case_insensitive;
    match asm
        .current_label
        .as_deref()
        .and_then(|n| asm.symbols.lookup(n, ci))
    {
        Some(sym) => format!("= {}", sym.value.print()),
        None => String::new(),
    }
}

/// The `.error ...` directive: a user-raised failure.
fn do_error(asm: &mut Assembler, p: &mut usize, _pass: u8) -> AsmResult<()> {
    let msg = echo_text(asm, p)?;
    Err(AsmError::hint(ErrorKind::User, msg))
}

/// The `.fill <count>[,<data>]` directive.
fn do_fill(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    let v = expr::expr(asm, p)?;
    if pass == 2 && !v.defined {
        return Err(ErrorKind::Undefined.into());
    }
    let count = v.v;

    let mut filler: u8 = 0x00;
    asm.text.skip_white(p);
    if asm.text.at(*p) == b',' {
        asm.text.skip_curr_and_white(p);
        let v = expr::expr(asm, p)?;
        if pass == 2 && !v.defined {
            return Err(ErrorKind::Undefined.into());
        }
        if v.width != Width::Byte {
            return Err(ErrorKind::IllegalType.into());
        }
        filler = v.v as u8;
    }

    for _ in 0..count {
        asm.output.emit_byte(filler, pass);
        asm.pc = asm.pc.wrapping_add(1);
    }

    Ok(())
}

fn push_if(asm: &mut Assembler, cond: bool) -> AsmResult<()> {
    if asm.if_stack.len() >= MAX_IF_LEVEL {
        return Err(ErrorKind::IfNestTooDeep.into());
    }
    asm.if_stack.push(asm.ifstate);
    // Inside a skipped region everything stays skipped.
    asm.new_ifstate = asm.ifstate && cond;
    Ok(())
}

/// The `.if <expr>` directive.
fn do_if(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    asm.text.skip_white(p);
    let v = expr::expr(asm, p)?;
    if pass == 2 && !v.defined {
        return Err(ErrorKind::Undefined.into());
    }
    push_if(asm, v.v != 0)
}

/// The `.ifn <expr>` directive.
fn do_ifn(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    asm.text.skip_white(p);
    let v = expr::expr(asm, p)?;
    if pass == 2 && !v.defined {
        return Err(ErrorKind::Undefined.into());
    }
    push_if(asm, v.v == 0)
}

/// Only defined variables count for IFDEF/IFNDEF.
fn defined_var(asm: &Assembler, id: &str) -> bool {
    let ci = asm.opts.case_insensitive;
    asm.symbols
        .lookup(id, ci)
        .map(|sym| sym.kind == SymKind::Variable && sym.value.defined)
        .unwrap_or(false)
}

/// The `.ifdef <name>` directive.
fn do_ifdef(asm: &mut Assembler, p: &mut usize, _pass: u8) -> AsmResult<()> {
    asm.text.skip_white(p);
    let id = asm.text.nident(p)?;
    let cond = defined_var(asm, &id);
    push_if(asm, cond)
}

/// The `.ifndef <name>` directive.
///
/// The decision is recorded on the tested symbol during pass 1 and
/// replayed in pass 2: a body that defines the very symbol under test
/// would otherwise flip the branch between passes. An unknown symbol is
/// acquired (undefined) just so the record has somewhere to live.
fn do_ifndef(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    asm.text.skip_white(p);
    let id = asm.text.nident(p)?;
    let ci = asm.opts.case_insensitive;

    let mut cond = !defined_var(asm, &id);
    if pass == 1 {
        asm.symbols.acquire(&id, ci).ifndef_pass1 = Some(cond);
    } else if let Some(saved) = asm.symbols.lookup(&id, ci).and_then(|s| s.ifndef_pass1) {
        cond = saved;
    }

    push_if(asm, cond)
}

/// The `.include "file"` directive. Pass 1 splices the file into the
/// source buffer right after this line, wrapped in EOF separators, and
/// registers it; pass 2 walks the already-flat buffer.
fn do_include(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    asm.text.skip_white(p);
    let filename = asm.text.string_lit(p, true)?;
    asm.text.skip_white_and_comment(p);
    if !is_end(asm.text.at(*p)) {
        return Err(ErrorKind::EolExpected.into());
    }

    if pass == 1 {
        let content = asm
            .reader
            .read_text(Path::new(&filename))
            .map_err(|_| AsmError::hint(ErrorKind::FileOpen, &filename))?;

        let mut q = *p;
        asm.text.skip_eol(&mut q);
        asm.text.splice_include(q, &content);
        asm.files.insert_include(&filename, asm.line + 1)?;
    }

    Ok(())
}

/// The `.nofill` directive: no autofill on origin changes.
fn do_nofill(asm: &mut Assembler, _p: &mut usize, _pass: u8) -> AsmResult<()> {
    asm.output.autofill = false;
    Ok(())
}

/// The `.org <address>` directive.
fn do_org(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    asm.text.skip_white(p);

    let v = expr::expr(asm, p)?;
    if pass == 2 && !v.defined {
        return Err(ErrorKind::Undefined.into());
    }

    asm.org = v.v;
    asm.pc = v.v;
    asm.output.set_address(asm.pc, pass)?;

    Ok(())
}

fn do_org_list(asm: &Assembler) -> String {
    format!("*= {:06X}", asm.pc)
}

/// The `.page [<length>[,<width>]]` directive; bare `.page` forces a
/// page break.
fn do_page(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    asm.text.skip_white_and_comment(p);
    if is_end(asm.text.at(*p)) {
        if pass == 2 {
            asm.list_page_now();
        }
        return Ok(());
    }

    if asm.text.at(*p) != b',' {
        let v = expr::expr(asm, p)?;
        asm.text.skip_white(p);
        if pass == 2 && !v.defined {
            return Err(ErrorKind::Undefined.into());
        }
        asm.listing.plength = v.v as i32;
    }

    if asm.text.at(*p) == b',' {
        asm.text.skip_curr_and_white(p);
        let v = expr::expr(asm, p)?;
        if pass == 2 && !v.defined {
            return Err(ErrorKind::Undefined.into());
        }
        asm.listing.pwidth = v.v as i32;
    }

    Ok(())
}

/// The `.radix [2|8|10|16]` directive. The argument is always read in
/// decimal; a bare `.radix` resets to decimal.
fn do_radix(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    asm.text.skip_white_and_comment(p);
    asm.radix = 10;
    if is_end(asm.text.at(*p)) {
        if asm.opts.verbose > 0 && pass == 1 {
            println!("Resetting radix to {}", asm.radix);
        }
        return Ok(());
    }

    asm.text.skip_white(p);
    let v = expr::expr(asm, p)?;
    if pass == 2 && !v.defined {
        return Err(ErrorKind::Undefined.into());
    }
    if !matches!(v.v, 2 | 8 | 10 | 16) {
        return Err(ErrorKind::Range.into());
    }

    asm.radix = v.v;
    if asm.opts.verbose > 0 && pass == 1 {
        println!("Setting radix to {}", asm.radix);
    }

    Ok(())
}

/// The `.repeat <count>` directive.
fn do_repeat(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    if asm.rpt_skipping() {
        // The whole body is being skipped; just track nesting.
        asm.rpt_skip_nest += 1;
        return Ok(());
    }

    if asm.rpt.len() >= MAX_RPT_LEVEL {
        return Err(ErrorKind::RepeatNestTooDeep.into());
    }

    asm.text.skip_white(p);
    let v = expr::expr(asm, p)?;
    if pass == 2 && !v.defined {
        return Err(ErrorKind::Undefined.into());
    }

    // The body restarts at this line's end; remember it.
    let pt = *p;
    asm.text.skip_white_and_comment(p);
    asm.rpt.push(Repeat {
        file: asm.files.idx(),
        line: asm.line + 1,
        pos: *p,
        count: v.v,
        repeating: false,
    });
    *p = pt;

    asm.new_rptstate = v.v > 0;
    asm.rptstate = asm.new_rptstate;

    Ok(())
}

/// The `.subttl <text>` directive.
fn do_subttl(asm: &mut Assembler, p: &mut usize, _pass: u8) -> AsmResult<()> {
    asm.text.skip_white(p);
    let s = asm.text.string_lit(p, false)?;
    asm.listing.set_subtitle(Some(s));
    Ok(())
}

/// The `.syms [off|on|full]` directive.
fn do_syms(asm: &mut Assembler, p: &mut usize, _pass: u8) -> AsmResult<()> {
    let mut mode = crate::listing::SYMS_OFF;

    asm.text.skip_white_and_comment(p);
    if !is_end(asm.text.at(*p)) {
        let id = asm.text.nident_upcase(p)?;
        mode = match id.as_str() {
            "OFF" => crate::listing::SYMS_OFF,
            "ON" => crate::listing::SYMS_ON,
            "FULL" => crate::listing::SYMS_FULL,
            _ => return Err(ErrorKind::StringExpected.into()),
        };
    }

    asm.listing.syms = mode;
    Ok(())
}

/// The `.title <text>` directive.
fn do_title(asm: &mut Assembler, p: &mut usize, _pass: u8) -> AsmResult<()> {
    asm.text.skip_white(p);
    let s = asm.text.string_lit(p, false)?;
    asm.listing.set_title(Some(s));
    Ok(())
}

/// The `.warn ...` directive: pass-2 console output.
fn do_warn(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    if pass == 1 {
        asm.text.skip_to_eol(p);
        return Ok(());
    }

    let msg = echo_text(asm, p)?;
    println!("*** WARNING: {}", msg);

    Ok(())
}

/// The `.width <chars>` directive.
fn do_width(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    asm.text.skip_white_and_comment(p);
    if is_end(asm.text.at(*p)) {
        return Err(ErrorKind::EolExpected.into());
    }

    let v = expr::expr(asm, p)?;
    if pass == 2 && !v.defined {
        return Err(ErrorKind::Undefined.into());
    }
    asm.listing.pwidth = v.v as i32;

    Ok(())
}

/// The `.word <data>[,<data>,...]` directive: little-endian 16-bit.
fn do_word(asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<()> {
    loop {
        asm.text.skip_white(p);

        let v = expr::expr(asm, p)?;
        if pass == 2 && !v.defined {
            return Err(ErrorKind::Undefined.into());
        }
        asm.output.emit_word_le(v.v as u16, pass);
        asm.pc = asm.pc.wrapping_add(2);

        asm.text.skip_white(p);
        if asm.text.at(*p) != b',' {
            break;
        }
        asm.text.skip_curr_and_white(p);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_honors_dot_flag() {
        assert!(is_pseudo("byte", false).is_some());
        assert!(is_pseudo("BYTE", true).is_some());
        // FILL is dot-only.
        assert!(is_pseudo("FILL", false).is_none());
        assert!(is_pseudo("FILL", true).is_some());
        assert!(is_pseudo("nosuch", true).is_none());
    }

    #[test]
    fn test_conditionals_are_always_live() {
        for name in ["IF", "IFDEF", "IFN", "IFNDEF", "ELSE", "ENDIF", "FI"] {
            assert!(is_pseudo(name, false).unwrap().always, "{name}");
        }
        assert!(!is_pseudo("BYTE", false).unwrap().always);
    }
}
