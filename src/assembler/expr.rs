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

//! Recursive-descent expression evaluation.
//!
//! Levels, loosest binding first: `expr` (unary prefixes and width
//! casts), `compare`, `term`, `product`, `primary`, `number`. Undefined
//! symbol references never abort an evaluation; they taint the result,
//! and pass-2 callers that need a definite value check the flag.

use super::symbol_table::SymKind;
use super::{Assembler, func};
use crate::errors::{AsmError, AsmResult, ErrorKind};
use crate::source::{ALPHA_CHAR, DOT_CHAR, is_end, is_ident_extra};
use crate::value::{Value, Width};

fn digit(b: u8) -> u32 {
    match b {
        b'0'..=b'9' => (b - b'0') as u32,
        b'A'..=b'F' => (b - b'A' + 10) as u32,
        _ => (b - b'a' + 10) as u32,
    }
}

fn width_for_digits(digits: u32, byte_max: u32, word_max: u32) -> Width {
    if digits > word_max {
        Width::Dword
    } else if digits > byte_max {
        Width::Word
    } else {
        Width::Byte
    }
}

fn dec_digits(asm: &Assembler, p: &mut usize) -> AsmResult<Value> {
    if !asm.text.at(*p).is_ascii_digit() {
        return Err(ErrorKind::ValueExpected.into());
    }
    let mut v: u32 = 0;
    while asm.text.at(*p).is_ascii_digit() {
        v = v.wrapping_mul(10).wrapping_add(digit(asm.text.at(*p)));
        *p += 1;
    }
    Ok(Value::num(v))
}

fn oct_digits(asm: &Assembler, p: &mut usize) -> AsmResult<Value> {
    if !(b'0'..=b'7').contains(&asm.text.at(*p)) {
        return Err(ErrorKind::ValueExpected.into());
    }
    let mut v: u32 = 0;
    let mut digits = 0;
    while (b'0'..=b'7').contains(&asm.text.at(*p)) {
        v = v.wrapping_mul(8).wrapping_add(digit(asm.text.at(*p)));
        *p += 1;
        digits += 1;
    }
    Ok(Value {
        v,
        width: width_for_digits(digits, 3, 6),
        defined: true,
    })
}

fn hex_digits(asm: &Assembler, p: &mut usize) -> AsmResult<Value> {
    if !asm.text.at(*p).is_ascii_hexdigit() {
        return Err(ErrorKind::ValueExpected.into());
    }
    let mut v: u32 = 0;
    let mut digits = 0;
    while asm.text.at(*p).is_ascii_hexdigit() {
        v = (v << 4).wrapping_add(digit(asm.text.at(*p)));
        *p += 1;
        digits += 1;
    }
    Ok(Value {
        v,
        width: width_for_digits(digits, 2, 4),
        defined: true,
    })
}

fn bin_digits(asm: &Assembler, p: &mut usize) -> AsmResult<Value> {
    let b = asm.text.at(*p);
    if b != b'0' && b != b'1' {
        return Err(ErrorKind::ValueExpected.into());
    }
    let mut v: u32 = 0;
    let mut digits = 0;
    while matches!(asm.text.at(*p), b'0' | b'1') {
        v = (v << 1).wrapping_add(digit(asm.text.at(*p)));
        *p += 1;
        digits += 1;
    }
    Ok(Value {
        v,
        width: width_for_digits(digits, 8, 16),
        defined: true,
    })
}

/// A number in some radix. Prefixes `&` (decimal), `\` (octal), `$`
/// (hex), `%` (binary) and the C-style `0x` are always recognized; a
/// leading `0` also accepts the old `0..H` hex form; anything else is
/// read in the current default radix.
fn number(asm: &Assembler, p: &mut usize) -> AsmResult<Value> {
    match asm.text.at(*p) {
        b'&' => {
            *p += 1;
            dec_digits(asm, p)
        }
        b'\\' => {
            *p += 1;
            oct_digits(asm, p)
        }
        b'$' => {
            *p += 1;
            hex_digits(asm, p)
        }
        b'%' => {
            *p += 1;
            bin_digits(asm, p)
        }
        b'0' => {
            *p += 1;
            if matches!(asm.text.at(*p), b'x' | b'X') {
                *p += 1;
                return hex_digits(asm, p);
            }

            // Old-style "0..H"; the suffix is quietly accepted. A lone
            // zero falls out of the loop with no digits.
            let mut v: u32 = 0;
            let mut digits = 0;
            while asm.text.at(*p).is_ascii_hexdigit() {
                v = (v << 4).wrapping_add(digit(asm.text.at(*p)));
                *p += 1;
                digits += 1;
            }
            if matches!(asm.text.at(*p), b'h' | b'H') {
                *p += 1;
            }
            Ok(Value {
                v,
                width: width_for_digits(digits, 2, 4),
                defined: true,
            })
        }
        _ => match asm.radix {
            2 => bin_digits(asm, p),
            8 => oct_digits(asm, p),
            16 => hex_digits(asm, p),
            _ => dec_digits(asm, p),
        },
    }
}

fn pc_value(asm: &Assembler) -> Value {
    Value {
        v: asm.pc,
        width: Width::Word,
        defined: true,
    }
}

/// A primary operand: a parenthesized expression, a function call, a
/// local or dot label, the program counter, a character constant, a
/// quoted hex string, a symbol reference, or a plain number. Unknown
/// symbols become undefined forward references rather than errors.
fn primary(asm: &mut Assembler, p: &mut usize, label: bool) -> AsmResult<Value> {
    asm.text.skip_white(p);

    let b = asm.text.at(*p);
    let ci = asm.opts.case_insensitive;

    if b == b'(' {
        *p += 1;
        let res = expr(asm, p)?;
        asm.text.skip_white(p);
        if asm.text.at(*p) != b')' {
            return Err(ErrorKind::UnbalancedParens.into());
        }
        *p += 1;
        return Ok(res);
    }

    if b == DOT_CHAR {
        *p += 1;
        if asm.text.at(*p).is_ascii_alphabetic() {
            let after_dot = *p;
            let id = asm.text.ident_upcase(p)?;
            if asm.text.at(*p) == b'(' {
                *p += 1;
                let res = func::function(asm, &id, p)?
                    .ok_or_else(|| AsmError::hint(ErrorKind::Expression, &id))?;
                if asm.text.at(*p) != b')' {
                    return Err(ErrorKind::OperatorIncomplete.into());
                }
                *p += 1;
                return Ok(res);
            }
            *p = after_dot;
        }

        let c = asm.text.at(*p);
        if c.is_ascii_alphanumeric() || is_ident_extra(c) {
            // Dot label: resolves under the mangled "parent.name" form.
            let parent = asm
                .current_label
                .clone()
                .ok_or(ErrorKind::LocalNeedsGlobal)?;
            *p -= 1;
            let id2 = asm.text.nident(p)?;
            if parent.len() + id2.len() > crate::source::ID_LEN {
                return Err(AsmError::hint(ErrorKind::IdTooLong, &id2));
            }
            let full = format!("{parent}{id2}");
            return Ok(match asm.symbols.lookup(&full, ci) {
                Some(sym) => sym.value,
                None => Value::undefined(Width::Byte),
            });
        }
        return Ok(pc_value(asm));
    }

    if b == ALPHA_CHAR {
        *p += 1;
        if asm.text.at(*p).is_ascii_alphanumeric() {
            let parent = asm
                .current_label
                .clone()
                .ok_or(ErrorKind::LocalNeedsGlobal)?;
            let id = asm.text.nident(p)?;
            let val = asm
                .symbols
                .lookup(&parent, ci)
                .and_then(|par| par.locals.lookup(&id, ci))
                .map(|sym| sym.value);
            return Ok(val.unwrap_or(Value::undefined(Width::Byte)));
        }
        return Ok(pc_value(asm));
    }

    if b == b'*' {
        *p += 1;
        return Ok(pc_value(asm));
    }

    if b == b'$' && !asm.text.at(*p + 1).is_ascii_hexdigit() {
        *p += 1;
        return Ok(pc_value(asm));
    }

    if b == b'\'' {
        *p += 1;
        let c = asm.text.at(*p);
        if is_end(c) || c < 0x20 {
            return Err(ErrorKind::MalformedChar.into());
        }
        *p += 1;
        if asm.text.at(*p) != b'\'' {
            return Err(ErrorKind::CharUnterminated.into());
        }
        *p += 1;
        return Ok(Value::byte(c as u32));
    }

    if (b == b'H' || b == b'X') && asm.text.at(*p + 1) == b'\'' {
        // H'0E' and X'0E' style hex constants.
        *p += 2;
        let res = hex_digits(asm, p)?;
        if asm.text.at(*p) == b'\'' {
            *p += 1;
        }
        return Ok(Value::num(res.v));
    }

    if b.is_ascii_alphabetic() || is_ident_extra(b) {
        let id = asm.text.nident(p)?;
        let pt = *p;
        if asm.text.at(*p) == b'(' {
            *p += 1;
            if let Some(res) = func::function(asm, &id, p)? {
                if asm.text.at(*p) != b')' {
                    return Err(ErrorKind::OperatorIncomplete.into());
                }
                *p += 1;
                return Ok(res);
            }
            // Not a function after all; fall back to a symbol reference.
            *p = pt;
        }

        if let Some(sym) = asm.symbols.lookup(&id, ci) {
            return Ok(sym.value);
        }

        // Forward reference: remember it with the kind and width the
        // context implies, so both passes size operands identically.
        let sym = asm.symbols.acquire(&id, ci);
        if label {
            sym.kind = SymKind::Label;
            sym.value = Value::undefined(Width::Word);
        } else {
            sym.kind = SymKind::Variable;
            sym.value = Value::undefined(Width::Byte);
        }
        return Ok(sym.value);
    }

    number(asm, p)
}

/// Detected binary operator: canonical byte, extra byte for two-char
/// forms, and how many input bytes to consume.
struct Op {
    op: u8,
    op2: u8,
    len: usize,
}

fn product_op(asm: &Assembler, p: usize) -> Option<Op> {
    for (kw, op, op2) in [
        ("MOD ", b'%', 0),
        ("AND ", b'&', 0),
        ("ASL ", b'<', b'<'),
        ("SHL ", b'<', b'<'),
        ("ASR ", b'>', b'>'),
        ("SHR ", b'>', b'>'),
    ] {
        if asm.text.starts_with_kw(p, kw) {
            return Some(Op { op, op2, len: 4 });
        }
    }

    let op = asm.text.at(p);
    let op2 = asm.text.at(p + 1);
    match (op, op2) {
        (b'*', _) | (b'/', _) | (b'%', _) => Some(Op { op, op2: 0, len: 1 }),
        (b'&', n) if n != b'&' => Some(Op { op, op2: 0, len: 1 }),
        (b'<', b'<') | (b'>', b'>') | (b'?', b':') => Some(Op { op, op2, len: 2 }),
        _ => None,
    }
}

/// `*`, `/`, `%`/MOD, `&`/AND, `<<`, `>>`, and the undefined-default
/// operator `?:`.
fn product(asm: &mut Assembler, p: &mut usize) -> AsmResult<Value> {
    let mut res = primary(asm, p, true)?;

    loop {
        asm.text.skip_white(p);
        let Some(found) = product_op(asm, *p) else {
            break;
        };
        *p += found.len;

        let n2 = primary(asm, p, true)?;

        match (found.op, found.op2) {
            (b'*', _) => res.v = res.v.wrapping_mul(n2.v),
            (b'/', _) => {
                if n2.v == 0 {
                    return Err(ErrorKind::DivZero.into());
                }
                res.v /= n2.v;
            }
            (b'%', _) => {
                if n2.v == 0 {
                    return Err(ErrorKind::DivZero.into());
                }
                res.v %= n2.v;
            }
            (b'&', _) => res.v &= n2.v,
            (b'<', _) => res.v = res.v.checked_shl(n2.v).unwrap_or(0),
            (b'>', _) => res.v = res.v.checked_shr(n2.v).unwrap_or(0),
            (b'?', _) => {
                if !res.defined {
                    res = n2;
                }
            }
            _ => unreachable!(),
        }
        res.infer_width(n2);
        res.infer_defined(n2);
    }

    Ok(res)
}

fn term_op(asm: &Assembler, p: usize) -> Option<Op> {
    if asm.text.starts_with_kw(p, "OR ") {
        return Some(Op {
            op: b'|',
            op2: 0,
            len: 3,
        });
    }
    for kw in ["XOR ", "EOR "] {
        if asm.text.starts_with_kw(p, kw) {
            return Some(Op {
                op: b'^',
                op2: 0,
                len: 4,
            });
        }
    }

    let op = asm.text.at(p);
    let op2 = asm.text.at(p + 1);
    match (op, op2) {
        (b'+', _) | (b'-', _) | (b'^', _) => Some(Op { op, op2: 0, len: 1 }),
        (b'|', n) if n != b'|' => Some(Op { op, op2: 0, len: 1 }),
        _ => None,
    }
}

/// Unary sign, then `+`, `-`, `|`/OR, `^`/XOR/EOR.
fn term(asm: &mut Assembler, p: &mut usize) -> AsmResult<Value> {
    asm.text.skip_white(p);

    let mut res;
    if asm.text.at(*p) == b'-' {
        *p += 1;
        res = product(asm, p)?;
        res.v = res.v.wrapping_neg();
    } else {
        if asm.text.at(*p) == b'+' {
            *p += 1;
        }
        res = product(asm, p)?;
    }

    loop {
        asm.text.skip_white(p);
        let Some(found) = term_op(asm, *p) else {
            break;
        };
        *p += found.len;

        let n2 = product(asm, p)?;

        match found.op {
            b'+' => res.v = res.v.wrapping_add(n2.v),
            b'-' => res.v = res.v.wrapping_sub(n2.v),
            b'|' => res.v |= n2.v,
            b'^' => res.v ^= n2.v,
            _ => unreachable!(),
        }
        res.infer_width(n2);
        res.infer_defined(n2);
    }

    Ok(res)
}

/// `==`, `!=`, `<`, `<=`, `>`, `>=`, `||`, `&&`. Results are boolean
/// bytes.
fn compare(asm: &mut Assembler, p: &mut usize) -> AsmResult<Value> {
    let mut res = term(asm, p)?;

    loop {
        asm.text.skip_white(p);
        let op = asm.text.at(*p);
        let op2 = asm.text.at(*p + 1);

        let two = matches!(
            (op, op2),
            (b'=', b'=') | (b'!', b'=') | (b'<', b'=') | (b'>', b'=') | (b'|', b'|') | (b'&', b'&')
        );
        if !two && op != b'<' && op != b'>' {
            break;
        }
        *p += if two { 2 } else { 1 };

        // Logical OR and AND restart a whole expression on the right.
        let n2 = if op == b'|' || op == b'&' {
            expr(asm, p)?
        } else {
            term(asm, p)?
        };

        let hit = match (op, op2) {
            (b'=', _) => res.v == n2.v,
            (b'!', _) => res.v != n2.v,
            (b'<', b'=') => res.v <= n2.v,
            (b'<', _) => res.v < n2.v,
            (b'>', b'=') => res.v >= n2.v,
            (b'>', _) => res.v > n2.v,
            (b'|', _) => res.v != 0 || n2.v != 0,
            (b'&', _) => res.v != 0 && n2.v != 0,
            _ => unreachable!(),
        };
        res.v = hit as u32;
        res.infer_defined(n2);
        res.width = Width::Byte;
    }

    Ok(res)
}

/// Entry point: unary prefix operators and width casts, then the
/// comparison chain.
pub fn expr(asm: &mut Assembler, p: &mut usize) -> AsmResult<Value> {
    asm.text.skip_white(p);

    let op = asm.text.at(*p);
    let mut res;

    if op == b'>' {
        *p += 1;
        res = compare(asm, p)?;
        res.v = (res.v >> 8) & 0xff;
        res.width = Width::Byte;
    } else if op == b'<' {
        *p += 1;
        res = compare(asm, p)?;
        res.v &= 0xff;
        res.width = Width::Byte;
    } else if op == b'!' || asm.text.starts_with_kw(*p, "NOT ") {
        *p += if op == b'!' { 1 } else { 4 };
        res = term(asm, p)?;
        res.v = (res.v == 0) as u32;
        res.width = Width::Byte;
    } else if op == b'~' {
        *p += 1;
        res = term(asm, p)?;
        res.v = !res.v;
    } else if asm.text.starts_with_kw(*p, "[b]") {
        *p += 3;
        res = compare(asm, p)?.to_byte(false)?;
    } else if asm.text.starts_with_kw(*p, "[!b]") {
        *p += 4;
        res = expr(asm, p)?.to_byte(true)?;
    } else if asm.text.starts_with_kw(*p, "[d]") {
        *p += 3;
        res = compare(asm, p)?;
        res.width = Width::Dword;
    } else if asm.text.starts_with_kw(*p, "[w]") {
        *p += 3;
        res = compare(asm, p)?.to_word(false)?;
    } else if asm.text.starts_with_kw(*p, "[!w]") {
        *p += 4;
        res = expr(asm, p)?.to_word(true)?;
    } else {
        res = compare(asm, p)?;
    }

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Options;
    use crate::file_reader::MockFileReader;

    fn eval(src: &str) -> AsmResult<Value> {
        let reader = MockFileReader::default();
        let mut asm = Assembler::new(Options::default(), &reader);
        asm.set_source(src);
        let mut p = 0;
        expr(&mut asm, &mut p)
    }

    fn val(src: &str) -> u32 {
        eval(src).unwrap().v
    }

    #[test]
    fn test_radix_prefixes() {
        assert_eq!(val("$ff"), 255);
        assert_eq!(val("%1010"), 10);
        assert_eq!(val("\\17"), 15);
        assert_eq!(val("&42"), 42);
        assert_eq!(val("0x42"), 0x42);
        assert_eq!(val("0f0H"), 0xf0);
        assert_eq!(val("123"), 123);
        assert_eq!(val("H'0E'"), 0x0e);
    }

    #[test]
    fn test_number_widths() {
        assert_eq!(eval("$12").unwrap().width, Width::Byte);
        assert_eq!(eval("$0012").unwrap().width, Width::Word);
        assert_eq!(eval("$12345").unwrap().width, Width::Dword);
        assert_eq!(eval("%11111111").unwrap().width, Width::Byte);
        assert_eq!(eval("%111111111").unwrap().width, Width::Word);
        assert_eq!(eval("255").unwrap().width, Width::Byte);
        assert_eq!(eval("256").unwrap().width, Width::Word);
    }

    #[test]
    fn test_precedence_and_associativity() {
        assert_eq!(val("2+3*4"), 14);
        assert_eq!(val("10-2-3"), 5);
        assert_eq!(val("(2+3)*4"), 20);
        assert_eq!(val("16/4/2"), 2);
    }

    #[test]
    fn test_keyword_operators() {
        assert_eq!(val("7 MOD 4"), 3);
        assert_eq!(val("$f0 AND $1f"), 0x10);
        assert_eq!(val("1 SHL 4"), 16);
        assert_eq!(val("$12 XOR $02"), 0x10);
        assert_eq!(val("$10 OR 1"), 0x11);
    }

    #[test]
    fn test_unary_prefixes() {
        assert_eq!(val("<$1234"), 0x34);
        assert_eq!(val(">$1234"), 0x12);
        assert_eq!(val("!0"), 1);
        assert_eq!(val("!5"), 0);
        assert_eq!(val("~0"), 0xffffffff);
        assert_eq!(val("-1"), 0xffffffff);
    }

    #[test]
    fn test_casts() {
        assert_eq!(val("[!b]$1234"), 0x34);
        assert_eq!(eval("[w]$12").unwrap().width, Width::Word);
        assert_eq!(
            eval("[b]$1234").unwrap_err().kind,
            ErrorKind::RangeByte
        );
    }

    #[test]
    fn test_comparisons_are_bytes() {
        let v = eval("5 > 3").unwrap();
        assert_eq!(v.v, 1);
        assert_eq!(v.width, Width::Byte);
        assert_eq!(val("5 == 5"), 1);
        assert_eq!(val("5 != 5"), 0);
        assert_eq!(val("1 && 0"), 0);
        assert_eq!(val("1 || 0"), 1);
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval("1/0").unwrap_err().kind, ErrorKind::DivZero);
        assert_eq!(eval("1%0").unwrap_err().kind, ErrorKind::DivZero);
    }

    #[test]
    fn test_char_literal() {
        assert_eq!(val("'A'"), 0x41);
        assert_eq!(eval("'A'").unwrap().width, Width::Byte);
        assert_eq!(eval("'A").unwrap_err().kind, ErrorKind::CharUnterminated);
    }

    #[test]
    fn test_forward_reference_is_undefined() {
        let v = eval("nowhere").unwrap();
        assert!(!v.defined);
        assert_eq!(v.width, Width::Word);
        let v = eval("nowhere + 1").unwrap();
        assert!(!v.defined);
    }

    #[test]
    fn test_undefined_default_operator() {
        let reader = MockFileReader::default();
        let mut asm = Assembler::new(Options::default(), &reader);
        asm.set_source("missing ?: 7");
        let mut p = 0;
        let v = expr(&mut asm, &mut p).unwrap();
        assert_eq!(v.v, 7);
        assert!(v.defined);
    }

    #[test]
    fn test_pc_reference() {
        let reader = MockFileReader::default();
        let mut asm = Assembler::new(Options::default(), &reader);
        asm.set_source("*+2");
        asm.pc = 0x1000;
        let mut p = 0;
        let v = expr(&mut asm, &mut p).unwrap();
        assert_eq!(v.v, 0x1002);
        assert_eq!(v.width, Width::Word);
    }

    #[test]
    fn test_default_radix() {
        let reader = MockFileReader::default();
        let mut asm = Assembler::new(Options::default(), &reader);
        asm.set_source("12");
        asm.radix = 16;
        let mut p = 0;
        assert_eq!(expr(&mut asm, &mut p).unwrap().v, 0x12);

        let mut asm = Assembler::new(Options::default(), &reader);
        asm.set_source("110");
        asm.radix = 2;
        let mut p = 0;
        assert_eq!(expr(&mut asm, &mut p).unwrap().v, 6);
    }
}
