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

//! Built-in functions callable inside expressions.

use super::symbol_table::SymKind;
use super::{Assembler, expr};
use crate::errors::{AsmResult, ErrorKind};
use crate::source::is_end;
use crate::value::{Value, Width};

/// `DEF(sym)`: the symbol's current value. An unknown symbol becomes an
/// undefined byte variable, so testing for definedness never aborts.
fn do_def(asm: &mut Assembler, p: &mut usize) -> AsmResult<Value> {
    let id = asm.text.ident(p)?;
    let ci = asm.opts.case_insensitive;

    let val = match asm.symbols.lookup(&id, ci) {
        Some(sym) => sym.value,
        None => {
            let sym = asm.symbols.acquire(&id, ci);
            sym.kind = SymKind::Variable;
            sym.value = Value::undefined(Width::Byte);
            sym.value
        }
    };

    if is_end(asm.text.at(*p)) {
        return Err(ErrorKind::EolExpected.into());
    }

    Ok(val)
}

/// `HI(expr)`: bits 15..8 as a defined byte.
fn do_high(asm: &mut Assembler, p: &mut usize) -> AsmResult<Value> {
    let v = expr::expr(asm, p)?;
    if is_end(asm.text.at(*p)) {
        return Err(ErrorKind::EolExpected.into());
    }
    Ok(Value::byte((v.v >> 8) & 0xff))
}

/// `LO(expr)`: bits 7..0 as a defined byte.
fn do_low(asm: &mut Assembler, p: &mut usize) -> AsmResult<Value> {
    let v = expr::expr(asm, p)?;
    if is_end(asm.text.at(*p)) {
        return Err(ErrorKind::EolExpected.into());
    }
    Ok(Value::byte(v.v & 0xff))
}

/// `SUM(start, end)`: additive checksum of the output bytes emitted so
/// far in `[start, end)`.
fn do_sum(asm: &mut Assembler, p: &mut usize) -> AsmResult<Value> {
    let v1 = expr::expr(asm, p)?;

    asm.text.skip_white(p);
    if is_end(asm.text.at(*p)) {
        return Err(ErrorKind::EolExpected.into());
    }
    if asm.text.at(*p) != b',' {
        return Err(ErrorKind::OperatorIncomplete.into());
    }
    *p += 1;

    let v2 = expr::expr(asm, p)?;

    Ok(Value::num(asm.output.sum(v1.v, v2.v)))
}

/// Dispatches a function call by (upper-cased) name. `None` means the
/// name is not a function, so the caller can fall back to a symbol
/// reference.
pub fn function(asm: &mut Assembler, name: &str, p: &mut usize) -> AsmResult<Option<Value>> {
    asm.text.skip_white(p);

    let res = match name.to_ascii_uppercase().as_str() {
        "DEF" | "DEFINED" => do_def(asm, p)?,
        "HI" | "H" => do_high(asm, p)?,
        "LO" | "L" => do_low(asm, p)?,
        "SUM" => do_sum(asm, p)?,
        _ => return Ok(None),
    };

    Ok(Some(res))
}

#[cfg(test)]
mod tests {
    use super::super::expr::expr;
    use super::*;
    use crate::Options;
    use crate::file_reader::MockFileReader;

    fn eval(src: &str) -> Value {
        let reader = MockFileReader::default();
        let mut asm = Assembler::new(Options::default(), &reader);
        asm.set_source(src);
        let mut p = 0;
        expr(&mut asm, &mut p).unwrap()
    }

    #[test]
    fn test_hi_lo() {
        let v = eval("HI($1234)");
        assert_eq!(v.v, 0x12);
        assert_eq!(v.width, Width::Byte);
        assert!(v.defined);
        assert_eq!(eval("LO($1234)").v, 0x34);
        assert_eq!(eval(".hi($8001)").v, 0x80);
    }

    #[test]
    fn test_def_creates_forward_reference() {
        let reader = MockFileReader::default();
        let mut asm = Assembler::new(Options::default(), &reader);
        asm.set_source("DEF(thing)");
        let mut p = 0;
        let v = expr(&mut asm, &mut p).unwrap();
        assert!(!v.defined);
        let sym = asm.symbols.lookup("thing", false).unwrap();
        assert_eq!(sym.kind, SymKind::Variable);
    }

    #[test]
    fn test_def_of_known_symbol() {
        let reader = MockFileReader::default();
        let mut asm = Assembler::new(Options::default(), &reader);
        asm.symbols
            .define_variable("flag", Value::byte(3), false, 1, false, None)
            .unwrap();
        asm.set_source("DEF(flag)");
        let mut p = 0;
        let v = expr(&mut asm, &mut p).unwrap();
        assert_eq!(v.v, 3);
        assert!(v.defined);
    }

    #[test]
    fn test_sum_over_empty_output() {
        assert_eq!(eval("SUM(0, 4)").v, 0);
    }
}
