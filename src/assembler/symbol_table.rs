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

use crate::errors::{AsmError, AsmResult, ErrorKind};
use crate::source::ID_LEN;
use crate::value::{Value, Width};

/// What a symbol table entry stands for. `None` is the state of a freshly
/// acquired entry that has not been classified yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymKind {
    None,
    Label,
    Variable,
    Macro,
}

impl SymKind {
    /// One-letter tag used in symbol dumps.
    pub fn tag(self) -> char {
        match self {
            SymKind::Label => 'L',
            SymKind::Variable => 'V',
            SymKind::Macro => 'M',
            SymKind::None => '-',
        }
    }
}

/// One symbol: labels, variables, and macro names. Labels own a child
/// table of local (`@`) labels scoped to them.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub value: Value,
    pub kind: SymKind,
    /// Pass in which the symbol was last defined.
    pub pass: u8,
    /// Declared with an explicit colon.
    pub colon: bool,
    /// The IFNDEF decision taken in pass 1, replayed in pass 2.
    pub ifndef_pass1: Option<bool>,
    /// Definition site; `None` means command line or built-in.
    pub file: Option<usize>,
    pub line: u32,
    pub locals: SymbolTable,
}

impl Symbol {
    fn new(name: &str) -> Self {
        Symbol {
            name: name.to_string(),
            value: Value::undefined(Width::Byte),
            kind: SymKind::None,
            pass: 0,
            colon: false,
            ifndef_pass1: None,
            file: None,
            line: 0,
            locals: SymbolTable::default(),
        }
    }
}

/// An ordered name → symbol mapping. Entries are kept in ascending
/// case-insensitive name order; name *matching* is case-sensitive unless
/// the caller's `ci` flag says otherwise.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    syms: Vec<Symbol>,
}

impl SymbolTable {
    fn pos_of(&self, name: &str, ci: bool) -> Option<usize> {
        self.syms.iter().position(|s| {
            if ci {
                s.name.eq_ignore_ascii_case(name)
            } else {
                s.name == name
            }
        })
    }

    pub fn lookup(&self, name: &str, ci: bool) -> Option<&Symbol> {
        self.pos_of(name, ci).map(|i| &self.syms[i])
    }

    pub fn lookup_mut(&mut self, name: &str, ci: bool) -> Option<&mut Symbol> {
        self.pos_of(name, ci).map(|i| &mut self.syms[i])
    }

    /// Finds the symbol, inserting a fresh one in order when absent.
    pub fn acquire(&mut self, name: &str, ci: bool) -> &mut Symbol {
        match self.pos_of(name, ci) {
            Some(i) => &mut self.syms[i],
            None => {
                let key = name.to_ascii_lowercase();
                let at = self
                    .syms
                    .iter()
                    .position(|s| s.name.to_ascii_lowercase() > key)
                    .unwrap_or(self.syms.len());
                self.syms.insert(at, Symbol::new(name));
                &mut self.syms[at]
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.syms.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }

    pub fn clear(&mut self) {
        self.syms.clear();
    }

    /// Defines a label at `val`. With a `parent`, dot-names get the
    /// parent's name prefixed and the entry goes into the parent's local
    /// table. Pass 1 rejects redefinition with a different value; pass 2
    /// tolerates it, since an `EQU` may legally re-assign what it already
    /// assigned in pass 1.
    #[allow(clippy::too_many_arguments)]
    pub fn define_label(
        &mut self,
        name: &str,
        parent: Option<&str>,
        val: u32,
        pass: u8,
        colon: bool,
        ci: bool,
        file: usize,
        line: u32,
    ) -> AsmResult<&mut Symbol> {
        if let Some(par) = parent {
            let full;
            let name = if name.starts_with('.') {
                if par.len() + name.len() > ID_LEN {
                    return Err(AsmError::hint(ErrorKind::IdTooLong, name));
                }
                full = format!("{par}{name}");
                &full
            } else {
                name
            };
            let pi = self
                .pos_of(par, ci)
                .ok_or(ErrorKind::LocalNeedsGlobal)?;
            Self::define_in(
                &mut self.syms[pi].locals,
                name,
                val,
                pass,
                colon,
                ci,
                file,
                line,
                true,
            )
        } else {
            Self::define_in(self, name, val, pass, colon, ci, file, line, false)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn define_in<'t>(
        table: &'t mut SymbolTable,
        name: &str,
        val: u32,
        pass: u8,
        colon: bool,
        ci: bool,
        file: usize,
        line: u32,
        local: bool,
    ) -> AsmResult<&'t mut Symbol> {
        let sym = table.acquire(name, ci);

        if pass == 1
            && (sym.kind == SymKind::Variable || (sym.value.defined && sym.value.v != val))
        {
            let kind = if local {
                ErrorKind::LocalRedefinition
            } else {
                ErrorKind::Redefinition
            };
            return Err(AsmError::hint(kind, name));
        }

        sym.kind = SymKind::Label;
        sym.pass = pass;
        sym.colon = colon;
        sym.file = Some(file);
        sym.line = line;
        // A forward reference already carries word width; keep it so both
        // passes agree on operand sizes.
        let width = if sym.value.width == Width::Word {
            Width::Word
        } else {
            Width::of(val)
        };
        sym.value = Value {
            v: val,
            width,
            defined: true,
        };

        Ok(sym)
    }

    /// Defines or re-assigns a variable. Without `force` a conflicting
    /// content is a redefinition error and the existing width sticks;
    /// with `force` (the `EQU` path) everything is overwritten.
    pub fn define_variable(
        &mut self,
        name: &str,
        v: Value,
        force: bool,
        pass: u8,
        ci: bool,
        loc: Option<(usize, u32)>,
    ) -> AsmResult<()> {
        let sym = self.acquire(name, ci);

        if !force && sym.kind == SymKind::Label && sym.value.defined {
            return Err(AsmError::hint(ErrorKind::LabelAlreadyDefined, name));
        }
        if !force && sym.value.defined && sym.value.v != v.v {
            return Err(AsmError::hint(ErrorKind::Redefinition, name));
        }

        let fresh = sym.kind == SymKind::None;
        sym.kind = SymKind::Variable;
        sym.pass = pass;
        match loc {
            Some((f, l)) => {
                sym.file = Some(f);
                sym.line = l;
            }
            None => {
                sym.file = None;
                sym.line = 0;
            }
        }

        sym.value.v = v.v;
        if force || fresh {
            sym.value.width = v.width;
            sym.value.defined = v.defined;
        } else if v.defined {
            sym.value.defined = true;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_keeps_order() {
        let mut t = SymbolTable::default();
        t.acquire("zeta", false);
        t.acquire("Alpha", false);
        t.acquire("mid", false);
        let names: Vec<&str> = t.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_lookup_case_option() {
        let mut t = SymbolTable::default();
        t.acquire("Foo", false);
        assert!(t.lookup("foo", false).is_none());
        assert!(t.lookup("foo", true).is_some());
    }

    #[test]
    fn test_label_redefinition_pass1() {
        let mut t = SymbolTable::default();
        t.define_label("start", None, 0x100, 1, true, false, 0, 1)
            .unwrap();
        // Same value is fine.
        t.define_label("start", None, 0x100, 1, true, false, 0, 2)
            .unwrap();
        let e = t
            .define_label("start", None, 0x200, 1, true, false, 0, 3)
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::Redefinition);
        // Pass 2 tolerates a change.
        t.define_label("start", None, 0x200, 2, true, false, 0, 3)
            .unwrap();
    }

    #[test]
    fn test_dot_label_gets_parent_prefix() {
        let mut t = SymbolTable::default();
        t.define_label("outer", None, 0x10, 1, true, false, 0, 1)
            .unwrap();
        t.define_label(".1", Some("outer"), 0x12, 1, false, false, 0, 2)
            .unwrap();
        let parent = t.lookup("outer", false).unwrap();
        assert!(parent.locals.lookup("outer.1", false).is_some());
    }

    #[test]
    fn test_variable_rules() {
        let mut t = SymbolTable::default();
        t.define_variable("v", Value::byte(1), false, 1, false, None)
            .unwrap();
        // Same content is accepted, different content is not.
        t.define_variable("v", Value::byte(1), false, 1, false, None)
            .unwrap();
        let e = t
            .define_variable("v", Value::byte(2), false, 1, false, None)
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::Redefinition);
        // Forced assignment replaces content and width.
        t.define_variable("v", Value::word(0x300), true, 1, false, None)
            .unwrap();
        assert_eq!(t.lookup("v", false).unwrap().value.v, 0x300);
        assert_eq!(t.lookup("v", false).unwrap().value.width, Width::Word);
    }

    #[test]
    fn test_variable_cannot_shadow_label() {
        let mut t = SymbolTable::default();
        t.define_label("here", None, 5, 1, true, false, 0, 1)
            .unwrap();
        let e = t
            .define_variable("here", Value::byte(5), false, 1, false, None)
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::LabelAlreadyDefined);
    }

    #[test]
    fn test_forward_reference_keeps_word_width() {
        let mut t = SymbolTable::default();
        // Evaluator-style forward reference.
        let sym = t.acquire("later", false);
        sym.kind = SymKind::Label;
        sym.value = Value::undefined(Width::Word);
        t.define_label("later", None, 3, 1, true, false, 0, 4)
            .unwrap();
        let sym = t.lookup("later", false).unwrap();
        assert_eq!(sym.value.width, Width::Word);
        assert!(sym.value.defined);
    }
}
