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

use crate::errors::{AsmResult, ErrorKind};

/// Separates concatenated input files inside the source buffer.
pub const EOF_CHAR: u8 = 0x1a;
/// Terminates an expanded macro body.
pub const ETX_CHAR: u8 = 0x03;

pub const COMMENT_CHAR: u8 = b';';
pub const DOT_CHAR: u8 = b'.';
pub const EQUAL_CHAR: u8 = b'=';
pub const COLON_CHAR: u8 = b':';
pub const ALPHA_CHAR: u8 = b'@';

/// Maximum identifier length.
pub const ID_LEN: usize = 32;
/// Maximum string literal length.
pub const STR_LEN: usize = 128;
/// Maximum number of file registry entries (includes count twice).
pub const MAX_FILENAMES: usize = 257;

#[inline]
pub fn is_space(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

#[inline]
pub fn is_ident_extra(b: u8) -> bool {
    b == DOT_CHAR || b == b'_'
}

/// True at line boundaries: newline, carriage return, buffer end, a file
/// separator, or a macro terminator.
#[inline]
pub fn is_end(b: u8) -> bool {
    b == 0 || b == b'\n' || b == b'\r' || b == EOF_CHAR || b == ETX_CHAR
}

/// The whole assembler source as one flat buffer. The main file and every
/// included file are joined by [`EOF_CHAR`]; a macro expansion temporarily
/// replaces the buffer and ends with [`ETX_CHAR`]. Cursors are plain byte
/// offsets, so swapping buffers never invalidates scanning state held by
/// the caller.
#[derive(Debug, Default, Clone)]
pub struct SourceText {
    bytes: Vec<u8>,
}

impl SourceText {
    pub fn new(bytes: Vec<u8>) -> Self {
        SourceText { bytes }
    }

    /// Builds a buffer from text, stripping carriage returns the way the
    /// file loader does.
    pub fn from_str(s: &str) -> Self {
        SourceText {
            bytes: s.bytes().filter(|&b| b != b'\r').collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Byte at `p`, or NUL past the end.
    #[inline]
    pub fn at(&self, p: usize) -> u8 {
        self.bytes.get(p).copied().unwrap_or(0)
    }

    /// Appends another file's text, separated from previous content by the
    /// EOF byte when the buffer is not empty.
    pub fn append_file(&mut self, s: &str) {
        if !self.bytes.is_empty() {
            self.bytes.push(EOF_CHAR);
        }
        self.bytes.extend(s.bytes().filter(|&b| b != b'\r'));
    }

    /// Splices an included file in at `at`, wrapped in EOF separators.
    pub fn splice_include(&mut self, at: usize, s: &str) {
        let mut block = Vec::with_capacity(s.len() + 2);
        block.push(EOF_CHAR);
        block.extend(s.bytes().filter(|&b| b != b'\r'));
        block.push(EOF_CHAR);
        self.bytes.splice(at..at, block);
    }

    /// The raw text of the line starting at `p`, for listings and traces.
    pub fn line_at(&self, p: usize) -> String {
        let mut q = p;
        while !is_end(self.at(q)) {
            q += 1;
        }
        String::from_utf8_lossy(&self.bytes[p.min(self.bytes.len())..q]).into_owned()
    }

    pub fn skip_white(&self, p: &mut usize) {
        while is_space(self.at(*p)) {
            *p += 1;
        }
    }

    pub fn skip_white_and_comment(&self, p: &mut usize) {
        while is_space(self.at(*p)) {
            *p += 1;
        }
        if self.at(*p) == COMMENT_CHAR {
            *p += 1;
            while !is_end(self.at(*p)) {
                *p += 1;
            }
        }
    }

    /// Steps over the current character, then any blanks.
    pub fn skip_curr_and_white(&self, p: &mut usize) {
        *p += 1;
        while is_space(self.at(*p)) {
            *p += 1;
        }
    }

    /// Consumes one line terminator. File separators and macro terminators
    /// are left in place; the pass driver handles those itself.
    pub fn skip_eol(&self, p: &mut usize) {
        if self.at(*p) == b'\r' {
            *p += 1;
        }
        if self.at(*p) == b'\n' {
            *p += 1;
        }
    }

    pub fn skip_to_eol(&self, p: &mut usize) {
        while !is_end(self.at(*p)) {
            *p += 1;
        }
    }

    fn ident_impl(&self, p: &mut usize, numeric: bool, upper: bool) -> AsmResult<String> {
        let b = self.at(*p);
        let first_ok = if numeric {
            b.is_ascii_alphanumeric() || is_ident_extra(b)
        } else {
            b.is_ascii_alphabetic() || is_ident_extra(b)
        };
        if !first_ok {
            return Err(ErrorKind::IdExpected.into());
        }

        let mut id = String::new();
        loop {
            let c = self.at(*p);
            if !(c.is_ascii_alphanumeric() || is_ident_extra(c)) {
                break;
            }
            if id.len() >= ID_LEN {
                return Err(ErrorKind::IdTooLong.into());
            }
            id.push(if upper {
                c.to_ascii_uppercase() as char
            } else {
                c as char
            });
            *p += 1;
        }

        Ok(id)
    }

    /// Identifier which may not start with a digit.
    pub fn ident(&self, p: &mut usize) -> AsmResult<String> {
        self.ident_impl(p, false, false)
    }

    /// Identifier which may start with a digit.
    pub fn nident(&self, p: &mut usize) -> AsmResult<String> {
        self.ident_impl(p, true, false)
    }

    pub fn ident_upcase(&self, p: &mut usize) -> AsmResult<String> {
        self.ident_impl(p, false, true)
    }

    pub fn nident_upcase(&self, p: &mut usize) -> AsmResult<String> {
        self.ident_impl(p, true, true)
    }

    /// Reads one character plus any following alphanumerics, upper-cased.
    /// Used for register names; never fails, the caller compares the text.
    pub fn upcase_run(&self, p: &mut usize) -> String {
        let mut s = String::new();
        loop {
            let c = self.at(*p);
            if is_end(c) {
                break;
            }
            s.push(c.to_ascii_uppercase() as char);
            *p += 1;
            if !self.at(*p).is_ascii_alphanumeric() {
                break;
            }
        }
        s
    }

    /// Reads a `"..."` literal. When `quot` is set the quotes are
    /// mandatory and an unterminated string is an error; otherwise the
    /// text simply runs to the end of the line.
    pub fn string_lit(&self, p: &mut usize, quot: bool) -> AsmResult<String> {
        if self.at(*p) != b'"' {
            if quot {
                return Err(ErrorKind::StringExpected.into());
            }
        } else {
            *p += 1;
        }

        let mut s = String::new();
        while !is_end(self.at(*p)) {
            if self.at(*p) == b'"' {
                break;
            }
            if s.len() >= STR_LEN - 1 {
                return Err(ErrorKind::StringTooLong.into());
            }
            s.push(self.at(*p) as char);
            *p += 1;
        }

        if is_end(self.at(*p)) {
            if quot {
                return Err(ErrorKind::StringUnterminated.into());
            }
        } else {
            *p += 1;
        }

        Ok(s)
    }

    /// Case-insensitive keyword test; the pattern's trailing space (if
    /// any) must match literally, so `5 MOD 3` hits but `5 MODE` does not.
    pub fn starts_with_kw(&self, p: usize, kw: &str) -> bool {
        for (i, k) in kw.bytes().enumerate() {
            if self.at(p + i).to_ascii_uppercase() != k.to_ascii_uppercase() {
                return false;
            }
        }
        true
    }
}

/// One entry per input or included file. `start_line` is where the line
/// counter resumes when the scanner enters this entry: 1 for real files,
/// the saved line for the continuation of an including file.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub start_line: u32,
}

/// Ordered list of input files. The index advances every time the scanner
/// crosses an EOF separator; entries are created in pass 1 and replayed
/// unchanged in pass 2.
#[derive(Debug, Default)]
pub struct FileRegistry {
    entries: Vec<FileEntry>,
    idx: usize,
}

impl FileRegistry {
    pub fn add(&mut self, name: &str, start_line: u32) -> AsmResult<()> {
        if self.entries.len() >= MAX_FILENAMES {
            return Err(ErrorKind::MaxIncludes.into());
        }
        self.entries.push(FileEntry {
            name: name.to_string(),
            start_line,
        });
        Ok(())
    }

    /// Registers an include: the included file, then the continuation of
    /// the including file, both right after the current entry.
    pub fn insert_include(&mut self, name: &str, cont_line: u32) -> AsmResult<()> {
        if self.entries.len() + 2 > MAX_FILENAMES {
            return Err(ErrorKind::MaxIncludes.into());
        }
        let cont = FileEntry {
            name: self.entries[self.idx].name.clone(),
            start_line: cont_line,
        };
        self.entries.insert(
            self.idx + 1,
            FileEntry {
                name: name.to_string(),
                start_line: 1,
            },
        );
        self.entries.insert(self.idx + 2, cont);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.idx = 0;
    }

    pub fn idx(&self) -> usize {
        self.idx
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_name(&self) -> &str {
        self.entries
            .get(self.idx)
            .map(|e| e.name.as_str())
            .unwrap_or("<none>")
    }

    pub fn name(&self, idx: usize) -> &str {
        self.entries
            .get(idx)
            .map(|e| e.name.as_str())
            .unwrap_or("<none>")
    }

    /// Steps into the next entry, returning its starting line.
    pub fn advance(&mut self) -> u32 {
        if self.idx + 1 < self.entries.len() {
            self.idx += 1;
        }
        self.entries
            .get(self.idx)
            .map(|e| e.start_line)
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_white_and_comment() {
        let t = SourceText::from_str("  \t ; note\nnext");
        let mut p = 0;
        t.skip_white_and_comment(&mut p);
        assert_eq!(t.at(p), b'\n');
    }

    #[test]
    fn test_ident_rules() {
        let t = SourceText::from_str("foo.bar baz");
        let mut p = 0;
        assert_eq!(t.ident(&mut p).unwrap(), "foo.bar");

        let t = SourceText::from_str("1abc");
        let mut p = 0;
        assert!(t.ident(&mut p).is_err());
        p = 0;
        assert_eq!(t.nident(&mut p).unwrap(), "1abc");
    }

    #[test]
    fn test_ident_too_long() {
        let t = SourceText::from_str(&"a".repeat(40));
        let mut p = 0;
        assert_eq!(
            t.ident(&mut p).unwrap_err().kind,
            ErrorKind::IdTooLong
        );
    }

    #[test]
    fn test_string_lit() {
        let t = SourceText::from_str("\"hello\" rest");
        let mut p = 0;
        assert_eq!(t.string_lit(&mut p, true).unwrap(), "hello");
        assert_eq!(t.at(p), b' ');

        let t = SourceText::from_str("\"open\n");
        let mut p = 0;
        assert_eq!(
            t.string_lit(&mut p, true).unwrap_err().kind,
            ErrorKind::StringUnterminated
        );
    }

    #[test]
    fn test_keyword_match_needs_space() {
        let t = SourceText::from_str("mod 3");
        assert!(t.starts_with_kw(0, "MOD "));
        let t = SourceText::from_str("mode");
        assert!(!t.starts_with_kw(0, "MOD "));
    }

    #[test]
    fn test_splice_include() {
        let mut t = SourceText::from_str("a\nb\n");
        t.splice_include(2, "inc\n");
        assert_eq!(t.at(2), EOF_CHAR);
        assert_eq!(t.line_at(3), "inc");
        assert_eq!(t.at(7), EOF_CHAR);
        assert_eq!(t.line_at(8), "b");
    }

    #[test]
    fn test_registry_include_order() {
        let mut r = FileRegistry::default();
        r.add("main.asm", 1).unwrap();
        r.insert_include("sub.inc", 5).unwrap();
        assert_eq!(r.advance(), 1);
        assert_eq!(r.current_name(), "sub.inc");
        assert_eq!(r.advance(), 5);
        assert_eq!(r.current_name(), "main.asm");
    }
}
