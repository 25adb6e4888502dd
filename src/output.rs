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

//! Streaming object output in raw binary, Intel HEX, or Motorola
//! S-record form.
//!
//! Pass 1 only advances counters; pass 2 fills the image buffer and, for
//! the text formats, flushes address/payload records as they fill up.

use std::fmt::Write as _;

use crate::errors::{AsmError, AsmResult, ErrorKind};

/// Payload bytes per text-format record.
const RECORD_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Bin,
    IntelHex,
    SRecord,
}

/// Picks the output mode from a `fmt:` filename prefix or, failing
/// that, the extension. Returns the mode and the actual file name.
pub fn mode_for(name: &str) -> AsmResult<(OutputMode, String)> {
    if let Some((prefix, rest)) = name.split_once(':') {
        return match prefix.to_ascii_lowercase().as_str() {
            "bin" => Ok((OutputMode::Bin, rest.to_string())),
            "ihex" => Ok((OutputMode::IntelHex, rest.to_string())),
            "srec" => Ok((OutputMode::SRecord, rest.to_string())),
            _ => Err(AsmError::hint(ErrorKind::NoFormat, prefix)),
        };
    }

    let ext = name
        .rsplit('/')
        .next()
        .and_then(|base| base.rsplit_once('.'))
        .map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("hex") | Some("ihex") => Ok((OutputMode::IntelHex, name.to_string())),
        Some("srec") | Some("s19") => Ok((OutputMode::SRecord, name.to_string())),
        _ => Ok((OutputMode::Bin, name.to_string())),
    }
}

/// The output encoder. `buf` is the raw image (always maintained in
/// pass 2, for listings and the SUM function); `text` carries the
/// encoded HEX/S-record stream.
#[derive(Debug)]
pub struct Output {
    pub mode: OutputMode,
    pub autofill: bool,
    buf: Vec<u8>,
    total: u32,
    addr: u32,
    base: u32,
    org_done: bool,
    line: Vec<u8>,
    line_addr: u32,
    text: String,
    start: Option<u32>,
    planned: usize,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            mode: OutputMode::Bin,
            autofill: true,
            buf: Vec::new(),
            total: 0,
            addr: 0,
            base: 0,
            org_done: false,
            line: Vec::new(),
            line_addr: 0,
            text: String::new(),
            start: None,
            planned: 0,
        }
    }
}

impl Output {
    /// Clears all per-pass state. The image buffer is sized up front in
    /// pass 2 to pass 1's byte count.
    pub fn reset(&mut self, pass: u8, autofill: bool) {
        if pass == 2 {
            self.planned = self.total as usize;
        }
        self.autofill = autofill;
        self.buf = Vec::with_capacity(self.planned);
        self.total = 0;
        self.addr = 0;
        self.base = 0;
        self.org_done = false;
        self.line.clear();
        self.line_addr = 0;
        self.text.clear();
        self.start = None;
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// The raw image assembled so far (pass 2 only).
    pub fn image(&self) -> &[u8] {
        &self.buf
    }

    /// Establishes a new load address. In binary mode a forward move
    /// zero-fills the gap when autofill is on; moving below the write
    /// cursor has no binary representation and is rejected.
    pub fn set_address(&mut self, a: u32, pass: u8) -> AsmResult<()> {
        match self.mode {
            OutputMode::Bin => {
                if !self.org_done {
                    self.org_done = true;
                    self.base = a;
                    self.addr = a;
                } else if a >= self.addr {
                    if self.autofill {
                        let gap = a - self.addr;
                        for _ in 0..gap {
                            self.emit_byte(0x00, pass);
                        }
                    } else {
                        self.addr = a;
                    }
                } else {
                    return Err(AsmError::hint(
                        ErrorKind::Range,
                        "origin before current output",
                    ));
                }
            }
            _ => {
                if pass == 2 {
                    self.flush_record();
                }
                self.addr = a;
                if !self.org_done {
                    self.org_done = true;
                    self.base = a;
                }
            }
        }
        Ok(())
    }

    /// Records the program start address from `END`. Intel HEX gets a
    /// type-05 linear start record; the S-record terminator carries the
    /// address at close time.
    pub fn set_start(&mut self, a: u32, pass: u8) {
        self.start = Some(a);
        if pass == 2 && a != 0 && self.mode == OutputMode::IntelHex {
            self.flush_record();
            let data = [
                4u8,
                0,
                0,
                5,
                (a >> 24) as u8,
                (a >> 16) as u8,
                (a >> 8) as u8,
                a as u8,
            ];
            let sum: u8 = data.iter().fold(0u8, |s, &b| s.wrapping_add(b));
            let _ = writeln!(
                self.text,
                ":04000005{:08X}{:02X}",
                a,
                sum.wrapping_neg()
            );
        }
    }

    pub fn emit_byte(&mut self, b: u8, pass: u8) {
        if pass == 2 {
            self.buf.push(b);
            if self.mode != OutputMode::Bin {
                if self.line.is_empty() {
                    self.line_addr = self.addr;
                }
                self.line.push(b);
                if self.line.len() >= RECORD_LEN {
                    self.flush_record();
                }
            }
        }
        self.total += 1;
        self.addr = self.addr.wrapping_add(1);
    }

    pub fn emit_word_le(&mut self, w: u16, pass: u8) {
        self.emit_byte(w as u8, pass);
        self.emit_byte((w >> 8) as u8, pass);
    }

    pub fn emit_word_be(&mut self, w: u16, pass: u8) {
        self.emit_byte((w >> 8) as u8, pass);
        self.emit_byte(w as u8, pass);
    }

    pub fn emit_dword_le(&mut self, w: u32, pass: u8) {
        self.emit_word_le(w as u16, pass);
        self.emit_word_le((w >> 16) as u16, pass);
    }

    pub fn emit_dword_be(&mut self, w: u32, pass: u8) {
        self.emit_word_be((w >> 16) as u16, pass);
        self.emit_word_be(w as u16, pass);
    }

    pub fn emit_str(&mut self, s: &str, pass: u8) {
        for b in s.bytes() {
            self.emit_byte(b, pass);
        }
    }

    /// Writes out the pending payload as one record.
    fn flush_record(&mut self) {
        if self.line.is_empty() {
            return;
        }
        let addr = self.line_addr & 0xffff;

        match self.mode {
            OutputMode::IntelHex => {
                // :LLAAAA00 data CC, two's-complement checksum.
                let mut sum = (self.line.len() as u8)
                    .wrapping_add((addr >> 8) as u8)
                    .wrapping_add(addr as u8);
                let _ = write!(self.text, ":{:02X}{:04X}00", self.line.len(), addr);
                for &b in &self.line {
                    let _ = write!(self.text, "{:02X}", b);
                    sum = sum.wrapping_add(b);
                }
                let _ = writeln!(self.text, "{:02X}", sum.wrapping_neg());
            }
            OutputMode::SRecord => {
                // S1LLAAAA data CC, one's-complement checksum.
                let count = (self.line.len() + 3) as u8;
                let mut sum = count
                    .wrapping_add((addr >> 8) as u8)
                    .wrapping_add(addr as u8);
                let _ = write!(self.text, "S1{:02X}{:04X}", count, addr);
                for &b in &self.line {
                    let _ = write!(self.text, "{:02X}", b);
                    sum = sum.wrapping_add(b);
                }
                let _ = writeln!(self.text, "{:02X}", 0xffu8.wrapping_sub(sum));
            }
            OutputMode::Bin => {}
        }

        self.line.clear();
    }

    /// Terminates the stream: HEX gets the EOF record, S-records get the
    /// S9 terminator carrying the start address.
    pub fn finish(&mut self, pass: u8) {
        if pass != 2 {
            return;
        }
        self.flush_record();
        match self.mode {
            OutputMode::IntelHex => {
                self.text.push_str(":00000001FF\n");
            }
            OutputMode::SRecord => {
                let a = self.start.unwrap_or(0) & 0xffff;
                let sum = 3u8.wrapping_add((a >> 8) as u8).wrapping_add(a as u8);
                let _ = writeln!(self.text, "S903{:04X}{:02X}", a, 0xffu8.wrapping_sub(sum));
            }
            OutputMode::Bin => {}
        }
    }

    /// Additive checksum over image offsets `start-base .. end-base`.
    pub fn sum(&self, start: u32, end: u32) -> u32 {
        let lo = start.wrapping_sub(self.base) as usize;
        let hi = end.wrapping_sub(self.base) as usize;
        if lo >= hi {
            return 0;
        }
        self.buf[lo.min(self.buf.len())..hi.min(self.buf.len())]
            .iter()
            .fold(0u32, |s, &b| s.wrapping_add(b as u32))
    }

    /// The encoded object: the image itself for binary output, the
    /// record stream for the text formats.
    pub fn object(&self) -> Vec<u8> {
        match self.mode {
            OutputMode::Bin => self.buf.clone(),
            _ => self.text.clone().into_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(out: &Output) -> String {
        String::from_utf8(out.object()).unwrap()
    }

    #[test]
    fn test_mode_selection() {
        assert_eq!(mode_for("a.bin").unwrap().0, OutputMode::Bin);
        assert_eq!(mode_for("a.hex").unwrap().0, OutputMode::IntelHex);
        assert_eq!(mode_for("a.s19").unwrap().0, OutputMode::SRecord);
        assert_eq!(mode_for("noext").unwrap().0, OutputMode::Bin);
        let (m, f) = mode_for("ihex:odd.name").unwrap();
        assert_eq!(m, OutputMode::IntelHex);
        assert_eq!(f, "odd.name");
        let (m, _) = mode_for("srec:out").unwrap();
        assert_eq!(m, OutputMode::SRecord);
    }

    #[test]
    fn test_pass1_only_counts() {
        let mut out = Output::default();
        out.reset(1, true);
        out.emit_byte(0xaa, 1);
        out.emit_word_le(0x1234, 1);
        assert_eq!(out.total(), 3);
        assert!(out.image().is_empty());
    }

    #[test]
    fn test_binary_autofill() {
        let mut out = Output::default();
        out.reset(2, true);
        out.set_address(0x10, 2).unwrap();
        out.emit_byte(0x01, 2);
        out.set_address(0x14, 2).unwrap();
        out.emit_byte(0x02, 2);
        assert_eq!(out.image(), &[0x01, 0x00, 0x00, 0x00, 0x02]);
        assert_eq!(out.total(), 5);
    }

    #[test]
    fn test_binary_backwards_org_rejected() {
        let mut out = Output::default();
        out.reset(2, true);
        out.set_address(0x10, 2).unwrap();
        out.emit_byte(0x01, 2);
        let e = out.set_address(0x05, 2).unwrap_err();
        assert_eq!(e.kind, ErrorKind::Range);
    }

    #[test]
    fn test_intel_hex_stream() {
        let mut out = Output::default();
        out.mode = OutputMode::IntelHex;
        out.reset(2, true);
        out.set_address(0x0100, 2).unwrap();
        out.emit_byte(0xaa, 2);
        out.emit_byte(0xbb, 2);
        out.set_start(0x0100, 2);
        out.finish(2);
        assert_eq!(
            text_of(&out),
            ":02010000AABB98\n:0400000500000100F6\n:00000001FF\n"
        );
    }

    #[test]
    fn test_intel_hex_checksum_property() {
        let mut out = Output::default();
        out.mode = OutputMode::IntelHex;
        out.set_address(0x1234, 2).unwrap();
        for i in 0..40u8 {
            out.emit_byte(i, 2);
        }
        out.finish(2);
        for line in text_of(&out).lines() {
            let bytes: Vec<u8> = (1..line.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&line[i..i + 2], 16).unwrap())
                .collect();
            let sum = bytes.iter().fold(0u8, |s, &b| s.wrapping_add(b));
            assert_eq!(sum, 0, "bad checksum in {line}");
        }
    }

    #[test]
    fn test_srecord_stream() {
        let mut out = Output::default();
        out.mode = OutputMode::SRecord;
        out.set_address(0x1000, 2).unwrap();
        out.emit_byte(0x11, 2);
        out.emit_byte(0x22, 2);
        out.emit_byte(0x33, 2);
        out.finish(2);
        assert_eq!(text_of(&out), "S106100011223383\nS9030000FC\n");
    }

    #[test]
    fn test_srecord_checksum_property() {
        let mut out = Output::default();
        out.mode = OutputMode::SRecord;
        out.set_address(0x0000, 2).unwrap();
        for i in 0..5u8 {
            out.emit_byte(i * 7, 2);
        }
        out.finish(2);
        for line in text_of(&out).lines() {
            let bytes: Vec<u8> = (2..line.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&line[i..i + 2], 16).unwrap())
                .collect();
            let sum = bytes.iter().fold(0u8, |s, &b| s.wrapping_add(b));
            assert_eq!(sum, 0xff, "bad checksum in {line}");
        }
    }

    #[test]
    fn test_records_split_at_address_change() {
        let mut out = Output::default();
        out.mode = OutputMode::IntelHex;
        out.set_address(0x0000, 2).unwrap();
        out.emit_byte(0x01, 2);
        out.set_address(0x0200, 2).unwrap();
        out.emit_byte(0x02, 2);
        out.finish(2);
        let t = text_of(&out);
        let lines: Vec<&str> = t.lines().collect();
        assert_eq!(lines[0], ":0100000001FE");
        assert_eq!(lines[1], ":0102000002FB");
    }

    #[test]
    fn test_sum_window() {
        let mut out = Output::default();
        out.reset(2, true);
        out.set_address(0x100, 2).unwrap();
        out.emit_byte(1, 2);
        out.emit_byte(2, 2);
        out.emit_byte(3, 2);
        assert_eq!(out.sum(0x100, 0x103), 6);
        assert_eq!(out.sum(0x101, 0x102), 2);
        assert_eq!(out.sum(0x103, 0x100), 0);
    }

    #[test]
    fn test_emit_dword_le() {
        let mut out = Output::default();
        out.reset(2, true);
        out.emit_dword_le(0x0403_0201, 2);
        assert_eq!(out.image(), &[0x01, 0x02, 0x03, 0x04]);
        let mut out = Output::default();
        out.reset(2, true);
        out.emit_dword_be(0x0403_0201, 2);
        assert_eq!(out.image(), &[0x04, 0x03, 0x02, 0x01]);
    }
}
