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

//! MOS 6502 family back-end: table-driven, one row per mnemonic with an
//! opcode per addressing mode.

use super::Target;
use crate::assembler::{Assembler, expr};
use crate::errors::{AsmError, AsmResult, ErrorKind};
use crate::source::is_end;
use crate::value::{Value, Width};

// Addressing modes, in table column order.
const AM_ACC: usize = 0; // A
const AM_IMP: usize = 1; // (none)
const AM_IMM: usize = 2; // #$12
const AM_REL: usize = 3; // LABEL
const AM_ZP: usize = 4; // $12
const AM_ZPI: usize = 5; // ($12)
const AM_ZPR: usize = 6; // $12,LABEL
const AM_ZPX: usize = 7; // $12,X
const AM_ZPY: usize = 8; // $12,Y
const AM_ABS: usize = 9; // $1234
const AM_ABX: usize = 10; // $1234,X
const AM_ABY: usize = 11; // $1234,Y
const AM_IND: usize = 12; // ($1234)
const AM_INX: usize = 13; // ($12,X)
const AM_INY: usize = 14; // ($12),Y
const AM_NUM: usize = 15;

static AM_SIZE: [u32; AM_NUM] = [1, 1, 2, 2, 2, 2, 3, 2, 2, 3, 3, 3, 3, 2, 2];

const INV: u8 = 0xff;
const __: u8 = INV;

// Processor feature bits required by an instruction row.
pub const FEAT_NMOS: u8 = 0x01; // post-bug NMOS (working ROR)
pub const FEAT_CMOS: u8 = 0x02;
pub const FEAT_RW: u8 = 0x04; // Rockwell bit instructions
pub const FEAT_WDC: u8 = 0x08; // WDC extensions

// Back-end error codes, translated by error_text().
pub const ERR_AM: u16 = 1;
pub const ERR_REG: u16 = 2;
pub const ERR_INX: u16 = 3;
pub const ERR_INY: u16 = 4;
pub const ERR_RELRNG: u16 = 5;
pub const ERR_NOTIMPL: u16 = 6;

struct Op {
    mn: &'static str,
    req: u8,
    opc: [u8; AM_NUM],
}

const fn op(mn: &'static str, req: u8, opc: [u8; AM_NUM]) -> Op {
    Op { mn, req, opc }
}

#[rustfmt::skip]
static OPC_NMOS: &[Op] = &[
 op("ADC", 0, [__  ,__  ,0x69,__  ,0x65,__  ,__  ,0x75,__  ,0x6d,0x7d,0x79,__  ,0x61,0x71]),
 op("AND", 0, [__  ,__  ,0x29,__  ,0x25,__  ,__  ,0x35,__  ,0x2d,0x3d,0x39,__  ,0x21,0x31]),
 op("ASL", 0, [0x0a,__  ,__  ,__  ,0x06,__  ,__  ,0x16,__  ,0x0e,0x1e,__  ,__  ,__  ,__  ]),
 op("BCC", 0, [__  ,__  ,__  ,0x90,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BCS", 0, [__  ,__  ,__  ,0xb0,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BEQ", 0, [__  ,__  ,__  ,0xf0,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BIT", 0, [__  ,__  ,__  ,__  ,0x24,__  ,__  ,__  ,__  ,0x2c,__  ,__  ,__  ,__  ,__  ]),
 op("BMI", 0, [__  ,__  ,__  ,0x30,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BNE", 0, [__  ,__  ,__  ,0xd0,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BPL", 0, [__  ,__  ,__  ,0x10,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BRK", 0, [__  ,0x00,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BVC", 0, [__  ,__  ,__  ,0x50,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BVS", 0, [__  ,__  ,__  ,0x70,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("CLC", 0, [__  ,0x18,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("CLD", 0, [__  ,0xd8,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("CLI", 0, [__  ,0x58,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("CLV", 0, [__  ,0xb8,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("CMP", 0, [__  ,__  ,0xc9,__  ,0xc5,__  ,__  ,0xd5,__  ,0xcd,0xdd,0xd9,__  ,0xc1,0xd1]),
 op("CPX", 0, [__  ,__  ,0xe0,__  ,0xe4,__  ,__  ,__  ,__  ,0xec,__  ,__  ,__  ,__  ,__  ]),
 op("CPY", 0, [__  ,__  ,0xc0,__  ,0xc4,__  ,__  ,__  ,__  ,0xcc,__  ,__  ,__  ,__  ,__  ]),
 op("DEC", 0, [__  ,__  ,__  ,__  ,0xc6,__  ,__  ,0xd6,__  ,0xce,0xde,__  ,__  ,__  ,__  ]),
 op("DEX", 0, [__  ,0xca,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("DEY", 0, [__  ,0x88,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("EOR", 0, [__  ,__  ,0x49,__  ,0x45,__  ,__  ,0x55,__  ,0x4d,0x5d,0x59,__  ,0x41,0x51]),
 op("INC", 0, [__  ,__  ,__  ,__  ,0xe6,__  ,__  ,0xf6,__  ,0xee,0xfe,__  ,__  ,__  ,__  ]),
 op("INX", 0, [__  ,0xe8,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("INY", 0, [__  ,0xc8,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("JMP", 0, [__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,0x4c,__  ,__  ,0x6c,__  ,__  ]),
 op("JSR", 0, [__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,0x20,__  ,__  ,__  ,__  ,__  ]),
 op("LDA", 0, [__  ,__  ,0xa9,__  ,0xa5,__  ,__  ,0xb5,__  ,0xad,0xbd,0xb9,__  ,0xa1,0xb1]),
 op("LDX", 0, [__  ,__  ,0xa2,__  ,0xa6,__  ,__  ,__  ,0xb6,0xae,__  ,0xbe,__  ,__  ,__  ]),
 op("LDY", 0, [__  ,__  ,0xa0,__  ,0xa4,__  ,__  ,0xb4,__  ,0xac,0xbc,__  ,__  ,__  ,__  ]),
 op("LSR", 0, [0x4a,__  ,__  ,__  ,0x46,__  ,__  ,0x56,__  ,0x4e,0x5e,__  ,__  ,__  ,__  ]),
 op("NOP", 0, [__  ,0xea,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("ORA", 0, [__  ,__  ,0x09,__  ,0x05,__  ,__  ,0x15,__  ,0x0d,0x1d,0x19,__  ,0x01,0x11]),
 op("PHA", 0, [__  ,0x48,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("PHP", 0, [__  ,0x08,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("PLA", 0, [__  ,0x68,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("PLP", 0, [__  ,0x28,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("ROL", 0, [0x2a,__  ,__  ,__  ,0x26,__  ,__  ,0x36,__  ,0x2e,0x3e,__  ,__  ,__  ,__  ]),
 op("ROR", FEAT_NMOS,
              [0x6a,__  ,__  ,__  ,0x66,__  ,__  ,0x76,__  ,0x6e,0x7e,__  ,__  ,__  ,__  ]),
 op("RTI", 0, [__  ,0x40,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("RTS", 0, [__  ,0x60,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("SBC", 0, [__  ,__  ,0xe9,__  ,0xe5,__  ,__  ,0xf5,__  ,0xed,0xfd,0xf9,__  ,0xe1,0xf1]),
 op("SEC", 0, [__  ,0x38,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("SED", 0, [__  ,0xf8,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("SEI", 0, [__  ,0x78,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("STA", 0, [__  ,__  ,__  ,__  ,0x85,__  ,__  ,0x95,__  ,0x8d,0x9d,0x99,__  ,0x81,0x91]),
 op("STX", 0, [__  ,__  ,__  ,__  ,0x86,__  ,__  ,__  ,0x96,0x8e,__  ,__  ,__  ,__  ,__  ]),
 op("STY", 0, [__  ,__  ,__  ,__  ,0x84,__  ,__  ,0x94,__  ,0x8c,__  ,__  ,__  ,__  ,__  ]),
 op("TAX", 0, [__  ,0xaa,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("TAY", 0, [__  ,0xa8,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("TSX", 0, [__  ,0xba,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("TXA", 0, [__  ,0x8a,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("TXS", 0, [__  ,0x9a,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("TYA", 0, [__  ,0x98,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
];

#[rustfmt::skip]
static OPC_CMOS: &[Op] = &[
 op("ADC", 0, [__  ,__  ,0x69,__  ,0x65,0x72,__  ,0x75,__  ,0x6d,0x7d,0x79,__  ,0x61,0x71]),
 op("AND", 0, [__  ,__  ,0x29,__  ,0x25,0x32,__  ,0x35,__  ,0x2d,0x3d,0x39,__  ,0x21,0x31]),
 op("ASL", 0, [0x0a,__  ,__  ,__  ,0x06,__  ,__  ,0x16,__  ,0x0e,0x1e,__  ,__  ,__  ,__  ]),
 op("BBR", FEAT_RW,
              [__  ,__  ,__  ,__  ,__  ,__  ,0x0f,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BBS", FEAT_RW,
              [__  ,__  ,__  ,__  ,__  ,__  ,0x8f,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BCC", 0, [__  ,__  ,__  ,0x90,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BCS", 0, [__  ,__  ,__  ,0xb0,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BEQ", 0, [__  ,__  ,__  ,0xf0,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BIT", 0, [__  ,__  ,__  ,__  ,0x24,__  ,__  ,__  ,__  ,0x2c,__  ,__  ,__  ,__  ,__  ]),
 op("BMI", 0, [__  ,__  ,__  ,0x30,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BNE", 0, [__  ,__  ,__  ,0xd0,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BPL", 0, [__  ,__  ,__  ,0x10,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BRA", FEAT_CMOS,
              [__  ,__  ,__  ,0x80,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BRK", 0, [__  ,0x00,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BVC", 0, [__  ,__  ,__  ,0x50,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("BVS", 0, [__  ,__  ,__  ,0x70,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("CLC", 0, [__  ,0x18,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("CLD", 0, [__  ,0xd8,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("CLI", 0, [__  ,0x58,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("CLV", 0, [__  ,0xb8,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("CMP", 0, [__  ,__  ,0xc9,__  ,0xc5,0xd2,__  ,0xd5,__  ,0xcd,0xdd,0xd9,__  ,0xc1,0xd1]),
 op("CPX", 0, [__  ,__  ,0xe0,__  ,0xe4,__  ,__  ,__  ,__  ,0xec,__  ,__  ,__  ,__  ,__  ]),
 op("CPY", 0, [__  ,__  ,0xc0,__  ,0xc4,__  ,__  ,__  ,__  ,0xcc,__  ,__  ,__  ,__  ,__  ]),
 op("DEC", FEAT_CMOS,
              [0x3a,__  ,__  ,__  ,0xc6,__  ,__  ,0xd6,__  ,0xce,0xde,__  ,__  ,__  ,__  ]),
 op("DEX", 0, [__  ,0xca,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("DEY", 0, [__  ,0x88,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("EOR", 0, [__  ,__  ,0x49,__  ,0x45,0x52,__  ,0x55,__  ,0x4d,0x5d,0x59,__  ,0x41,0x51]),
 op("INC", FEAT_CMOS,
              [0x1a,__  ,__  ,__  ,0xe6,__  ,__  ,0xf6,__  ,0xee,0xfe,__  ,__  ,__  ,__  ]),
 op("INX", 0, [__  ,0xe8,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("INY", 0, [__  ,0xc8,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("JMP", 0, [__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,0x4c,0x7c,__  ,0x6c,__  ,__  ]),
 op("JSR", 0, [__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,0x20,__  ,__  ,__  ,__  ,__  ]),
 op("LDA", 0, [__  ,__  ,0xa9,__  ,0xa5,0xb2,__  ,0xb5,__  ,0xad,0xbd,0xb9,__  ,0xa1,0xb1]),
 op("LDX", 0, [__  ,__  ,0xa2,__  ,0xa6,__  ,__  ,__  ,0xb6,0xae,__  ,0xbe,__  ,__  ,__  ]),
 op("LDY", 0, [__  ,__  ,0xa0,__  ,0xa4,__  ,__  ,0xb4,__  ,0xac,0xbc,__  ,__  ,__  ,__  ]),
 op("LSR", 0, [0x4a,__  ,__  ,__  ,0x46,__  ,__  ,0x56,__  ,0x4e,0x5e,__  ,__  ,__  ,__  ]),
 op("NOP", 0, [__  ,0xea,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("ORA", 0, [__  ,__  ,0x09,__  ,0x05,0x12,__  ,0x15,__  ,0x0d,0x1d,0x19,__  ,0x01,0x11]),
 op("PHA", 0, [__  ,0x48,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("PHP", 0, [__  ,0x08,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("PHX", FEAT_CMOS,
              [__  ,0xda,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("PHY", FEAT_CMOS,
              [__  ,0x5a,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("PLA", 0, [__  ,0x68,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("PLP", 0, [__  ,0x28,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("PLX", FEAT_CMOS,
              [__  ,0xfa,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("PLY", FEAT_CMOS,
              [__  ,0x7a,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("RMB", FEAT_RW,
              [__  ,__  ,__  ,__  ,0x07,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("ROL", 0, [0x2a,__  ,__  ,__  ,0x26,__  ,__  ,0x36,__  ,0x2e,0x3e,__  ,__  ,__  ,__  ]),
 op("ROR", FEAT_NMOS,
              [0x6a,__  ,__  ,__  ,0x66,__  ,__  ,0x76,__  ,0x6e,0x7e,__  ,__  ,__  ,__  ]),
 op("RTI", 0, [__  ,0x40,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("RTS", 0, [__  ,0x60,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("SBC", 0, [__  ,__  ,0xe9,__  ,0xe5,0xf2,__  ,0xf5,__  ,0xed,0xfd,0xf9,__  ,0xe1,0xf1]),
 op("SEC", 0, [__  ,0x38,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("SED", 0, [__  ,0xf8,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("SEI", 0, [__  ,0x78,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("SMB", FEAT_RW,
              [__  ,__  ,__  ,__  ,0x87,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("STA", 0, [__  ,__  ,__  ,__  ,0x85,0x92,__  ,0x95,__  ,0x8d,0x9d,0x99,__  ,0x81,0x91]),
 op("STP", FEAT_WDC,
              [__  ,0xdb,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("STX", 0, [__  ,__  ,__  ,__  ,0x86,__  ,__  ,__  ,0x96,0x8e,__  ,__  ,__  ,__  ,__  ]),
 op("STY", 0, [__  ,__  ,__  ,__  ,0x84,__  ,__  ,0x94,__  ,0x8c,__  ,__  ,__  ,__  ,__  ]),
 op("STZ", FEAT_CMOS,
              [__  ,__  ,__  ,__  ,0x64,__  ,__  ,0x74,__  ,0x9c,0x9e,__  ,__  ,__  ,__  ]),
 op("TAX", 0, [__  ,0xaa,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("TAY", 0, [__  ,0xa8,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("TRB", FEAT_CMOS,
              [__  ,__  ,__  ,__  ,0x14,__  ,__  ,__  ,__  ,0x1c,__  ,__  ,__  ,__  ,__  ]),
 op("TSB", FEAT_CMOS,
              [__  ,__  ,__  ,__  ,0x04,__  ,__  ,__  ,__  ,0x0c,__  ,__  ,__  ,__  ,__  ]),
 op("TSX", 0, [__  ,0xba,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("TXA", 0, [__  ,0x8a,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("TXS", 0, [__  ,0x9a,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("TYA", 0, [__  ,0x98,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
 op("WAI", FEAT_WDC,
              [__  ,0xcb,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ,__  ]),
];

fn get_mnemonic<'t>(table: &'t [Op], id: &str) -> Option<&'t Op> {
    table
        .binary_search_by(|o| o.mn.cmp(id))
        .ok()
        .map(|i| &table[i])
}

/// Implied and Accumulator: no operand, or a lone `A`.
fn op_imp_acc(
    asm: &mut Assembler,
    p: &mut usize,
    op: &Op,
    pass: u8,
) -> AsmResult<Option<usize>> {
    if op.opc[AM_ACC] == INV && op.opc[AM_IMP] == INV {
        return Ok(None);
    }

    let save = *p;
    if !is_end(asm.text.at(*p)) {
        let id = asm.text.upcase_run(p);
        if id != "A" {
            *p = save;
            return Ok(None);
        }
    }

    let am = if op.opc[AM_ACC] != INV { AM_ACC } else { AM_IMP };
    asm.output.emit_byte(op.opc[am], pass);

    Ok(Some(am))
}

fn op_imm(asm: &mut Assembler, p: &mut usize, op: &Op, pass: u8) -> AsmResult<usize> {
    *p += 1;
    if op.opc[AM_IMM] == INV {
        return Err(ErrorKind::Target(ERR_AM).into());
    }

    let v = expr::expr(asm, p)?;
    if pass == 2 && !v.defined {
        return Err(ErrorKind::Undefined.into());
    }

    asm.output.emit_byte(op.opc[AM_IMM], pass);
    asm.output.emit_byte(v.to_byte(false)?.v as u8, pass);

    Ok(AM_IMM)
}

fn branch_offset(asm: &Assembler, target: Value, isize: u32, pass: u8) -> AsmResult<u8> {
    let pct = asm.pc.wrapping_add(isize) as u16;
    let t = target.v as u16;

    if pass == 2 {
        if !target.defined {
            return Err(ErrorKind::Undefined.into());
        }
        if (t >= pct && t - pct > 0x7f) || (pct > t && pct - t > 0x80) {
            return Err(ErrorKind::Target(ERR_RELRNG).into());
        }
    }

    Ok(t.wrapping_sub(pct) as u8)
}

fn op_rel(asm: &mut Assembler, op: &Op, v: Value, pass: u8) -> AsmResult<usize> {
    let off = branch_offset(asm, v, 2, pass)?;
    asm.output.emit_byte(op.opc[AM_REL], pass);
    asm.output.emit_byte(off, pass);
    Ok(AM_REL)
}

/// Zero-page-relative (`BBR`/`BBS`): a zero-page operand, then a branch
/// target relative to the three-byte instruction's end.
fn op_zpr(asm: &mut Assembler, p: &mut usize, op: &Op, v: Value, pass: u8) -> AsmResult<usize> {
    asm.text.skip_white(p);
    if asm.text.at(*p) != b',' {
        return Err(ErrorKind::CommaExpected.into());
    }
    asm.text.skip_curr_and_white(p);

    let target = expr::expr(asm, p)?;
    if pass == 2 && !v.defined {
        return Err(ErrorKind::Undefined.into());
    }
    let off = branch_offset(asm, target, 3, pass)?;

    asm.output.emit_byte(op.opc[AM_ZPR], pass);
    asm.output.emit_byte(v.to_byte(false)?.v as u8, pass);
    asm.output.emit_byte(off, pass);

    Ok(AM_ZPR)
}

/// Parenthesized forms: `(zp,X)`, `(zp),Y`, `(abs)`, and the plain
/// `(zp)` indirect, which selects itself for byte operands.
fn op_ind(asm: &mut Assembler, p: &mut usize, op: &Op, pass: u8) -> AsmResult<usize> {
    *p += 1;
    let v = expr::expr(asm, p)?;
    asm.text.skip_white(p);

    let am;
    if asm.text.at(*p) == b',' {
        asm.text.skip_curr_and_white(p);
        let id = asm.text.ident_upcase(p)?;
        if id != "X" {
            return Err(ErrorKind::Target(ERR_INX).into());
        }
        asm.text.skip_white(p);
        if asm.text.at(*p) != b')' {
            return Err(ErrorKind::MissingCloseBrace.into());
        }
        asm.text.skip_curr_and_white(p);
        am = AM_INX;
    } else {
        if asm.text.at(*p) != b')' {
            return Err(ErrorKind::MissingCloseBrace.into());
        }
        asm.text.skip_curr_and_white(p);

        if asm.text.at(*p) == b',' {
            asm.text.skip_curr_and_white(p);
            let id = asm.text.ident_upcase(p)?;
            if id != "Y" {
                return Err(ErrorKind::Target(ERR_INY).into());
            }
            am = AM_INY;
        } else if v.width == Width::Byte && op.opc[AM_ZPI] != INV {
            am = AM_ZPI;
        } else {
            am = AM_IND;
        }
    }

    if op.opc[am] == INV {
        return Err(ErrorKind::Target(ERR_AM).into());
    }

    if pass == 2 {
        if !v.defined {
            return Err(ErrorKind::Undefined.into());
        }
        if matches!(am, AM_INX | AM_INY | AM_ZPI) && v.width != Width::Byte {
            return Err(ErrorKind::IllegalType.into());
        }
    }

    asm.output.emit_byte(op.opc[am], pass);
    if am == AM_IND {
        asm.output.emit_word_le(v.v as u16, pass);
    } else {
        asm.output.emit_byte(v.to_byte(false)?.v as u8, pass);
    }

    Ok(am)
}

/// `expr,X` and `expr,Y`: zero-page when the operand is a byte and the
/// zero-page column is populated, absolute otherwise.
fn op_abxy_zpxy(
    asm: &mut Assembler,
    p: &mut usize,
    op: &Op,
    v: Value,
    pass: u8,
) -> AsmResult<usize> {
    let id = asm.text.ident_upcase(p)?;

    let am = match id.as_str() {
        "X" => {
            if v.width == Width::Byte && op.opc[AM_ZPX] != INV {
                AM_ZPX
            } else if op.opc[AM_ABX] != INV {
                AM_ABX
            } else {
                return Err(ErrorKind::Target(ERR_AM).into());
            }
        }
        "Y" => {
            if v.width == Width::Byte && op.opc[AM_ZPY] != INV {
                AM_ZPY
            } else if op.opc[AM_ABY] != INV {
                AM_ABY
            } else {
                return Err(ErrorKind::Target(ERR_AM).into());
            }
        }
        _ => return Err(ErrorKind::Target(ERR_REG).into()),
    };

    if pass == 2 && !v.defined {
        return Err(ErrorKind::Undefined.into());
    }

    asm.output.emit_byte(op.opc[am], pass);
    if am == AM_ZPX || am == AM_ZPY {
        asm.output.emit_byte(v.to_byte(false)?.v as u8, pass);
    } else {
        asm.output.emit_word_le(v.v as u16, pass);
    }

    Ok(am)
}

fn op_abs_zp(asm: &mut Assembler, op: &Op, v: Value, pass: u8) -> AsmResult<usize> {
    if pass == 2 && !v.defined {
        return Err(ErrorKind::Undefined.into());
    }

    if v.width == Width::Byte && op.opc[AM_ZP] != INV {
        asm.output.emit_byte(op.opc[AM_ZP], pass);
        asm.output.emit_byte(v.to_byte(false)?.v as u8, pass);
        Ok(AM_ZP)
    } else if op.opc[AM_ABS] != INV {
        asm.output.emit_byte(op.opc[AM_ABS], pass);
        asm.output.emit_word_le(v.v as u16, pass);
        Ok(AM_ABS)
    } else {
        Err(ErrorKind::Target(ERR_AM).into())
    }
}

/// One 6502-family model: a name, the feature set it implements, and
/// the opcode table it draws from.
pub struct Mos6502 {
    name: &'static str,
    descr: &'static str,
    features: u8,
    table: &'static [Op],
}

impl Target for Mos6502 {
    fn name(&self) -> &'static str {
        self.name
    }

    fn descr(&self) -> &'static str {
        self.descr
    }

    fn assemble(&self, asm: &mut Assembler, p: &mut usize, pass: u8) -> AsmResult<u32> {
        let id = asm.text.ident_upcase(p)?;

        let op = get_mnemonic(self.table, &id)
            .ok_or_else(|| AsmError::hint(ErrorKind::UnknownInstruction, &id))?;
        if op.req & !self.features != 0 {
            return Err(AsmError::hint(ErrorKind::Target(ERR_NOTIMPL), &id));
        }

        asm.text.skip_white_and_comment(p);

        let am = if let Some(am) = op_imp_acc(asm, p, op, pass)? {
            am
        } else if asm.text.at(*p) == b'#' {
            op_imm(asm, p, op, pass)?
        } else if asm.text.at(*p) == b'(' {
            op_ind(asm, p, op, pass)?
        } else {
            let v = expr::expr(asm, p)?;
            asm.text.skip_white(p);

            if op.opc[AM_REL] != INV {
                op_rel(asm, op, v, pass)?
            } else if op.opc[AM_ZPR] != INV {
                op_zpr(asm, p, op, v, pass)?
            } else if asm.text.at(*p) == b',' {
                asm.text.skip_curr_and_white(p);
                op_abxy_zpxy(asm, p, op, v, pass)?
            } else {
                op_abs_zp(asm, op, v, pass)?
            }
        };

        Ok(AM_SIZE[am])
    }

    fn is_mnemonic(&self, id: &str) -> bool {
        get_mnemonic(self.table, &id.to_ascii_uppercase()).is_some()
    }

    fn error_text(&self, code: u16) -> &'static str {
        match code {
            ERR_AM => "invalid addressing mode",
            ERR_REG => "invalid register",
            ERR_INX => "malformed indirect X addressing",
            ERR_INY => "malformed indirect Y addressing",
            ERR_RELRNG => "relative branch target out of range",
            ERR_NOTIMPL => "instruction not implemented on this processor",
            _ => "??",
        }
    }
}

pub static M6502_OLD: Mos6502 = Mos6502 {
    name: "6502_old",
    descr: "MOS 6502 (early, ROR bug)",
    features: 0,
    table: OPC_NMOS,
};

pub static M6502: Mos6502 = Mos6502 {
    name: "6502",
    descr: "MOS 6502",
    features: FEAT_NMOS,
    table: OPC_NMOS,
};

pub static M6510: Mos6502 = Mos6502 {
    name: "6510",
    descr: "CSG 6510",
    features: FEAT_NMOS,
    table: OPC_NMOS,
};

pub static M8500: Mos6502 = Mos6502 {
    name: "8500",
    descr: "CSG 8500",
    features: FEAT_NMOS,
    table: OPC_NMOS,
};

pub static R65C02: Mos6502 = Mos6502 {
    name: "65c02",
    descr: "Rockwell 65C02",
    features: FEAT_NMOS | FEAT_CMOS | FEAT_RW,
    table: OPC_CMOS,
};

pub static W65C02: Mos6502 = Mos6502 {
    name: "w65c02",
    descr: "WDC 65C02",
    features: FEAT_NMOS | FEAT_CMOS | FEAT_RW | FEAT_WDC,
    table: OPC_CMOS,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_sorted_for_binary_search() {
        for table in [OPC_NMOS, OPC_CMOS] {
            for w in table.windows(2) {
                assert!(w[0].mn < w[1].mn, "{} !< {}", w[0].mn, w[1].mn);
            }
        }
    }

    #[test]
    fn test_mnemonic_lookup() {
        assert!(get_mnemonic(OPC_NMOS, "LDA").is_some());
        assert!(get_mnemonic(OPC_NMOS, "STZ").is_none());
        assert!(get_mnemonic(OPC_CMOS, "STZ").is_some());
        assert!(M6502.is_mnemonic("lda"));
        assert!(!M6502.is_mnemonic("label"));
    }

    #[test]
    fn test_feature_gating() {
        let ror = get_mnemonic(OPC_NMOS, "ROR").unwrap();
        assert_ne!(ror.req & !M6502_OLD.features, 0);
        assert_eq!(ror.req & !M6502.features, 0);

        let stp = get_mnemonic(OPC_CMOS, "STP").unwrap();
        assert_ne!(stp.req & !R65C02.features, 0);
        assert_eq!(stp.req & !W65C02.features, 0);
    }

    #[test]
    fn test_mode_sizes() {
        assert_eq!(AM_SIZE[AM_IMP], 1);
        assert_eq!(AM_SIZE[AM_IMM], 2);
        assert_eq!(AM_SIZE[AM_ABS], 3);
        assert_eq!(AM_SIZE[AM_ZPR], 3);
    }
}
