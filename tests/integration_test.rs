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

use std::path::Path;

use vasm::assemble;
use vasm::assembler::Assembler;
use vasm::file_reader::MockFileReader;
use vasm::{Assembled, Options};

fn assemble_str(source: &str, output_name: &str) -> Result<Assembled, vasm::Diagnostic> {
    let mut reader = MockFileReader::default();
    reader.add_file("test.asm", source);
    assemble(&[Path::new("test.asm")], output_name, &Options::default(), &reader)
}

fn object_of(source: &str) -> Vec<u8> {
    assemble_str(source, "test.bin").unwrap().object
}

#[test]
fn test_basic_6502_binary() {
    let reader = MockFileReader::default();
    let mut asm = Assembler::new(Options::default(), &reader);
    asm.set_source(
        ".cpu \"6502\"\n\
         .org $C000\n\
         start:  lda #$41\n\
         \x20       sta $0400\n\
         \x20       rts\n",
    );
    let res = asm.run("test.bin").unwrap();

    assert_eq!(res.object, vec![0xa9, 0x41, 0x8d, 0x00, 0x04, 0x60]);
    assert_eq!(res.size, 6);
    assert_eq!(asm.symbols.lookup("start", false).unwrap().value.v, 0xc000);
    assert_eq!(asm.pc, 0xc006);
}

#[test]
fn test_forward_reference() {
    let obj = object_of(
        ".cpu \"6502\"\n\
         .org 0\n\
         \x20  jmp later\n\
         later: nop\n",
    );
    assert_eq!(obj, vec![0x4c, 0x03, 0x00, 0xea]);
}

#[test]
fn test_intel_hex_envelope() {
    let res = assemble_str(
        ".org $0100\n\
         .byte $AA,$BB\n\
         .end $0100\n",
        "test.hex",
    )
    .unwrap();
    let text = String::from_utf8(res.object).unwrap();
    assert_eq!(text, ":02010000AABB98\n:0400000500000100F6\n:00000001FF\n");
}

#[test]
fn test_srecord_envelope() {
    let res = assemble_str(
        ".org $1000\n\
         .byte $11,$22,$33\n\
         .end $1000\n",
        "test.s19",
    )
    .unwrap();
    let text = String::from_utf8(res.object).unwrap();
    assert_eq!(text, "S106100011223383\nS9031000EC\n");
}

#[test]
fn test_conditional_ifdef() {
    let obj = object_of(
        ".define DBG=0\n\
         .ifdef  DBG\n\
         \x20  .byte 1\n\
         .else\n\
         \x20  .byte 2\n\
         .endif\n",
    );
    // DBG is defined (its value does not matter), so the first branch
    // is taken.
    assert_eq!(obj, vec![0x01]);
}

#[test]
fn test_conditional_ifndef_is_stable_across_passes() {
    let obj = object_of(
        ".ifndef FOO\n\
         FOO = 1\n\
         .byte 1\n\
         .endif\n\
         .byte 2\n",
    );
    assert_eq!(obj, vec![0x01, 0x02]);
}

#[test]
fn test_repeat_expansion() {
    let obj = object_of(
        ".org 0\n\
         .repeat 3\n\
         \x20.byte $AA\n\
         .endrep\n",
    );
    assert_eq!(obj, vec![0xaa, 0xaa, 0xaa]);
}

#[test]
fn test_macro_substitution() {
    let obj = object_of(
        "put MACRO a,b\n\
         \x20 .byte a\n\
         \x20 .byte b\n\
         ENDM\n\
         \x20  .org 0\n\
         \x20  put $11,$22\n",
    );
    assert_eq!(obj, vec![0x11, 0x22]);
}

#[test]
fn test_macro_invoked_twice() {
    let obj = object_of(
        "pair MACRO x\n\
         \x20 .byte x\n\
         \x20 .byte x+1\n\
         ENDM\n\
         .org 0\n\
         pair 1\n\
         pair 8\n",
    );
    assert_eq!(obj, vec![1, 2, 8, 9]);
}

#[test]
fn test_macro_parameter_count_mismatch() {
    let err = assemble_str(
        "put MACRO a,b\n\
         \x20 .byte a\n\
         ENDM\n\
         put 1\n",
        "test.bin",
    )
    .unwrap_err();
    assert!(err.message.contains("not enough actual parameters"));
}

#[test]
fn test_include_expansion() {
    let mut reader = MockFileReader::default();
    reader.add_file(
        "main.asm",
        ".org 0\n.byte 1\n.include \"sub.inc\"\n.byte 3\n",
    );
    reader.add_file("sub.inc", ".byte 2\n");
    let res = assemble(
        &[Path::new("main.asm")],
        "test.bin",
        &Options::default(),
        &reader,
    )
    .unwrap();
    assert_eq!(res.object, vec![1, 2, 3]);
}

#[test]
fn test_error_reports_include_file_and_line() {
    let mut reader = MockFileReader::default();
    reader.add_file("main.asm", ".include \"sub.inc\"\n");
    reader.add_file("sub.inc", ".byte 1\n.error \"boom\"\n");
    let err = assemble(
        &[Path::new("main.asm")],
        "test.bin",
        &Options::default(),
        &reader,
    )
    .unwrap_err();
    assert_eq!(err.file, "sub.inc");
    assert_eq!(err.line, 2);
    assert!(err.message.contains("boom"));
}

#[test]
fn test_multiple_input_files() {
    let mut reader = MockFileReader::default();
    reader.add_file("a.asm", ".org 0\n.byte 1\n");
    reader.add_file("b.asm", ".byte 2\n");
    let res = assemble(
        &[Path::new("a.asm"), Path::new("b.asm")],
        "test.bin",
        &Options::default(),
        &reader,
    )
    .unwrap();
    assert_eq!(res.object, vec![1, 2]);
}

#[test]
fn test_end_stops_parsing() {
    let obj = object_of(".byte 1\n.end\n.byte 9\n");
    assert_eq!(obj, vec![1]);
}

#[test]
fn test_local_labels() {
    let obj = object_of(
        ".cpu \"6502\"\n\
         .org 0\n\
         start:\n\
         @loop: nop\n\
         \x20  bne @loop\n",
    );
    assert_eq!(obj, vec![0xea, 0xd0, 0xfd]);
}

#[test]
fn test_dot_labels() {
    let obj = object_of(
        ".cpu \"6502\"\n\
         .org 0\n\
         main: nop\n\
         .1: nop\n\
         \x20 jmp .1\n",
    );
    assert_eq!(obj, vec![0xea, 0xea, 0x4c, 0x01, 0x00]);
}

#[test]
fn test_equ_and_star_assign() {
    let reader = MockFileReader::default();
    let mut asm = Assembler::new(Options::default(), &reader);
    asm.set_source(
        "size EQU 3\n\
         *= $0200\n\
         .byte size\n",
    );
    let res = asm.run("test.bin").unwrap();
    assert_eq!(res.object, vec![3]);
    assert_eq!(asm.org, 0x200);
    assert_eq!(asm.pc, 0x201);
}

#[test]
fn test_addressing_mode_selection() {
    let obj = object_of(
        ".cpu \"6502\"\n\
         .org 0\n\
         \x20lda $10\n\
         \x20lda $0010\n\
         \x20lda $1234\n\
         \x20lda $10,x\n\
         \x20lda ($10),y\n\
         \x20lda ($10,x)\n\
         \x20sta $0400\n\
         \x20ldx $10,y\n\
         \x20jmp ($1234)\n\
         \x20lsr a\n\
         \x20lsr $44\n",
    );
    assert_eq!(
        obj,
        vec![
            0xa5, 0x10, // zero page
            0xad, 0x10, 0x00, // absolute by declared width
            0xad, 0x34, 0x12, // absolute
            0xb5, 0x10, // zp,X
            0xb1, 0x10, // (zp),Y
            0xa1, 0x10, // (zp,X)
            0x8d, 0x00, 0x04, // absolute store
            0xb6, 0x10, // zp,Y
            0x6c, 0x34, 0x12, // (abs)
            0x4a, // accumulator
            0x46, 0x44, // zero page shift
        ]
    );
}

#[test]
fn test_immediate_expressions() {
    let obj = object_of(
        ".cpu \"6502\"\n\
         .org $1000\n\
         addr = $1234\n\
         \x20lda #<addr\n\
         \x20lda #>addr\n\
         \x20lda #'A'\n",
    );
    assert_eq!(obj, vec![0xa9, 0x34, 0xa9, 0x12, 0xa9, 0x41]);
}

#[test]
fn test_branch_out_of_range() {
    let err = assemble_str(
        ".cpu \"6502\"\n\
         .org 0\n\
         \x20beq far\n\
         .fill 200\n\
         far: nop\n",
        "test.bin",
    )
    .unwrap_err();
    assert!(err.message.contains("relative branch target out of range"));
}

#[test]
fn test_cmos_feature_gating() {
    // STZ and STP are CMOS-era; STP additionally needs the WDC core.
    let obj = object_of(".cpu \"65c02\"\n.org 0\n stz $10\n");
    assert_eq!(obj, vec![0x64, 0x10]);

    let err = assemble_str(".cpu \"65c02\"\n stp\n", "test.bin").unwrap_err();
    assert!(err.message.contains("not implemented"));

    let obj = object_of(".cpu \"w65c02\"\n.org 0\n stp\n wai\n");
    assert_eq!(obj, vec![0xdb, 0xcb]);

    let err = assemble_str(".cpu \"6502_old\"\n ror a\n", "test.bin").unwrap_err();
    assert!(err.message.contains("not implemented"));

    let obj = object_of(".cpu \"6502\"\n.org 0\n ror a\n");
    assert_eq!(obj, vec![0x6a]);
}

#[test]
fn test_rockwell_bit_branch() {
    let obj = object_of(
        ".cpu \"65c02\"\n\
         .org 0\n\
         \x20bbr $12,dest\n\
         dest: nop\n",
    );
    assert_eq!(obj, vec![0x0f, 0x12, 0x00, 0xea]);
}

#[test]
fn test_zero_page_indirect_cmos_only() {
    let obj = object_of(".cpu \"65c02\"\n.org 0\n lda ($12)\n");
    assert_eq!(obj, vec![0xb2, 0x12]);

    let err = assemble_str(".cpu \"6502\"\n lda ($12)\n", "test.bin").unwrap_err();
    assert!(err.message.contains("invalid addressing mode"));
}

#[test]
fn test_data_directives() {
    let obj = object_of(
        ".org 0\n\
         .word $1234, label\n\
         label: .dword $11223344\n\
         .ascii \"AB\"\n\
         .asciz \"C\"\n",
    );
    assert_eq!(
        obj,
        vec![0x34, 0x12, 0x04, 0x00, 0x44, 0x33, 0x22, 0x11, 0x41, 0x42, 0x43, 0x00]
    );
}

#[test]
fn test_byte_strings_and_chars() {
    let obj = object_of(".org 0\n.byte \"Hi\",0,'!'\n");
    assert_eq!(obj, vec![0x48, 0x69, 0x00, 0x21]);
}

#[test]
fn test_fill_and_align() {
    let obj = object_of(".org 0\n.byte 1\n.align 4\n.byte 2\n.fill 3,$EE\n");
    assert_eq!(obj, vec![1, 0, 0, 0, 2, 0xee, 0xee, 0xee]);
}

#[test]
fn test_binary_autofill_across_org() {
    let obj = object_of(".org $10\n.byte 1\n.org $14\n.byte 2\n");
    assert_eq!(obj, vec![1, 0, 0, 0, 2]);
}

#[test]
fn test_nofill_disables_gap_padding() {
    let obj = object_of(".nofill\n.org $10\n.byte 1\n.org $20\n.byte 2\n");
    assert_eq!(obj, vec![1, 2]);
}

#[test]
fn test_blob_with_skip_and_count() {
    let mut reader = MockFileReader::default();
    reader.add_file("main.asm", ".org 0\n.blob \"data.bin\",1,3\n");
    reader.add_binary_file("data.bin", &[1, 2, 3, 4, 5]);
    let res = assemble(
        &[Path::new("main.asm")],
        "test.bin",
        &Options::default(),
        &reader,
    )
    .unwrap();
    assert_eq!(res.object, vec![2, 3, 4]);
}

#[test]
fn test_undefined_symbol_fails_in_pass2() {
    let err = assemble_str(".byte nowhere\n", "test.bin").unwrap_err();
    assert!(err.message.contains("undefined value"));
}

#[test]
fn test_case_sensitivity_option() {
    let src = "Foo = 5\n.byte foo\n";
    assert!(assemble_str(src, "test.bin").is_err());

    let mut reader = MockFileReader::default();
    reader.add_file("test.asm", src);
    let opts = Options {
        case_insensitive: true,
        ..Options::default()
    };
    let res = assemble(&[Path::new("test.asm")], "test.bin", &opts, &reader).unwrap();
    assert_eq!(res.object, vec![5]);
}

#[test]
fn test_command_line_defines() {
    let mut reader = MockFileReader::default();
    reader.add_file("test.asm", ".byte EXTRA\n.ifdef FLAG\n.byte 1\n.endif\n");
    let opts = Options {
        defines: vec!["EXTRA=$20".to_string(), "FLAG".to_string()],
        ..Options::default()
    };
    let res = assemble(&[Path::new("test.asm")], "test.bin", &opts, &reader).unwrap();
    assert_eq!(res.object, vec![0x20, 1]);
}

#[test]
fn test_predefined_symbols() {
    let obj = object_of(
        ".ifdef __VASM__\n\
         .byte 1\n\
         .endif\n\
         .cpu \"6502\"\n\
         .ifdef _P6502\n\
         .byte 2\n\
         .endif\n",
    );
    assert_eq!(obj, vec![1, 2]);
}

#[test]
fn test_redefinition_errors() {
    let err = assemble_str(".define X=1\n.define X=2\n", "test.bin").unwrap_err();
    assert!(err.message.contains("illegal redefinition"));

    let err = assemble_str("dup: .byte 1\ndup: .byte 2\n", "test.bin").unwrap_err();
    assert!(err.message.contains("illegal redefinition"));
}

#[test]
fn test_assert_directive() {
    assert!(assemble_str(".assert 1+1\n", "test.bin").is_ok());
    let err = assemble_str(".assert 2-2\n", "test.bin").unwrap_err();
    assert!(err.message.contains("assert failed"));
}

#[test]
fn test_division_by_zero_reports_line() {
    let err = assemble_str(".byte 1\n.byte 1/0\n", "test.bin").unwrap_err();
    assert_eq!(err.line, 2);
    assert!(err.message.contains("division by zero"));
}

#[test]
fn test_unknown_format_prefix_rejected() {
    let err = assemble_str(".byte 1\n", "tek:out").unwrap_err();
    assert!(err.message.contains("file format not enabled"));
}

#[test]
fn test_listing_output() {
    let mut reader = MockFileReader::default();
    reader.add_file(
        "test.asm",
        ".cpu \"6502\"\n.org $C000\nstart: lda #$41\n.end\n",
    );
    let opts = Options {
        listing: true,
        ..Options::default()
    };
    let res = assemble(&[Path::new("test.asm")], "test.bin", &opts, &reader).unwrap();
    let text = res.listing.unwrap();
    assert!(text.contains("File: test.asm"));
    assert!(text.contains("A9 41"));
    assert!(text.contains("lda #$41"));
    // The .org line carries its synthesized annotation.
    assert!(text.contains("*= 00C000"));
}

#[test]
fn test_sum_function() {
    let obj = object_of(
        ".org 0\n\
         .byte 1,2,3\n\
         .byte .sum(0,3)\n",
    );
    assert_eq!(obj, vec![1, 2, 3, 6]);
}

#[test]
fn test_pass_idempotence_on_size() {
    // Forward references must not change instruction sizes between
    // passes; a divergence would corrupt every later label.
    let reader = MockFileReader::default();
    let mut asm = Assembler::new(Options::default(), &reader);
    asm.set_source(
        ".cpu \"6502\"\n\
         .org $00F0\n\
         \x20lda first\n\
         \x20lda #second\n\
         second = $34\n\
         first: rts\n",
    );
    let res = asm.run("test.bin").unwrap();
    // "first" lands below $100, but it was declared forward as a word,
    // so pass 2 keeps the absolute encoding pass 1 sized.
    assert_eq!(res.object, vec![0xad, 0xf5, 0x00, 0xa9, 0x34, 0x60]);
    let first = asm.symbols.lookup("first", false).unwrap();
    assert_eq!(first.value.v, 0xf5);
}
