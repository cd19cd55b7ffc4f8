//! The instruction set: every mnemonic with its operand shape and opcode.
//!
//! ```nasm
//! add   rd rs rt    ; Reg3       rd <= rs + rt
//! sub   rd rs rt    ; Reg3       rd <= rs - rt
//! umul  rd rs rt    ; Reg3       unsigned multiply
//! imul  rd rs rt    ; Reg3       signed multiply
//! udiv  rd rs rt    ; Reg3       unsigned divide
//! umod  rd rs rt    ; Reg3       unsigned remainder
//! addi  rd rs IMM8  ; Reg2Imm8
//! subi  rd rs IMM8  ; Reg2Imm8
//! shli  rd rs IMM8  ; Reg2Imm8
//! shri  rd rs IMM8  ; Reg2Imm8
//! load  rd ra       ; Reg2       rd <= [ra]
//! store rs ra       ; Reg2       [ra] <= rs
//! jez   rc ra       ; Reg2       jump to ra if rc is zero
//! jnz   rc ra       ; Reg2       jump to ra if rc is not zero
//! not   rd rs       ; Reg2
//! neg   rd rs       ; Reg2
//! cid   rd          ; Reg1       core id
//! jmp   ra          ; Reg1
//! loadi rd IMM16    ; Reg1Imm16
//! jezi  rc IMM16    ; Reg1Imm16
//! jnzi  rc IMM16    ; Reg1Imm16
//! jmpi  IMM16       ; Imm16
//! exit              ; Empty
//! ```
//!
//! Any immediate may be written as `.label`, which resolves to the index
//! of the instruction following the label declaration.
use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::ast::OperandShape;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Format {
    pub shape: OperandShape,
    pub opcode: u32,
}

/// Immutable mnemonic lookup, built once.
#[derive(Debug)]
pub struct FormatTable {
    formats: HashMap<&'static str, Format>,
}

pub static FORMATS: Lazy<FormatTable> = Lazy::new(FormatTable::new);

const INSTRUCTION_SET: &[(&str, OperandShape, u32)] = &[
    ("add", OperandShape::Reg3, 0x00),
    ("sub", OperandShape::Reg3, 0x01),
    ("umul", OperandShape::Reg3, 0x02),
    ("imul", OperandShape::Reg3, 0x03),
    ("udiv", OperandShape::Reg3, 0x04),
    ("umod", OperandShape::Reg3, 0x06),
    ("addi", OperandShape::Reg2Imm8, 0x0),
    ("subi", OperandShape::Reg2Imm8, 0x1),
    ("shli", OperandShape::Reg2Imm8, 0x4),
    ("shri", OperandShape::Reg2Imm8, 0x5),
    ("load", OperandShape::Reg2, 0x000),
    ("store", OperandShape::Reg2, 0x001),
    ("jez", OperandShape::Reg2, 0x010),
    ("jnz", OperandShape::Reg2, 0x011),
    ("not", OperandShape::Reg2, 0x100),
    ("neg", OperandShape::Reg2, 0x101),
    ("cid", OperandShape::Reg1, 0x000),
    ("jmp", OperandShape::Reg1, 0x010),
    ("loadi", OperandShape::Reg1Imm16, 0x0),
    ("jezi", OperandShape::Reg1Imm16, 0x2),
    ("jnzi", OperandShape::Reg1Imm16, 0x3),
    ("jmpi", OperandShape::Imm16, 0x0),
    ("exit", OperandShape::Empty, 0xFFFF),
];

impl FormatTable {
    pub fn new() -> Self {
        let formats = INSTRUCTION_SET
            .iter()
            .map(|&(name, shape, opcode)| (name, Format { shape, opcode }))
            .collect();
        FormatTable { formats }
    }

    /// Looks up a mnemonic. Mnemonics are case-sensitive.
    pub fn get(&self, mnemonic: &str) -> Option<Format> {
        self.formats.get(mnemonic).copied()
    }

    /// Reverse lookup, used when listing decoded words.
    pub fn mnemonic(&self, shape: OperandShape, opcode: u32) -> Option<&'static str> {
        let wanted = Format { shape, opcode };
        self.formats
            .iter()
            .find(|(_, format)| **format == wanted)
            .map(|(name, _)| *name)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.formats.len()
    }
}

impl Default for FormatTable {
    fn default() -> Self {
        FormatTable::new()
    }
}
