//! Instructions and their 24-bit machine encoding.
//!
//! The word is prefix coded: the more leading bits are set, the wider the
//! opcode field and the fewer operand bits remain.
//!
//! ```text
//! top bits        shape       opcode  operands
//! 0x0 - 0xB       Reg1Imm16   4       reg imm16      (opcode is the prefix)
//! 0xC             Reg2Imm8    4       reg reg imm8
//! 0xD             Imm16       4       imm16
//! 0xE             Reg3        8       reg reg reg
//! 0xF0 - 0xF7     Reg1Imm8    7       reg imm8
//! 0xF8 - 0xFB     Reg2        10      reg reg
//! 0xFC - 0xFD     Imm8        9       imm8
//! 0xFE            Reg1        12      reg
//! 0xFF            Empty       16
//! ```
use std::convert::TryFrom;
use std::fmt;

use super::error::ErrorKind;

/// A 24-bit instruction word, stored in the low bits.
pub type Word = u32;

pub const WORD_MASK: Word = 0xFF_FFFF;

pub const REGISTER_COUNT: u32 = 16;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum OperandShape {
    Reg1Imm16,
    Reg2Imm8,
    Imm16,
    Reg3,
    Reg1Imm8,
    Reg2,
    Imm8,
    Reg1,
    Empty,
}

impl fmt::Display for OperandShape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl OperandShape {
    pub const ALL: [OperandShape; 9] = [
        OperandShape::Reg1Imm16,
        OperandShape::Reg2Imm8,
        OperandShape::Imm16,
        OperandShape::Reg3,
        OperandShape::Reg1Imm8,
        OperandShape::Reg2,
        OperandShape::Imm8,
        OperandShape::Reg1,
        OperandShape::Empty,
    ];

    /// Width of the opcode field in bits.
    pub fn opcode_bits(&self) -> u32 {
        use OperandShape::*;
        match self {
            Reg1Imm16 | Reg2Imm8 | Imm16 => 4,
            Reg3 => 8,
            Reg1Imm8 => 7,
            Reg2 => 10,
            Imm8 => 9,
            Reg1 => 12,
            Empty => 16,
        }
    }

    /// Exclusive upper bound of the opcode.
    pub fn opcode_limit(&self) -> u32 {
        match self {
            // The top four values belong to the longer prefixes.
            OperandShape::Reg1Imm16 => 0xC,
            shape => 1 << shape.opcode_bits(),
        }
    }

    /// Number of register operands, in source order.
    pub fn register_count(&self) -> usize {
        use OperandShape::*;
        match self {
            Reg3 => 3,
            Reg2Imm8 | Reg2 => 2,
            Reg1Imm16 | Reg1Imm8 | Reg1 => 1,
            Imm16 | Imm8 | Empty => 0,
        }
    }

    /// Width of the trailing immediate operand, if the shape has one.
    pub fn immediate_bits(&self) -> Option<u32> {
        use OperandShape::*;
        match self {
            Reg1Imm16 | Imm16 => Some(16),
            Reg2Imm8 | Reg1Imm8 | Imm8 => Some(8),
            Reg3 | Reg2 | Reg1 | Empty => None,
        }
    }
}

/// A general purpose register, always below `REGISTER_COUNT`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Register(u8);

impl Register {
    /// Reads the register in the low nibble of `bits`.
    fn from_nibble(bits: Word) -> Self {
        Register((bits & 0xF) as u8)
    }

    pub fn index(&self) -> u32 {
        self.0 as u32
    }
}

impl TryFrom<u32> for Register {
    type Error = ErrorKind;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value < REGISTER_COUNT {
            Ok(Register(value as u8))
        } else {
            Err(ErrorKind::RegisterOutOfRange(value))
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

pub type Immediate = u32;

/// One instruction with its opcode and operands, tagged by shape.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Instruction {
    Reg1Imm16 { opcode: u32, reg: Register, imm: Immediate },
    Reg2Imm8 { opcode: u32, reg1: Register, reg2: Register, imm: Immediate },
    Imm16 { opcode: u32, imm: Immediate },
    Reg3 { opcode: u32, dest: Register, src1: Register, src2: Register },
    Reg1Imm8 { opcode: u32, reg: Register, imm: Immediate },
    Reg2 { opcode: u32, reg1: Register, reg2: Register },
    Imm8 { opcode: u32, imm: Immediate },
    Reg1 { opcode: u32, reg: Register },
    Empty { opcode: u32 },
}

impl Instruction {
    /// Builds an instruction of `shape` from operands given in source order.
    /// `regs` must hold exactly `shape.register_count()` registers, and
    /// `imm` must be present iff the shape takes an immediate.
    pub fn from_operands(shape: OperandShape, opcode: u32, regs: &[Register], imm: Option<Immediate>) -> Self {
        debug_assert_eq!(regs.len(), shape.register_count());
        debug_assert_eq!(imm.is_some(), shape.immediate_bits().is_some());

        let r = |i: usize| regs[i];
        let imm = imm.unwrap_or(0);
        match shape {
            OperandShape::Reg1Imm16 => Instruction::Reg1Imm16 { opcode, reg: r(0), imm },
            OperandShape::Reg2Imm8 => Instruction::Reg2Imm8 { opcode, reg1: r(0), reg2: r(1), imm },
            OperandShape::Imm16 => Instruction::Imm16 { opcode, imm },
            OperandShape::Reg3 => Instruction::Reg3 { opcode, dest: r(0), src1: r(1), src2: r(2) },
            OperandShape::Reg1Imm8 => Instruction::Reg1Imm8 { opcode, reg: r(0), imm },
            OperandShape::Reg2 => Instruction::Reg2 { opcode, reg1: r(0), reg2: r(1) },
            OperandShape::Imm8 => Instruction::Imm8 { opcode, imm },
            OperandShape::Reg1 => Instruction::Reg1 { opcode, reg: r(0) },
            OperandShape::Empty => Instruction::Empty { opcode },
        }
    }

    pub fn shape(&self) -> OperandShape {
        use Instruction::*;
        match self {
            Reg1Imm16 { .. } => OperandShape::Reg1Imm16,
            Reg2Imm8 { .. } => OperandShape::Reg2Imm8,
            Imm16 { .. } => OperandShape::Imm16,
            Reg3 { .. } => OperandShape::Reg3,
            Reg1Imm8 { .. } => OperandShape::Reg1Imm8,
            Reg2 { .. } => OperandShape::Reg2,
            Imm8 { .. } => OperandShape::Imm8,
            Reg1 { .. } => OperandShape::Reg1,
            Empty { .. } => OperandShape::Empty,
        }
    }

    pub fn opcode(&self) -> u32 {
        use Instruction::*;
        match *self {
            Reg1Imm16 { opcode, .. }
            | Reg2Imm8 { opcode, .. }
            | Imm16 { opcode, .. }
            | Reg3 { opcode, .. }
            | Reg1Imm8 { opcode, .. }
            | Reg2 { opcode, .. }
            | Imm8 { opcode, .. }
            | Reg1 { opcode, .. }
            | Empty { opcode } => opcode,
        }
    }

    /// Assembles the instruction into its 24-bit machine word.
    /// Fails if the opcode or immediate do not fit their fields.
    pub fn assemble(&self) -> Result<Word, ErrorKind> {
        use Instruction::*;
        let shape = self.shape();
        let opcode = self.opcode();
        if opcode >= shape.opcode_limit() {
            return Err(ErrorKind::OpcodeOutOfRange { opcode, bits: shape.opcode_bits() });
        }

        let word = match *self {
            Reg1Imm16 { reg, imm, .. } => (opcode << 20) | (reg.index() << 16) | imm16(imm)?,
            Reg2Imm8 { reg1, reg2, imm, .. } => {
                0xC0_0000 | (opcode << 16) | (reg1.index() << 12) | (reg2.index() << 8) | imm8(imm)?
            },
            Imm16 { imm, .. } => 0xD0_0000 | (opcode << 16) | imm16(imm)?,
            Reg3 { dest, src1, src2, .. } => {
                0xE0_0000 | (opcode << 12) | (dest.index() << 8) | (src1.index() << 4) | src2.index()
            },
            Reg1Imm8 { reg, imm, .. } => 0xF0_0000 | (opcode << 12) | (reg.index() << 8) | imm8(imm)?,
            Reg2 { reg1, reg2, .. } => 0xF8_0000 | (opcode << 8) | (reg1.index() << 4) | reg2.index(),
            Imm8 { imm, .. } => 0xFC_0000 | (opcode << 8) | imm8(imm)?,
            Reg1 { reg, .. } => 0xFE_0000 | (opcode << 4) | reg.index(),
            Empty { .. } => 0xFF_0000 | opcode,
        };
        Ok(word)
    }

    /// Decodes a machine word. Every 24-bit value decodes to exactly one
    /// instruction; bits above the 24th are ignored.
    pub fn disassemble(word: Word) -> Instruction {
        let w = word & WORD_MASK;
        let reg_at = |shift: u32| Register::from_nibble(w >> shift);

        match w >> 20 {
            0x0..=0xB => Instruction::Reg1Imm16 { opcode: w >> 20, reg: reg_at(16), imm: w & 0xFFFF },
            0xC => Instruction::Reg2Imm8 {
                opcode: (w >> 16) & 0xF,
                reg1: reg_at(12),
                reg2: reg_at(8),
                imm: w & 0xFF,
            },
            0xD => Instruction::Imm16 { opcode: (w >> 16) & 0xF, imm: w & 0xFFFF },
            0xE => Instruction::Reg3 { opcode: (w >> 12) & 0xFF, dest: reg_at(8), src1: reg_at(4), src2: reg_at(0) },
            _ => match w >> 16 {
                0xF0..=0xF7 => Instruction::Reg1Imm8 { opcode: (w >> 12) & 0x7F, reg: reg_at(8), imm: w & 0xFF },
                0xF8..=0xFB => Instruction::Reg2 { opcode: (w >> 8) & 0x3FF, reg1: reg_at(4), reg2: reg_at(0) },
                0xFC..=0xFD => Instruction::Imm8 { opcode: (w >> 8) & 0x1FF, imm: w & 0xFF },
                0xFE => Instruction::Reg1 { opcode: (w >> 4) & 0xFFF, reg: reg_at(0) },
                _ => Instruction::Empty { opcode: w & 0xFFFF },
            },
        }
    }
}

fn imm8(imm: Immediate) -> Result<Word, ErrorKind> {
    fits(imm, 8)
}

fn imm16(imm: Immediate) -> Result<Word, ErrorKind> {
    fits(imm, 16)
}

fn fits(value: Immediate, bits: u32) -> Result<Word, ErrorKind> {
    if value < (1 << bits) {
        Ok(value)
    } else {
        Err(ErrorKind::ImmediateOutOfRange { value, bits })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Instruction::*;
        write!(f, "{}[{:#x}]", self.shape(), self.opcode())?;
        match self {
            Reg1Imm16 { reg, imm, .. } | Reg1Imm8 { reg, imm, .. } => write!(f, " {} {}", reg, imm),
            Reg2Imm8 { reg1, reg2, imm, .. } => write!(f, " {} {} {}", reg1, reg2, imm),
            Imm16 { imm, .. } | Imm8 { imm, .. } => write!(f, " {}", imm),
            Reg3 { dest, src1, src2, .. } => write!(f, " {} {} {}", dest, src1, src2),
            Reg2 { reg1, reg2, .. } => write!(f, " {} {}", reg1, reg2),
            Reg1 { reg, .. } => write!(f, " {}", reg),
            Empty { .. } => Ok(()),
        }
    }
}
