//! The Assembler module is in charge of taking source text
//! and producing one 24-bit instruction word per instruction line.
//!
//! It does this with a greedy per-line tokenizer and a two-pass
//! driver: the first pass binds labels, the second parses operands
//! and encodes them.

pub mod ast;
pub mod error;
pub mod format;
pub mod lexer;
pub mod parser;

pub use ast::{Instruction, Word};
pub use error::{AsmError, ErrorKind};
pub use parser::Assembler;
