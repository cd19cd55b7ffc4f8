//! Errors raised while assembling. Every error is fatal to the whole run.
use std::fmt;
use std::io;
use thiserror::Error;

use super::lexer::{Token, TokenKind};

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum ErrorKind {
    #[error("line is longer than {max} bytes")]
    LineTooLong { max: usize },

    #[error("unexpected token, expected {}, but got {got}", ExpectedKinds(.expected))]
    UnexpectedToken { expected: Vec<TokenKind>, got: Token },

    #[error("unexpected end of line, expected {}", ExpectedKinds(.expected))]
    UnexpectedEndOfLine { expected: Vec<TokenKind> },

    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),

    #[error("malformed register `{text}`: {reason}")]
    MalformedRegister { text: String, reason: &'static str },

    #[error("register index {0} is out of range, expected 0 - 15")]
    RegisterOutOfRange(u32),

    #[error("undefined label `{0}`")]
    UndefinedLabel(String),

    #[error("number `{0}` is too large")]
    NumberTooLarge(String),

    #[error("immediate {value} does not fit in {bits} bits")]
    ImmediateOutOfRange { value: u32, bits: u32 },

    #[error("opcode {opcode:#x} does not fit in {bits} bits")]
    OpcodeOutOfRange { opcode: u32, bits: u32 },
}

#[derive(Debug, Error)]
pub enum AsmError {
    #[error("line {line}: {kind}")]
    Line { line: usize, kind: ErrorKind },

    #[error("line {line}: unable to read source: {source}")]
    Io { line: usize, source: io::Error },
}

impl AsmError {
    pub fn at(line: usize, kind: ErrorKind) -> Self {
        AsmError::Line { line, kind }
    }

    /// The error kind, if this error was raised by the source text.
    #[cfg(test)]
    pub fn kind(&self) -> Option<&ErrorKind> {
        match self {
            AsmError::Line { kind, .. } => Some(kind),
            AsmError::Io { .. } => None,
        }
    }
}

/// Renders a list of token kinds as `A`, `A or B`, `A, B or C`.
struct ExpectedKinds<'a>(&'a [TokenKind]);

impl fmt::Display for ExpectedKinds<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let n = self.0.len();
        for (i, kind) in self.0.iter().enumerate() {
            write!(f, "{}", kind)?;
            if n >= 2 && i < n - 2 {
                write!(f, ", ")?;
            } else if n >= 2 && i == n - 2 {
                write!(f, " or ")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_kinds() {
        use TokenKind::*;
        assert_eq!(ExpectedKinds(&[Identifier]).to_string(), "Identifier");
        assert_eq!(ExpectedKinds(&[Number, Period]).to_string(), "Number or Period");
        assert_eq!(
            ExpectedKinds(&[Identifier, Number, Period]).to_string(),
            "Identifier, Number or Period"
        );
    }

    #[test]
    fn test_display() {
        let err = AsmError::at(3, ErrorKind::UnexpectedToken {
            expected: vec![TokenKind::Number, TokenKind::Period],
            got: Token::new(TokenKind::Identifier, "r1"),
        });
        assert_eq!(
            err.to_string(),
            "line 3: unexpected token, expected Number or Period, but got Identifier `r1`"
        );

        let err = AsmError::at(7, ErrorKind::UnexpectedEndOfLine { expected: vec![TokenKind::Identifier] });
        assert_eq!(err.to_string(), "line 7: unexpected end of line, expected Identifier");
        assert_eq!(err.kind(), Some(&ErrorKind::UnexpectedEndOfLine { expected: vec![TokenKind::Identifier] }));
    }
}
