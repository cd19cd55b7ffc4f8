//! Two-pass assembly of tokenized source lines.
//!
//! The first pass (`Assembler::scan`) tokenizes every line, binds each
//! `.label` declaration to the index of the next instruction, and keeps the
//! instruction lines. The second pass (`Program::emit`) parses the operands
//! of each kept line against the finished label table and encodes it, so a
//! label may be referenced before it is declared.
use std::collections::HashMap;
use std::convert::TryFrom;
use std::io::BufRead;
use std::slice;

use regex::Regex;
use once_cell::sync::Lazy;

use super::ast::*;
use super::error::{AsmError, ErrorKind};
use super::format::{Format, FormatTable, FORMATS};
use super::lexer::{tokenize, Token, TokenKind};

pub const DEFAULT_MAX_LINE_LENGTH: usize = 256;

static REGISTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^r([0-9]+)$").unwrap());

/// An instruction line kept by the first pass.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SourceLine {
    /// 1-based line number in the source.
    pub number: usize,
    pub tokens: Vec<Token>,
}

/// Label name to instruction index. Redefining a label overwrites it.
#[derive(Clone, Default, Debug)]
pub struct LabelTable {
    labels: HashMap<String, usize>,
}

impl LabelTable {
    pub fn new() -> Self {
        LabelTable::default()
    }

    /// Binds `name` to `index`, returning the previous binding if any.
    pub fn define(&mut self, name: &str, index: usize) -> Option<usize> {
        self.labels.insert(name.to_owned(), index)
    }

    pub fn resolve(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

pub struct Assembler<'f> {
    formats: &'f FormatTable,
    max_line_length: usize,
}

impl Default for Assembler<'static> {
    fn default() -> Self {
        Assembler::new(&FORMATS)
    }
}

impl<'f> Assembler<'f> {
    pub fn new(formats: &'f FormatTable) -> Self {
        Assembler { formats, max_line_length: DEFAULT_MAX_LINE_LENGTH }
    }

    pub fn max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    /// Runs both passes, producing one word per instruction line.
    pub fn assemble<R: BufRead>(&self, reader: R) -> Result<Vec<Word>, AsmError> {
        self.scan(reader)?.emit()
    }

    /// First pass: collects instruction lines and binds labels.
    /// Lines are read as raw bytes: only the `\n` terminator is stripped
    /// before the length check, and bytes that are not UTF-8 are dropped by
    /// the lexer like any other junk.
    pub fn scan<R: BufRead>(&self, mut reader: R) -> Result<Program<'f>, AsmError> {
        let mut lines: Vec<SourceLine> = Vec::new();
        let mut labels = LabelTable::new();
        let mut buf: Vec<u8> = Vec::new();
        let mut number = 0;

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|source| AsmError::Io { line: number + 1, source })?;
            if read == 0 {
                break;
            }
            number += 1;

            if buf.last() == Some(&b'\n') {
                buf.pop();
            }
            if buf.len() > self.max_line_length {
                return Err(AsmError::at(number, ErrorKind::LineTooLong { max: self.max_line_length }));
            }

            let line = String::from_utf8_lossy(&buf);
            let tokens: Vec<Token> = tokenize(&line).collect();
            if tokens.is_empty() {
                continue;
            }
            if tokens[0].kind != TokenKind::Period {
                lines.push(SourceLine { number, tokens });
                continue;
            }

            let name = label_name(&tokens[1..]).map_err(|kind| AsmError::at(number, kind))?;
            if let Some(previous) = labels.define(name, lines.len()) {
                warn!("line {}: label `{}` redefined, was instruction {}", number, name, previous);
            }
            debug!("line {}: label `{}` bound to instruction {}", number, name, lines.len());
            if tokens.len() > 2 {
                warn!("line {}: ignoring {} token(s) after label `{}`", number, tokens.len() - 2, name);
            }
        }

        info!("scanned {} instruction(s) and {} label(s)", lines.len(), labels.len());
        Ok(Program { formats: self.formats, lines, labels })
    }
}

fn label_name(tokens: &[Token]) -> Result<&str, ErrorKind> {
    match tokens.first() {
        Some(token) if token.kind == TokenKind::Identifier => Ok(&token.text),
        Some(token) => Err(ErrorKind::UnexpectedToken {
            expected: vec![TokenKind::Identifier],
            got: token.clone(),
        }),
        None => Err(ErrorKind::UnexpectedEndOfLine { expected: vec![TokenKind::Identifier] }),
    }
}

/// The result of the first pass; the label table is complete and frozen.
#[derive(Debug)]
pub struct Program<'f> {
    formats: &'f FormatTable,
    lines: Vec<SourceLine>,
    labels: LabelTable,
}

impl<'f> Program<'f> {
    pub fn lines(&self) -> &[SourceLine] {
        &self.lines
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Parses every instruction line into an `Instruction`.
    #[cfg(test)]
    pub fn instructions(&self) -> Result<Vec<Instruction>, AsmError> {
        self.lines
            .iter()
            .map(|line| self.instruction(line).map_err(|kind| AsmError::at(line.number, kind)))
            .collect()
    }

    /// Second pass: encodes every instruction line, in order.
    /// The first failure aborts; no partial output is returned.
    pub fn emit(&self) -> Result<Vec<Word>, AsmError> {
        let mut words = Vec::with_capacity(self.lines.len());
        for line in self.lines.iter() {
            let word = self
                .instruction(line)
                .and_then(|ins| ins.assemble())
                .map_err(|kind| AsmError::at(line.number, kind))?;
            trace!("line {}: {:#08x}", line.number, word);
            words.push(word);
        }
        Ok(words)
    }

    fn instruction(&self, line: &SourceLine) -> Result<Instruction, ErrorKind> {
        let mut parser = Parser::new(&line.tokens, &self.labels);
        let format = parser.mnemonic(self.formats)?;
        let ins = parser.operands(format)?;

        let rest = parser.remaining();
        if rest > 0 {
            warn!("line {}: ignoring {} trailing token(s)", line.number, rest);
        }
        Ok(ins)
    }
}

/// Consumes the tokens of one instruction line.
struct Parser<'a> {
    tokens: slice::Iter<'a, Token>,
    labels: &'a LabelTable,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], labels: &'a LabelTable) -> Self {
        Parser { tokens: tokens.iter(), labels }
    }

    fn mnemonic(&mut self, formats: &FormatTable) -> Result<Format, ErrorKind> {
        let token = self.expect(TokenKind::Identifier)?;
        formats
            .get(&token.text)
            .ok_or_else(|| ErrorKind::UnknownMnemonic(token.text.clone()))
    }

    /// Parses the operands `format.shape` demands: registers first, then
    /// the immediate, if any.
    fn operands(&mut self, format: Format) -> Result<Instruction, ErrorKind> {
        let shape = format.shape;
        let mut regs = Vec::with_capacity(shape.register_count());
        for _ in 0..shape.register_count() {
            regs.push(self.register()?);
        }

        let imm = match shape.immediate_bits() {
            Some(_) => Some(self.immediate()?),
            None => None,
        };

        Ok(Instruction::from_operands(shape, format.opcode, &regs, imm))
    }

    fn register(&mut self) -> Result<Register, ErrorKind> {
        let token = self.expect(TokenKind::Identifier)?;
        let digits = match REGISTER.captures(&token.text) {
            Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
            None => {
                return Err(ErrorKind::MalformedRegister {
                    text: token.text.clone(),
                    reason: "expected `r` followed by a decimal index",
                })
            },
        };

        let index = digits.parse::<u32>().map_err(|_| ErrorKind::MalformedRegister {
            text: token.text.clone(),
            reason: "register index is too large",
        })?;
        Register::try_from(index)
    }

    fn immediate(&mut self) -> Result<Immediate, ErrorKind> {
        let token = self.consume().ok_or_else(|| ErrorKind::UnexpectedEndOfLine {
            expected: vec![TokenKind::Number, TokenKind::Period],
        })?;

        match token.kind {
            TokenKind::Number => token
                .text
                .parse::<Immediate>()
                .map_err(|_| ErrorKind::NumberTooLarge(token.text.clone())),
            TokenKind::Period => {
                let name = self.expect(TokenKind::Identifier)?;
                let index = self
                    .labels
                    .resolve(&name.text)
                    .ok_or_else(|| ErrorKind::UndefinedLabel(name.text.clone()))?;
                Immediate::try_from(index).map_err(|_| ErrorKind::NumberTooLarge(index.to_string()))
            },
            _ => Err(ErrorKind::UnexpectedToken {
                expected: vec![TokenKind::Number, TokenKind::Period],
                got: token.clone(),
            }),
        }
    }

    /// Consumes a token of the given kind.
    fn expect(&mut self, kind: TokenKind) -> Result<&'a Token, ErrorKind> {
        match self.consume() {
            Some(token) if token.kind == kind => Ok(token),
            Some(token) => Err(ErrorKind::UnexpectedToken { expected: vec![kind], got: token.clone() }),
            None => Err(ErrorKind::UnexpectedEndOfLine { expected: vec![kind] }),
        }
    }

    #[inline]
    fn consume(&mut self) -> Option<&'a Token> {
        self.tokens.next()
    }

    fn remaining(&self) -> usize {
        self.tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(src: &str) -> Result<Vec<Word>, AsmError> {
        Assembler::default().assemble(src.as_bytes())
    }

    fn error_kind(src: &str) -> ErrorKind {
        match assemble(src) {
            Err(AsmError::Line { kind, .. }) => kind,
            other => panic!("expected a line error, got {:?}", other),
        }
    }

    fn tokens(line: &str) -> Vec<Token> {
        tokenize(line).collect()
    }

    #[test]
    fn test_register() {
        let labels = LabelTable::new();
        for i in 0..REGISTER_COUNT {
            let toks = tokens(&format!("r{}", i));
            let mut parser = Parser::new(&toks, &labels);
            assert_eq!(parser.register().map(|r| r.index()), Ok(i));
        }

        let toks = tokens("r16 r007 x1 r 15");
        let mut parser = Parser::new(&toks, &labels);
        assert_eq!(parser.register(), Err(ErrorKind::RegisterOutOfRange(16)));
        assert_eq!(parser.register().map(|r| r.index()), Ok(7));
        assert!(matches!(parser.register(), Err(ErrorKind::MalformedRegister { .. })));
        assert!(matches!(parser.register(), Err(ErrorKind::MalformedRegister { .. })));
        assert_eq!(
            parser.register(),
            Err(ErrorKind::UnexpectedToken {
                expected: vec![TokenKind::Identifier],
                got: Token::new(TokenKind::Number, "15"),
            })
        );
        assert_eq!(parser.register(), Err(ErrorKind::UnexpectedEndOfLine { expected: vec![TokenKind::Identifier] }));

        let toks = tokens("r99999999999");
        let mut parser = Parser::new(&toks, &labels);
        assert!(matches!(parser.register(), Err(ErrorKind::MalformedRegister { .. })));
    }

    #[test]
    fn test_immediate() {
        let mut labels = LabelTable::new();
        labels.define("start", 0);
        labels.define("end", 12);

        let toks = tokens("0 65535 .end .start 99999999999 r1 .7 .");
        let mut parser = Parser::new(&toks, &labels);
        assert_eq!(parser.immediate(), Ok(0));
        assert_eq!(parser.immediate(), Ok(65535));
        assert_eq!(parser.immediate(), Ok(12));
        assert_eq!(parser.immediate(), Ok(0));
        assert_eq!(parser.immediate(), Err(ErrorKind::NumberTooLarge("99999999999".to_owned())));
        assert_eq!(
            parser.immediate(),
            Err(ErrorKind::UnexpectedToken {
                expected: vec![TokenKind::Number, TokenKind::Period],
                got: Token::new(TokenKind::Identifier, "r1"),
            })
        );
        assert!(matches!(parser.immediate(), Err(ErrorKind::UnexpectedToken { .. })));
        assert_eq!(parser.immediate(), Err(ErrorKind::UnexpectedEndOfLine { expected: vec![TokenKind::Identifier] }));
        assert_eq!(
            parser.immediate(),
            Err(ErrorKind::UnexpectedEndOfLine { expected: vec![TokenKind::Number, TokenKind::Period] })
        );
    }

    #[test]
    fn test_label_table() {
        let mut labels = LabelTable::new();
        assert!(labels.is_empty());
        assert_eq!(labels.define("loop", 3), None);
        assert_eq!(labels.resolve("loop"), Some(3));
        assert_eq!(labels.resolve("loop"), Some(3));
        assert_eq!(labels.define("loop", 5), Some(3));
        assert_eq!(labels.resolve("loop"), Some(5));
        assert_eq!(labels.resolve("other"), None);
    }

    #[test]
    fn test_assemble_each_shape() {
        let src = "
            loadi r1 513
            addi r1, r2, 10
            jmpi 4660
            add r1 r2 r3
            neg r4 r5
            jmp r9
            exit
        ";
        assert_eq!(
            assemble(src).unwrap(),
            vec![0x010201, 0xC0120A, 0xD01234, 0xE00123, 0xF90145, 0xFE0109, 0xFFFFFF]
        );
    }

    #[test]
    fn test_word_count_matches_instruction_lines() {
        let src = "
            .start
            cid r0

            loadi r1 .end
            .middle
            .alias
            sub r1 r1 r0
            jnzi r1 .middle
            .end
            exit
        ";
        let program = Assembler::default().scan(src.as_bytes()).unwrap();
        assert_eq!(program.lines().len(), 5);
        assert_eq!(program.labels().len(), 4);
        assert_eq!(program.labels().resolve("start"), Some(0));
        assert_eq!(program.labels().resolve("middle"), Some(2));
        assert_eq!(program.labels().resolve("alias"), Some(2));
        assert_eq!(program.labels().resolve("end"), Some(4));
        assert_eq!(program.lines()[0].number, 3);

        let words = program.emit().unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[1], 0x010004);
        assert_eq!(words[3], 0x310002);
    }

    #[test]
    fn test_forward_and_backward_references_agree() {
        let forward = assemble("jmpi .end\nexit\n.end\nexit\n").unwrap();
        let backward = assemble("exit\n.end\nexit\njmpi .end\n").unwrap();
        assert_eq!(forward[0], 0xD00002);
        assert_eq!(backward[2], 0xD00001);

        // The same label position gives the same word wherever it is used.
        let both = assemble("jmpi .end\n.end\njmpi .end\n").unwrap();
        assert_eq!(both[0], both[1]);
    }

    #[test]
    fn test_redefined_label_keeps_last_binding() {
        let words = assemble(".top\nexit\n.top\njmpi .top\n").unwrap();
        assert_eq!(words[1], 0xD00001);
    }

    #[test]
    fn test_instructions() {
        let program = Assembler::default().scan("umod r1 r2 r3\nshli r4 r5 2\n".as_bytes()).unwrap();
        let reg = |i: u32| Register::try_from(i).unwrap();
        assert_eq!(
            program.instructions().unwrap(),
            vec![
                Instruction::Reg3 { opcode: 0x06, dest: reg(1), src1: reg(2), src2: reg(3) },
                Instruction::Reg2Imm8 { opcode: 0x4, reg1: reg(4), reg2: reg(5), imm: 2 },
            ]
        );
    }

    #[test]
    fn test_trailing_tokens_are_ignored() {
        assert_eq!(assemble("jmp r1 r2\n").unwrap(), vec![0xFE0101]);
        assert_eq!(assemble(".x y\njmpi .x\n").unwrap(), vec![0xD00000]);
    }

    #[test]
    fn test_errors_abort_assembly() {
        assert_eq!(error_kind("add r1 r2 r16"), ErrorKind::RegisterOutOfRange(16));
        assert_eq!(error_kind("loadi r0 .nowhere"), ErrorKind::UndefinedLabel("nowhere".to_owned()));
        assert_eq!(error_kind("nop"), ErrorKind::UnknownMnemonic("nop".to_owned()));
        assert_eq!(error_kind("addi r1 r2 256"), ErrorKind::ImmediateOutOfRange { value: 256, bits: 8 });
        assert_eq!(error_kind("jmpi 65536"), ErrorKind::ImmediateOutOfRange { value: 65536, bits: 16 });
        assert_eq!(
            error_kind("add r1 r2"),
            ErrorKind::UnexpectedEndOfLine { expected: vec![TokenKind::Identifier] }
        );
        assert_eq!(
            error_kind("12 r1"),
            ErrorKind::UnexpectedToken {
                expected: vec![TokenKind::Identifier],
                got: Token::new(TokenKind::Number, "12"),
            }
        );
        assert_eq!(error_kind("."), ErrorKind::UnexpectedEndOfLine { expected: vec![TokenKind::Identifier] });
        assert!(matches!(error_kind(". 5"), ErrorKind::UnexpectedToken { .. }));
    }

    #[test]
    fn test_error_reports_source_line() {
        let src = "exit\n\n.here\nadd r1 r2 r99\nexit\n";
        match assemble(src) {
            Err(AsmError::Line { line, kind }) => {
                assert_eq!(line, 4);
                assert_eq!(kind, ErrorKind::RegisterOutOfRange(99));
            },
            other => panic!("expected a line error, got {:?}", other),
        }

        // Errors after the first bad line are never reached; nothing is emitted.
        assert!(assemble("exit\njmpi .a\njmpi .b\n").is_err());
    }

    #[test]
    fn test_non_utf8_bytes_are_dropped() {
        let src: &[u8] = b"exit\nadd r1 r2 r3 \xE9\nexit\n";
        assert_eq!(Assembler::default().assemble(src).unwrap(), vec![0xFFFFFF, 0xE00123, 0xFFFFFF]);

        // A stray byte still splits tokens, and later errors keep their line.
        let src: &[u8] = b"jmp r\xFF1\n";
        match Assembler::default().assemble(src) {
            Err(AsmError::Line { line, kind }) => {
                assert_eq!(line, 1);
                assert!(matches!(kind, ErrorKind::MalformedRegister { .. }));
            },
            other => panic!("expected a line error, got {:?}", other),
        }
    }

    #[test]
    fn test_line_length_counts_carriage_return() {
        let short = Assembler::default().max_line_length(4);
        assert_eq!(short.assemble("exit\r\n".as_bytes()).map_err(|e| e.to_string()),
            Err("line 1: line is longer than 4 bytes".to_owned()));
        assert_eq!(short.assemble("exit\nexit".as_bytes()).unwrap(), vec![0xFFFFFF, 0xFFFFFF]);

        let crlf = Assembler::default().assemble("loadi r1 2\r\n\r\nexit\r\n".as_bytes()).unwrap();
        assert_eq!(crlf, vec![0x010002, 0xFFFFFF]);
    }

    #[test]
    fn test_line_too_long() {
        let long = format!("exit {}\n", " ".repeat(DEFAULT_MAX_LINE_LENGTH));
        assert_eq!(error_kind(&long), ErrorKind::LineTooLong { max: DEFAULT_MAX_LINE_LENGTH });

        let exact = format!("exit{}", " ".repeat(DEFAULT_MAX_LINE_LENGTH - 4));
        assert_eq!(assemble(&exact).unwrap(), vec![0xFFFFFF]);

        let short = Assembler::default().max_line_length(4);
        assert!(short.assemble("exit\n".as_bytes()).is_ok());
        assert!(matches!(
            short.assemble("exit \n".as_bytes()),
            Err(AsmError::Line { line: 1, kind: ErrorKind::LineTooLong { max: 4 } })
        ));
    }
}
