//! This lexer tokenizes a single line of source.
//!
//! Tokens are built by greedy longest-prefix matching: characters are
//! appended to a candidate for as long as the candidate remains a valid
//! prefix of some token kind. Characters that cannot start any token
//! (whitespace, commas, anything outside `.[]`) are dropped, which is what
//! lets operands be separated by spaces or commas alike.
use std::fmt;
use std::str::Chars;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TokenKind {
    Empty,
    Identifier,
    Number,
    BracketLeft,
    BracketRight,
    Period,
    Invalid,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl TokenKind {
    /// Classifies a candidate string.
    /// Returns `Invalid` when no token kind starts with `s`.
    pub fn classify(s: &str) -> TokenKind {
        let mut chars = s.chars();
        let front = match chars.next() {
            Some(c) => c,
            None => return TokenKind::Empty,
        };

        match front {
            '.' | '[' | ']' if s.len() > 1 => TokenKind::Invalid,
            '.' => TokenKind::Period,
            '[' => TokenKind::BracketLeft,
            ']' => TokenKind::BracketRight,
            c if c.is_ascii_alphabetic() => {
                if chars.all(|c| c.is_ascii_alphanumeric()) {
                    TokenKind::Identifier
                } else {
                    TokenKind::Invalid
                }
            },
            c if c.is_ascii_digit() => {
                if chars.all(|c| c.is_ascii_digit()) {
                    TokenKind::Number
                } else {
                    TokenKind::Invalid
                }
            },
            _ => TokenKind::Invalid,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, text: &str) -> Self {
        Token { kind, text: text.to_owned() }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} `{}`", self.kind, self.text)
    }
}

/// Lazily yields the tokens of one line.
pub struct Tokens<'a> {
    chars: Chars<'a>,
    candidate: String,
}

/// Tokenizes a single line. No state is carried between lines.
pub fn tokenize(line: &str) -> Tokens {
    Tokens { chars: line.chars(), candidate: String::new() }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        while let Some(c) = self.chars.next() {
            self.candidate.push(c);
            if TokenKind::classify(&self.candidate) != TokenKind::Invalid {
                continue;
            }

            // Back off to the last valid candidate and restart with `c`.
            self.candidate.pop();
            let committed = match TokenKind::classify(&self.candidate) {
                TokenKind::Empty | TokenKind::Invalid => None,
                kind => Some(Token::new(kind, &self.candidate)),
            };

            self.candidate.clear();
            self.candidate.push(c);
            if TokenKind::classify(&self.candidate) == TokenKind::Invalid {
                trace!("dropping unrecognized character {:?}", c);
                self.candidate.clear();
            }

            if committed.is_some() {
                return committed;
            }
        }

        if self.candidate.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.candidate);
        Some(Token { kind: TokenKind::classify(&text), text })
    }
}
