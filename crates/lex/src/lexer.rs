use crate::keywords::to_keyword;
use crate::token::{LiteralKind, Punctuator as P, Token, TokenKind as K};
use diag::Diagnostics;

/// Byte-walking lexer over a source string. Greedy (longest match),
/// one-based line tracking, `//` line comments. Invalid input is recorded
/// on the diagnostics accumulator and skipped so lexing always reaches EOF.
pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, bytes: src.as_bytes(), pos: 0, line: 1 }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }
    fn peek_at(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.pos + n).copied()
    }
    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        Some(c)
    }
    fn starts_with(&self, s: &str) -> bool {
        self.bytes
            .get(self.pos..)
            .is_some_and(|rest| rest.starts_with(s.as_bytes()))
    }

    fn is_ident_start(c: u8) -> bool {
        c == b'_' || c.is_ascii_alphabetic()
    }
    fn is_ident_continue(c: u8) -> bool {
        c == b'_' || c.is_ascii_alphanumeric()
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
                let _ = self.bump();
            }
            if self.starts_with("//") {
                while let Some(c) = self.peek() {
                    if c == b'\n' {
                        break;
                    }
                    let _ = self.bump();
                }
                continue;
            }
            break;
        }
    }

    fn make(&self, kind: K, start: usize, line: u32) -> Token {
        Token { kind, lexeme: self.src[start..self.pos].to_string(), line }
    }

    /// Next token, or `None` at end of input. Lexical errors are pushed to
    /// `diags`; the offending bytes are consumed and scanning continues.
    pub fn next_token(&mut self, diags: &mut Diagnostics) -> Option<Token> {
        loop {
            self.skip_ws_and_comments();
            let start = self.pos;
            let line = self.line;
            let c = self.peek()?;

            // Identifier or reserved word
            if Self::is_ident_start(c) {
                let _ = self.bump();
                while let Some(c2) = self.peek() {
                    if Self::is_ident_continue(c2) {
                        let _ = self.bump();
                    } else {
                        break;
                    }
                }
                let lexeme = &self.src[start..self.pos];
                let kind = match to_keyword(lexeme) {
                    Some(kw) => K::Keyword(kw),
                    None => K::Identifier(lexeme.to_string()),
                };
                return Some(self.make(kind, start, line));
            }

            // Numeric literal: [0-9]+(.[0-9]+)?  — a second dot is malformed
            if c.is_ascii_digit() {
                while matches!(self.peek(), Some(d) if d.is_ascii_digit()) {
                    let _ = self.bump();
                }
                let mut is_float = false;
                if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(d) if d.is_ascii_digit()) {
                    is_float = true;
                    let _ = self.bump(); // '.'
                    while matches!(self.peek(), Some(d) if d.is_ascii_digit()) {
                        let _ = self.bump();
                    }
                }
                if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(d) if d.is_ascii_digit()) {
                    // e.g. 1.2.3 — consume the whole run so we do not emit garbage tokens
                    while matches!(self.peek(), Some(d) if d.is_ascii_digit() || d == b'.') {
                        let _ = self.bump();
                    }
                    let lexeme = self.src[start..self.pos].to_string();
                    diags.lexical(line, "malformed numeric literal", Some(lexeme));
                    continue;
                }
                let lexeme = &self.src[start..self.pos];
                if is_float {
                    match lexeme.parse::<f64>() {
                        Ok(v) => return Some(self.make(K::Literal(LiteralKind::Float(v)), start, line)),
                        Err(_) => {
                            diags.lexical(line, "malformed numeric literal", Some(lexeme.to_string()));
                            continue;
                        }
                    }
                }
                match lexeme.parse::<i64>() {
                    Ok(v) => return Some(self.make(K::Literal(LiteralKind::Int(v)), start, line)),
                    Err(_) => {
                        diags.lexical(line, "integer literal out of range", Some(lexeme.to_string()));
                        continue;
                    }
                }
            }

            // Character literal: exactly one character between single quotes
            if c == b'\'' {
                let _ = self.bump();
                match self.peek() {
                    None => {
                        diags.lexical(line, "unterminated character literal", None);
                        return None;
                    }
                    Some(b'\'') => {
                        let _ = self.bump();
                        diags.lexical(line, "empty character literal", Some("''".to_string()));
                        continue;
                    }
                    Some(_) => {}
                }
                // one payload character, then the closing quote must follow
                let ch_start = self.pos;
                let _ = self.bump();
                // multi-byte UTF-8 payloads count as one character
                while self.pos < self.bytes.len() && !self.src.is_char_boundary(self.pos) {
                    self.pos += 1;
                }
                let payload: char = self.src[ch_start..self.pos].chars().next().unwrap_or('\0');
                if self.peek() == Some(b'\'') {
                    let _ = self.bump();
                    return Some(self.make(K::Literal(LiteralKind::Char(payload)), start, line));
                }
                // not closed after one character: skip to the closing quote
                // on this line (or the line end) and report
                while let Some(c2) = self.peek() {
                    if c2 == b'\n' {
                        break;
                    }
                    let consumed = self.bump();
                    if consumed == Some(b'\'') {
                        break;
                    }
                }
                let lexeme = self.src[start..self.pos].to_string();
                diags.lexical(line, "character literal must contain exactly one character", Some(lexeme));
                continue;
            }

            // Two-character operators before their one-character prefixes
            let two: &[(&str, P)] = &[
                ("==", P::Eq),
                ("!=", P::Ne),
                ("<=", P::Le),
                (">=", P::Ge),
                ("&&", P::AndAnd),
                ("||", P::OrOr),
            ];
            for (pat, p) in two {
                if self.starts_with(pat) {
                    let _ = self.bump();
                    let _ = self.bump();
                    return Some(self.make(K::Punct(*p), start, line));
                }
            }

            let ch = self.bump()?;
            let pk = match ch {
                b'(' => P::LParen,
                b')' => P::RParen,
                b'{' => P::LBrace,
                b'}' => P::RBrace,
                b';' => P::Semicolon,
                b',' => P::Comma,
                b'+' => P::Plus,
                b'-' => P::Minus,
                b'*' => P::Star,
                b'/' => P::Slash,
                b'%' => P::Percent,
                b'=' => P::Assign,
                b'<' => P::Lt,
                b'>' => P::Gt,
                b'!' => P::Bang,
                other => {
                    diags.lexical(line, "unknown character", Some((other as char).to_string()));
                    continue;
                }
            };
            return Some(self.make(K::Punct(pk), start, line));
        }
    }
}

/// Lex an entire source text into an EOF-terminated token list. Lexical
/// errors land on `diags`; the returned list is still EOF-terminated.
pub fn tokenize(src: &str, diags: &mut Diagnostics) -> Vec<Token> {
    let mut lx = Lexer::new(src);
    let mut toks = Vec::new();
    while let Some(t) = lx.next_token(diags) {
        toks.push(t);
    }
    toks.push(Token::eof(lx.line));
    toks
}
