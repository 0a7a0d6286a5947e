// Lexical tokenizer used by the build pipeline to find tag candidates

use std::collections::HashMap;

/// Decides whether a word is a reserved word of the language being read.
///
/// Besides plain identifiers, the tokenizer asks about `#` directives
/// (`"#define"`), `"::"` in C++ mode and `"%%"`, `"%{"`, `"%}"` in yacc
/// mode; a word the classifier does not know is returned as ordinary tokens.
pub trait Reserved {
    fn classify(&self, word: &str) -> Option<u32>;
}

impl<F> Reserved for F
where
    F: Fn(&str) -> Option<u32>,
{
    fn classify(&self, word: &str) -> Option<u32> {
        self(word)
    }
}

impl Reserved for HashMap<&'static str, u32> {
    fn classify(&self, word: &str) -> Option<u32> {
        self.get(word).copied()
    }
}

impl Reserved for HashMap<String, u32> {
    fn classify(&self, word: &str) -> Option<u32> {
        self.get(word).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// An identifier that is not a reserved word
    Symbol(String),
    /// Id assigned by the `Reserved` classifier
    Reserved(u32),
    /// A character the caller asked for
    Char(u8),
    /// End of line, only in `cr_flag` mode
    Newline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenizerFlags {
    /// Recognize `#` directives at the start of a line
    pub c_mode: bool,
    /// Recognize `::`
    pub cpp_mode: bool,
    /// Recognize `%%`, `%{` and `%}` at the start of a line
    pub y_mode: bool,
    /// Report line ends as `Token::Newline`
    pub cr_flag: bool,
}

#[derive(Debug, Clone)]
struct Saved {
    token: Token,
    line: u32,
    line_start: usize,
}

/// Lazy token stream over a source buffer.
///
/// Blanks, comments, string and character literals and numbers are skipped;
/// other punctuation is returned only when listed in `interested`.
pub struct Tokenizer<'a> {
    buf: &'a [u8],
    pos: usize,
    line: u32,
    line_start: usize,
    flags: TokenizerFlags,
    token_line: u32,
    token_line_start: usize,
    last: Option<Saved>,
    pushed: Option<Saved>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(buf: &'a [u8], flags: TokenizerFlags) -> Self {
        Self {
            buf,
            pos: 0,
            line: 1,
            line_start: 0,
            flags,
            token_line: 0,
            token_line_start: 0,
            last: None,
            pushed: None,
        }
    }

    /// Line number of the last token returned
    pub fn line(&self) -> u32 {
        self.token_line
    }

    /// Text of the line holding the last token, without its line end
    pub fn line_text(&self) -> String {
        let rest = &self.buf[self.token_line_start.min(self.buf.len())..];
        let end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
        let mut text = &rest[..end];
        if let Some(stripped) = text.strip_suffix(b"\r") {
            text = stripped;
        }
        String::from_utf8_lossy(text).into_owned()
    }

    /// Return the last token again on the next call.
    pub fn push_back(&mut self) {
        if let Some(saved) = self.last.take() {
            self.pushed = Some(saved);
        }
    }

    /// Skip the remainder of the current line. The line end itself is kept.
    pub fn skip_to_eol(&mut self) {
        while let Some(c) = self.peek() {
            if c == b'\n' {
                break;
            }
            if c == b'\\' && self.peek_at(1) == Some(b'\n') {
                self.pos += 2;
                self.newline();
                continue;
            }
            self.pos += 1;
        }
    }

    pub fn next_token<R: Reserved + ?Sized>(&mut self, interested: &[u8], reserved: &R) -> Option<Token> {
        if let Some(saved) = self.pushed.take() {
            self.token_line = saved.line;
            self.token_line_start = saved.line_start;
            self.last = Some(saved.clone());
            return Some(saved.token);
        }

        let token = self.scan(interested, reserved)?;
        self.last = Some(Saved {
            token: token.clone(),
            line: self.token_line,
            line_start: self.token_line_start,
        });
        Some(token)
    }

    fn scan<R: Reserved + ?Sized>(&mut self, interested: &[u8], reserved: &R) -> Option<Token> {
        loop {
            let c = self.peek()?;
            let start = self.pos;
            self.mark();

            match c {
                b'\n' => {
                    self.pos += 1;
                    self.newline();
                    if self.flags.cr_flag {
                        return Some(Token::Newline);
                    }
                }
                b' ' | b'\t' | b'\r' | 0x0b | 0x0c => self.pos += 1,
                b'/' if self.peek_at(1) == Some(b'/') => self.skip_line_comment(),
                b'/' if self.peek_at(1) == Some(b'*') => self.skip_block_comment(),
                b'"' | b'\'' => self.skip_literal(c),
                b'0'..=b'9' => {
                    while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'.' || b == b'_') {
                        self.pos += 1;
                    }
                }
                c if is_ident_start(c) => {
                    let word = self.read_ident();
                    return Some(match reserved.classify(&word) {
                        Some(id) => Token::Reserved(id),
                        None => Token::Symbol(word),
                    });
                }
                b'#' if self.flags.c_mode && self.at_line_start(start) => {
                    if let Some(id) = self.directive(reserved) {
                        return Some(Token::Reserved(id));
                    }
                    self.pos += 1;
                    if interested.contains(&c) {
                        return Some(Token::Char(c));
                    }
                }
                b':' if self.flags.cpp_mode && self.peek_at(1) == Some(b':') => {
                    if let Some(id) = reserved.classify("::") {
                        self.pos += 2;
                        return Some(Token::Reserved(id));
                    }
                    self.pos += 1;
                    if interested.contains(&c) {
                        return Some(Token::Char(c));
                    }
                }
                b'%' if self.flags.y_mode
                    && self.at_line_start(start)
                    && matches!(self.peek_at(1), Some(b'%' | b'{' | b'}')) =>
                {
                    let word = String::from_utf8_lossy(&self.buf[start..start + 2]).into_owned();
                    if let Some(id) = reserved.classify(&word) {
                        self.pos += 2;
                        return Some(Token::Reserved(id));
                    }
                    self.pos += 1;
                    if interested.contains(&c) {
                        return Some(Token::Char(c));
                    }
                }
                _ => {
                    self.pos += 1;
                    if interested.contains(&c) {
                        return Some(Token::Char(c));
                    }
                }
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.buf.get(self.pos + offset).copied()
    }

    fn mark(&mut self) {
        self.token_line = self.line;
        self.token_line_start = self.line_start;
    }

    // pos is just past a '\n'
    fn newline(&mut self) {
        self.line += 1;
        self.line_start = self.pos;
    }

    fn at_line_start(&self, pos: usize) -> bool {
        self.buf[self.line_start..pos]
            .iter()
            .all(|&b| b == b' ' || b == b'\t')
    }

    fn read_ident(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if is_ident_char(b)) {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.buf[start..self.pos]).into_owned()
    }

    /// `#` followed by optional blanks and a word, as `#word`
    fn directive<R: Reserved + ?Sized>(&mut self, reserved: &R) -> Option<u32> {
        let mut end = self.pos + 1;
        while matches!(self.buf.get(end), Some(b' ' | b'\t')) {
            end += 1;
        }
        let word_start = end;
        while matches!(self.buf.get(end), Some(&b) if is_ident_char(b)) {
            end += 1;
        }
        if word_start == end {
            return None;
        }
        let word = format!("#{}", String::from_utf8_lossy(&self.buf[word_start..end]));
        let id = reserved.classify(&word)?;
        self.pos = end;
        Some(id)
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == b'\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) {
        self.pos += 2;
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == b'\n' {
                self.newline();
            } else if c == b'*' && self.peek() == Some(b'/') {
                self.pos += 1;
                return;
            }
        }
    }

    // An unescaped line end also ends the literal
    fn skip_literal(&mut self, quote: u8) {
        self.pos += 1;
        while let Some(c) = self.peek() {
            match c {
                b'\\' => {
                    self.pos += 1;
                    if self.peek() == Some(b'\n') {
                        self.pos += 1;
                        self.newline();
                    } else if self.peek().is_some() {
                        self.pos += 1;
                    }
                }
                b'\n' => return,
                c if c == quote => {
                    self.pos += 1;
                    return;
                }
                _ => self.pos += 1,
            }
        }
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}
