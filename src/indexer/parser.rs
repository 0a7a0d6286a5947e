// C-family tag extraction on top of the tokenizer

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::token::{Token, Tokenizer, TokenizerFlags};

/// `#define`
pub const SHARP_DEFINE: u32 = 1;
/// Directives whose remaining line carries no tags (`#include`, `#if`, ...)
pub const SHARP_SKIP: u32 = 2;
/// Any other preprocessor directive
pub const SHARP_OTHER: u32 = 3;
/// Language keywords
pub const KEYWORD: u32 = 10;

/// Reserved words of C, including the preprocessor directives.
pub static C_RESERVED: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    let mut words = HashMap::new();
    words.insert("#define", SHARP_DEFINE);
    for directive in [
        "#include", "#include_next", "#import", "#if", "#ifdef", "#ifndef", "#elif", "#else",
        "#endif", "#undef", "#pragma", "#error", "#warning", "#line", "#ident",
    ] {
        words.insert(directive, SHARP_SKIP);
    }
    for keyword in [
        "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
        "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
        "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch",
        "typedef", "union", "unsigned", "void", "volatile", "while", "_Bool", "_Complex",
        "_Imaginary", "__attribute__", "__inline", "__inline__", "__asm__", "asm",
    ] {
        words.insert(keyword, KEYWORD);
    }
    words
});

const INTERESTED: &[u8] = b"{}()";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrenceKind {
    Definition,
    /// Any other use of a name; the build decides later whether it is a
    /// reference to a definition or a plain symbol
    Other,
}

/// A tag candidate found in one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub tag: String,
    pub line: u32,
    pub text: String,
    pub kind: OccurrenceKind,
}

impl Occurrence {
    /// The `ctags -x` line accepted by `TagStore::put`
    pub fn tag_line(&self, path: &str) -> String {
        format!("{} {} {} {}", self.tag, self.line, path, self.text)
    }
}

/// Extract tag candidates from a C source buffer.
///
/// A definition is a name at brace level 0 followed by a parenthesized list
/// and then `{`, or the name introduced by `#define`. Every other
/// identifier that is not a reserved word is an `Other` occurrence.
pub fn parse_c(src: &[u8]) -> Vec<Occurrence> {
    let reserved = &*C_RESERVED;
    let mut tokenizer = Tokenizer::new(
        src,
        TokenizerFlags {
            c_mode: true,
            ..TokenizerFlags::default()
        },
    );
    let mut out = Vec::new();
    let mut level = 0usize;

    while let Some(token) = tokenizer.next_token(INTERESTED, reserved) {
        match token {
            Token::Reserved(SHARP_DEFINE) => match tokenizer.next_token(INTERESTED, reserved) {
                Some(Token::Symbol(name)) => out.push(occurrence(&tokenizer, name, OccurrenceKind::Definition)),
                Some(_) => tokenizer.push_back(),
                None => break,
            },
            Token::Reserved(SHARP_SKIP) => tokenizer.skip_to_eol(),
            Token::Reserved(_) => {}
            Token::Char(b'{') => level += 1,
            Token::Char(b'}') => level = level.saturating_sub(1),
            Token::Symbol(name) if level == 0 => {
                let at = out.len();
                out.push(occurrence(&tokenizer, name, OccurrenceKind::Other));

                match tokenizer.next_token(INTERESTED, reserved) {
                    Some(Token::Char(b'(')) => {
                        read_arguments(&mut tokenizer, &mut out);
                        match tokenizer.next_token(INTERESTED, reserved) {
                            Some(Token::Char(b'{')) => {
                                out[at].kind = OccurrenceKind::Definition;
                                level += 1;
                            }
                            Some(_) => tokenizer.push_back(),
                            None => break,
                        }
                    }
                    Some(_) => tokenizer.push_back(),
                    None => break,
                }
            }
            Token::Symbol(name) => out.push(occurrence(&tokenizer, name, OccurrenceKind::Other)),
            Token::Char(_) | Token::Newline => {}
        }
    }

    out
}

/// Consume tokens up to the `)` matching an already read `(`.
fn read_arguments(tokenizer: &mut Tokenizer<'_>, out: &mut Vec<Occurrence>) {
    let reserved = &*C_RESERVED;
    let mut depth = 1usize;
    while let Some(token) = tokenizer.next_token(INTERESTED, reserved) {
        match token {
            Token::Char(b'(') => depth += 1,
            Token::Char(b')') => {
                depth -= 1;
                if depth == 0 {
                    return;
                }
            }
            Token::Symbol(name) => out.push(occurrence(tokenizer, name, OccurrenceKind::Other)),
            _ => {}
        }
    }
}

fn occurrence(tokenizer: &Tokenizer<'_>, tag: String, kind: OccurrenceKind) -> Occurrence {
    Occurrence {
        tag,
        line: tokenizer.line(),
        text: tokenizer.line_text(),
        kind,
    }
}
