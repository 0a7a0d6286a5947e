// Abbreviation codec for source line text stored in standard records
//
// Encoded text uses '@' as an escape:
//   @@        a literal '@'
//   @n        the tag name the record is stored under
//   @<c>      the word registered for letter <c> in the abbreviation table

use crate::error::{Result, TagError};

/// Table used when a database is created without an explicit one
pub const DEFAULT_ABBREVIATION: &str = "define:d function:f macro:m return:r void:v";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abbreviation {
    spec: String,
    words: Vec<(char, String)>,
}

impl Abbreviation {
    /// Parse a table of blank-separated `word:letter` pairs.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut words: Vec<(char, String)> = Vec::new();

        for item in spec.split_whitespace() {
            let (word, letter) = item
                .split_once(':')
                .ok_or_else(|| TagError::InvalidAbbreviation(format!("'{}' is not word:letter", item)))?;
            let mut chars = letter.chars();
            let c = match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => c,
                _ => {
                    return Err(TagError::InvalidAbbreviation(format!(
                        "'{}' needs a single letter abbreviation",
                        item
                    )))
                }
            };
            if c == 'n' {
                return Err(TagError::InvalidAbbreviation(
                    "letter 'n' is reserved for the tag name".to_string(),
                ));
            }
            if word.is_empty() || word.contains('@') {
                return Err(TagError::InvalidAbbreviation(format!("bad word in '{}'", item)));
            }
            if words.iter().any(|(other, _)| *other == c) {
                return Err(TagError::InvalidAbbreviation(format!("letter '{}' used twice", c)));
            }
            words.push((c, word.to_string()));
        }

        // longest words first so that a word is never shadowed by its prefix
        words.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        Ok(Self {
            spec: spec.to_string(),
            words,
        })
    }

    /// The table as stored in the database meta options
    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn compress(&self, text: &str, tag: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        'outer: while let Some(c) = rest.chars().next() {
            if c == '@' {
                out.push_str("@@");
                rest = &rest[1..];
                continue;
            }
            if !tag.is_empty() && rest.starts_with(tag) {
                out.push_str("@n");
                rest = &rest[tag.len()..];
                continue;
            }
            for (letter, word) in &self.words {
                if rest.starts_with(word.as_str()) {
                    out.push('@');
                    out.push(*letter);
                    rest = &rest[word.len()..];
                    continue 'outer;
                }
            }
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }

        out
    }

    pub fn uncompress(&self, text: &str, tag: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len() * 2);
        let mut chars = text.chars();

        while let Some(c) = chars.next() {
            if c != '@' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('@') => out.push('@'),
                Some('n') => out.push_str(tag),
                Some(letter) => match self.words.iter().find(|(c, _)| *c == letter) {
                    Some((_, word)) => out.push_str(word),
                    None => {
                        return Err(TagError::IllegalStandardFormat(format!(
                            "unknown abbreviation '@{}' in '{}'",
                            letter, text
                        )))
                    }
                },
                None => {
                    return Err(TagError::IllegalStandardFormat(format!(
                        "dangling '@' in '{}'",
                        text
                    )))
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_tag_and_words() {
        let ab = Abbreviation::parse(DEFAULT_ABBREVIATION).unwrap();
        let text = "#define MAX_LEN 10";
        let packed = ab.compress(text, "MAX_LEN");
        assert_eq!(packed, "#@d @n 10");
        assert_eq!(ab.uncompress(&packed, "MAX_LEN").unwrap(), text);
    }

    #[test]
    fn test_at_sign_round_trip() {
        let ab = Abbreviation::parse(DEFAULT_ABBREVIATION).unwrap();
        let text = "mail@@host @n @d void";
        let packed = ab.compress(text, "host");
        assert_eq!(ab.uncompress(&packed, "host").unwrap(), text);
    }

    #[test]
    fn test_uncompress_rejects_garbage() {
        let ab = Abbreviation::parse(DEFAULT_ABBREVIATION).unwrap();
        assert!(ab.uncompress("abc@", "t").is_err());
        assert!(ab.uncompress("@z", "t").is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(Abbreviation::parse("define").is_err());
        assert!(Abbreviation::parse("define:dd").is_err());
        assert!(Abbreviation::parse("name:n").is_err());
        assert!(Abbreviation::parse("define:d do:d").is_err());
        assert!(Abbreviation::parse("").unwrap().words.is_empty());
    }

    #[test]
    fn test_multibyte_text() {
        let ab = Abbreviation::parse(DEFAULT_ABBREVIATION).unwrap();
        let text = "return \"héllo\"; // ünïcode";
        let packed = ab.compress(text, "héllo");
        assert_eq!(ab.uncompress(&packed, "héllo").unwrap(), text);
    }
}
