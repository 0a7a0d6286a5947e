// Record codec: raw tag lines, stored records and output lines

use serde::Serialize;

use crate::error::{Result, TagError};
use crate::index::schema::PAGE_SIZE;

/// Longest tag name accepted by the store
pub const IDENT_LEN: usize = 512;

/// Compact records are cut once their encoded size passes this many bytes
pub const COMPACT_RECORD_LIMIT: usize = PAGE_SIZE / 4;

/// Split `s` into at most `n` blank-separated fields.
///
/// The last field is the remainder of the line after the blanks that
/// precede it, with its own internal spacing intact.
pub fn split_fields(s: &str, n: usize) -> Vec<&str> {
    let mut fields = Vec::with_capacity(n);
    let mut rest = s.trim_start_matches(is_blank);

    while !rest.is_empty() && fields.len() + 1 < n {
        let end = rest.find(is_blank).unwrap_or(rest.len());
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start_matches(is_blank);
    }
    if !rest.is_empty() && n > 0 {
        fields.push(rest);
    }

    fields
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// One occurrence as produced by a tag extractor: the `ctags -x` image
/// `<tag> <line-number> <path> <text>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagLine<'a> {
    pub tag: &'a str,
    pub line: u32,
    pub path: &'a str,
    pub text: &'a str,
}

impl<'a> TagLine<'a> {
    pub fn parse(raw: &'a str) -> Result<Self> {
        let raw_line = raw.trim_end_matches(['\n', '\r']);
        let fields = split_fields(raw_line, 4);
        if fields.len() != 4 {
            return Err(TagError::IllegalTagFormat(raw_line.to_string()));
        }
        let line = fields[1]
            .parse()
            .map_err(|_| TagError::IllegalTagFormat(raw_line.to_string()))?;
        if fields[0].len() > IDENT_LEN {
            return Err(TagError::TagTooLong {
                tag: fields[0].to_string(),
                len: fields[0].len(),
            });
        }

        Ok(Self {
            tag: fields[0],
            line,
            path: fields[2],
            text: fields[3],
        })
    }
}

/// Standard record: `<fid> <tag> <lno> <text>`
pub fn encode_standard(fid: u32, tag: &str, line: u32, text: &str) -> String {
    format!("{} {} {} {}", fid, tag, line, text)
}

/// Encode sorted line numbers as compact records for one tag.
///
/// Returns one or more `<fid> <tag> <n>,<n>,...` records; a new record is
/// started whenever the current one grows past `limit` bytes. With `unique`,
/// a number equal to its predecessor is dropped.
pub fn encode_compact(fid: u32, tag: &str, lines: &[u32], unique: bool, limit: usize) -> Vec<String> {
    let head = format!("{} {} ", fid, tag);
    let mut records = Vec::new();
    let mut buf = head.clone();
    let mut last = 0u32;

    for &n in lines {
        if unique && n == last {
            continue;
        }
        if buf.len() > head.len() {
            buf.push(',');
        }
        buf.push_str(&n.to_string());
        if buf.len() > limit {
            records.push(std::mem::replace(&mut buf, head.clone()));
        }
        last = n;
    }
    if buf.len() > head.len() {
        records.push(buf);
    }

    records
}

/// Storage key for a tag. With `extract_method`, `Class::method` and
/// `Class.method` are stored under `method`.
pub fn storage_key(tag: &str, extract_method: bool) -> &str {
    if !extract_method {
        return tag;
    }
    if let Some(pos) = tag.rfind('.') {
        &tag[pos + 1..]
    } else if let Some(pos) = tag.rfind("::") {
        &tag[pos + 2..]
    } else {
        tag
    }
}

/// Leading fields shared by both stored formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredHead<'a> {
    pub fid: u32,
    pub tag: &'a str,
    /// `<lno> <text>` for standard records, `<n>,<n>,...` for compact ones
    pub rest: &'a str,
}

impl<'a> StoredHead<'a> {
    pub fn parse(record: &'a str) -> Result<Self> {
        let fields = split_fields(record, 3);
        if fields.len() < 3 {
            return Err(TagError::IllegalTagFormat(record.to_string()));
        }
        let fid = fields[0]
            .parse()
            .map_err(|_| TagError::IllegalTagFormat(record.to_string()))?;
        Ok(Self {
            fid,
            tag: fields[1],
            rest: fields[2],
        })
    }
}

/// Split the `<lno> <text>` part of a standard record.
pub fn split_standard(rest: &str) -> Result<(u32, &str)> {
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    if rest[end..].chars().next() != Some(' ') {
        return Err(TagError::IllegalStandardFormat(rest.to_string()));
    }
    let line = rest[..end]
        .parse()
        .map_err(|_| TagError::IllegalStandardFormat(rest.to_string()))?;
    Ok((line, &rest[end + 1..]))
}

/// Take the next line number off a compact list.
///
/// Returns the number and the rest of the list, or `None` for the rest when
/// this was the last number.
pub fn next_line_number(list: &str) -> Result<(u32, Option<&str>)> {
    let end = list
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(list.len());
    if end == 0 {
        return Err(TagError::IllegalCompactFormat(list.to_string()));
    }
    let line = list[..end]
        .parse()
        .map_err(|_| TagError::IllegalCompactFormat(list.to_string()))?;
    let rest = match list[end..].strip_prefix(',') {
        Some(rest) => Some(rest),
        None if end == list.len() => None,
        None => return Err(TagError::IllegalCompactFormat(list.to_string())),
    };
    Ok((line, rest))
}

/// A reconstructed occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRecord {
    pub tag: String,
    pub line: u32,
    pub path: String,
    pub text: String,
}

impl std::fmt::Display for TagRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:<16} {:>4} {:<16} {}", self.tag, self.line, self.path, self.text)
    }
}

/// What `first`/`next` yield: a full record, or only the key in key-only
/// searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Entry {
    Key(String),
    Record(TagRecord),
}

impl Entry {
    pub fn key(&self) -> &str {
        match self {
            Entry::Key(key) => key,
            Entry::Record(record) => &record.tag,
        }
    }

    pub fn into_record(self) -> Option<TagRecord> {
        match self {
            Entry::Record(record) => Some(record),
            Entry::Key(_) => None,
        }
    }
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entry::Key(key) => f.write_str(key),
            Entry::Record(record) => record.fmt(f),
        }
    }
}
