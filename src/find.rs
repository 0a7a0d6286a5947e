// Source enumeration: directory walk or file list, filtered by skip rules

use regex::{Regex, RegexBuilder};
use std::collections::VecDeque;
use std::io::BufRead;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::SourceConfig;
use crate::error::{Result, TagError};

/// One enumerated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// `./`-prefixed path relative to the root, `/` separated
    pub path: String,
    /// The suffix is one of the configured source suffixes
    pub is_source: bool,
}

/// A skip entry that applies to any path component.
struct NameRule {
    pattern: Regex,
    dir_only: bool,
}

/// A skip entry relative to the root.
struct RootedRule {
    path: String,
    dir: bool,
}

/// Compiled skip list and suffix match.
struct Rules {
    names: Vec<NameRule>,
    rooted: Vec<RootedRule>,
    suffix: Regex,
    icase: bool,
}

impl Rules {
    fn new(config: &SourceConfig) -> Result<Self> {
        let build = |source: &str| {
            RegexBuilder::new(source)
                .case_insensitive(config.icase_path)
                .build()
                .map_err(|e| TagError::Config(e.to_string()))
        };

        let mut names = Vec::new();
        let mut rooted = Vec::new();
        for entry in &config.skip {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let dir = entry.ends_with('/');
            let body = entry.trim_end_matches('/');
            if let Some(path) = body.strip_prefix('/') {
                rooted.push(RootedRule {
                    path: path.to_string(),
                    dir,
                });
            } else {
                names.push(NameRule {
                    pattern: build(&glob_to_regex(body))?,
                    dir_only: dir,
                });
            }
        }

        let suffixes: Vec<String> = config.suffixes.iter().map(|s| regex::escape(s)).collect();
        let suffix = build(&format!(r"\.({})$", suffixes.join("|")))?;

        Ok(Self {
            names,
            rooted,
            suffix,
            icase: config.icase_path,
        })
    }

    /// `rel` is root-relative without a leading `./`.
    fn is_skipped(&self, rel: &str, is_dir: bool) -> bool {
        let parts: Vec<&str> = rel.split('/').collect();
        for (i, part) in parts.iter().enumerate() {
            let part_is_dir = is_dir || i + 1 < parts.len();
            if self
                .names
                .iter()
                .any(|rule| (part_is_dir || !rule.dir_only) && rule.pattern.is_match(part))
            {
                return true;
            }
        }

        let eq = |a: &str, b: &str| {
            if self.icase {
                a.eq_ignore_ascii_case(b)
            } else {
                a == b
            }
        };
        self.rooted.iter().any(|rule| {
            if rule.dir {
                let under = rel.len() > rule.path.len()
                    && rel.is_char_boundary(rule.path.len())
                    && eq(&rel[..rule.path.len()], &rule.path)
                    && rel[rule.path.len()..].starts_with('/');
                under || (is_dir && eq(rel, &rule.path))
            } else {
                eq(rel, &rule.path)
            }
        })
    }

    fn is_source(&self, rel: &str) -> bool {
        self.suffix.is_match(rel)
    }
}

/// `*.o` style entry to an anchored regex over one path component
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            _ => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    out
}

fn has_blank(path: &str) -> bool {
    path.contains(' ') || path.contains('\t')
}

/// Root-relative, `/` separated form of `path`. `None` when it is not
/// under `root` or climbs out through `..`.
fn relative(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

enum Source {
    Tree(walkdir::IntoIter),
    List(VecDeque<String>),
}

/// Iterator over the files of a source tree.
pub struct Finder {
    root: PathBuf,
    rules: Rules,
    source: Source,
}

impl Finder {
    /// Walk `root` recursively, in file name order.
    pub fn from_tree(root: impl AsRef<Path>, config: &SourceConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(TagError::NotFound(root.display().to_string()));
        }
        let walker = WalkDir::new(&root).sort_by_file_name().into_iter();
        debug!("Walking {}", root.display());

        Ok(Self {
            root,
            rules: Rules::new(config)?,
            source: Source::Tree(walker),
        })
    }

    /// Enumerate the files named in `list`, one per line, absolute or
    /// relative to `root`.
    pub fn from_filelist<R: BufRead>(list: R, root: impl AsRef<Path>, config: &SourceConfig) -> Result<Self> {
        let root = root.as_ref().canonicalize()?;
        let mut lines = VecDeque::new();
        for line in list.lines() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if !line.trim().is_empty() {
                lines.push_back(line.to_string());
            }
        }
        debug!("Reading {} file list entries", lines.len());

        Ok(Self {
            root,
            rules: Rules::new(config)?,
            source: Source::List(lines),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn next_in_tree(&mut self) -> Option<SourceFile> {
        let walker = match &mut self.source {
            Source::Tree(walker) => walker,
            Source::List(_) => return None,
        };

        loop {
            let entry = match walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot read directory entry: {}", e);
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }
            let rel = match relative(entry.path(), &self.root) {
                Some(rel) => rel,
                None => continue,
            };
            let is_dir = entry.file_type().is_dir();

            if self.rules.is_skipped(&rel, is_dir) {
                debug!("Skipping {}", rel);
                if is_dir {
                    walker.skip_current_dir();
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            if has_blank(&rel) {
                warn!("'{}' ignored: path includes blank characters", rel);
                continue;
            }

            return Some(SourceFile {
                is_source: self.rules.is_source(&rel),
                path: format!("./{}", rel),
            });
        }
    }

    fn next_in_list(&mut self) -> Option<SourceFile> {
        let lines = match &mut self.source {
            Source::List(lines) => lines,
            Source::Tree(_) => return None,
        };

        while let Some(line) = lines.pop_front() {
            let given = Path::new(&line);
            let full = if given.is_absolute() {
                given.to_path_buf()
            } else {
                self.root.join(given)
            };
            let full = match full.canonicalize() {
                Ok(full) => full,
                Err(_) => {
                    warn!("'{}' not found", line);
                    continue;
                }
            };
            if full.is_dir() {
                warn!("'{}' is a directory", line);
                continue;
            }
            let rel = match relative(&full, &self.root) {
                Some(rel) => rel,
                None => {
                    warn!("'{}' is out of the source tree", line);
                    continue;
                }
            };
            if has_blank(&rel) {
                warn!("'{}' ignored: path includes blank characters", rel);
                continue;
            }
            if self.rules.is_skipped(&rel, false) {
                debug!("Skipping {}", rel);
                continue;
            }

            return Some(SourceFile {
                is_source: self.rules.is_source(&rel),
                path: format!("./{}", rel),
            });
        }
        None
    }
}

impl Iterator for Finder {
    type Item = SourceFile;

    fn next(&mut self) -> Option<SourceFile> {
        match self.source {
            Source::Tree(_) => self.next_in_tree(),
            Source::List(_) => self.next_in_list(),
        }
    }
}
