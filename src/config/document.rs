//! Token-to-document pass, ported from `ini.cpp::parse`. A `Document` is an
//! ordered list of `Section`s; a `Section` is an ordered list of `(key,
//! values)` options. Repeated keys within a section are kept as separate
//! entries — `Section::get_all` appends them in file order, matching the
//! "later occurrences append" rule of spec.md §6.

use std::fs;
use std::path::{Path, PathBuf};

use super::token::{Token, TokenKind, analyse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<super::token::LexError> for ParseError {
    fn from(e: super::token::LexError) -> Self {
        ParseError { message: e.to_string() }
    }
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError { message: e.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Option_ {
    pub key: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Section {
    pub name: String,
    pub options: Vec<Option_>,
}

impl Section {
    /// First value of the first occurrence of `key`, if a simple (non-list)
    /// option was given.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.iter().find(|o| o.key == key).and_then(|o| o.values.first()).map(String::as_str)
    }

    /// All values across every occurrence of `key`, in file order (repeated
    /// keys append per spec.md §6).
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.options.iter().filter(|o| o.key == key).flat_map(|o| o.values.iter()).map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    pub sections: Vec<Section>,
}

impl Document {
    pub fn sections_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Section> {
        self.sections.iter().filter(move |s| s.name == name || s.name.starts_with(&format!("{name}.")))
    }
}

/// Reads and fully expands `@include`/`@tryinclude` statements starting from
/// `path`, the way `ini.cpp::read_file` resolves relative include paths
/// against the including file's parent directory.
pub fn read_file(path: impl AsRef<Path>) -> Result<Document, ParseError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path)?;
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    parse(&source, &parent)
}

pub fn read_string(source: &str) -> Result<Document, ParseError> {
    parse(source, Path::new("."))
}

fn parse(source: &str, base_dir: &Path) -> Result<Document, ParseError> {
    let tokens = analyse(source)?;
    let mut doc = Document::default();
    let mut it = tokens.iter().peekable();

    while let Some(token) = it.next() {
        match &token.kind {
            TokenKind::Include => parse_include(&mut doc, base_dir, &mut it, false)?,
            TokenKind::TryInclude => parse_include(&mut doc, base_dir, &mut it, true)?,
            TokenKind::Section(name) => parse_section(&mut doc, name.clone(), &mut it)?,
            other => return Err(ParseError { message: format!("unexpected token {other:?} on root document") }),
        }
    }

    Ok(doc)
}

type TokenIter<'a> = std::iter::Peekable<std::slice::Iter<'a, Token>>;

fn parse_include(doc: &mut Document, base_dir: &Path, it: &mut TokenIter<'_>, tolerant: bool) -> Result<(), ParseError> {
    let value = match it.next().map(|t| &t.kind) {
        Some(TokenKind::Word(w)) | Some(TokenKind::QuotedWord(w)) => w.clone(),
        _ => return Err(ParseError { message: "expected file name after include statement".into() }),
    };

    let file = if Path::new(&value).is_absolute() { PathBuf::from(&value) } else { base_dir.join(&value) };

    match read_file(&file) {
        Ok(included) => doc.sections.extend(included.sections),
        Err(e) if tolerant => {
            tracing::debug!(path = %file.display(), error = %e, "tryinclude target missing, skipping");
        }
        Err(e) => return Err(e),
    }

    Ok(())
}

fn parse_section(doc: &mut Document, name: String, it: &mut TokenIter<'_>) -> Result<(), ParseError> {
    let mut section = Section { name, options: Vec::new() };

    while let Some(token) = it.peek() {
        if matches!(token.kind, TokenKind::Section(_) | TokenKind::Include | TokenKind::TryInclude) {
            break;
        }

        let token = it.next().unwrap();
        let TokenKind::Word(key) = &token.kind else {
            return Err(ParseError { message: format!("unexpected token {:?} in section definition", token.kind) });
        };

        section.options.push(parse_option(key.clone(), it)?);
    }

    doc.sections.push(section);
    Ok(())
}

fn parse_option(key: String, it: &mut TokenIter<'_>) -> Result<Option_, ParseError> {
    match it.next().map(|t| &t.kind) {
        Some(TokenKind::Assign) => {}
        _ => return Err(ParseError { message: format!("expected '=' assignment after '{key}'") }),
    }

    let mut values = Vec::new();

    match it.peek().map(|t| &t.kind) {
        Some(TokenKind::Word(w)) | Some(TokenKind::QuotedWord(w)) => {
            values.push(w.clone());
            it.next();
        }
        Some(TokenKind::ListBegin) => {
            it.next();
            let mut expect_value = true;
            loop {
                match it.next().map(|t| &t.kind) {
                    Some(TokenKind::ListEnd) => break,
                    Some(TokenKind::Comma) if !expect_value => expect_value = true,
                    Some(TokenKind::Word(w)) | Some(TokenKind::QuotedWord(w)) if expect_value => {
                        values.push(w.clone());
                        expect_value = false;
                    }
                    Some(other) => return Err(ParseError { message: format!("unexpected token {other:?} in list") }),
                    None => return Err(ParseError { message: "unterminated list construct".into() }),
                }
            }
        }
        _ => {}
    }

    Ok(Option_ { key, values })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_section() {
        let doc = read_string("[general]\nverbose = true\n").unwrap();
        assert_eq!(doc.sections[0].name, "general");
        assert_eq!(doc.sections[0].get("verbose"), Some("true"));
    }

    #[test]
    fn parses_list_value() {
        let doc = read_string(r#"[server.libera] channels = ( "#a", "#b" )"#).unwrap();
        assert_eq!(doc.sections[0].get_all("channels"), vec!["#a", "#b"]);
    }

    #[test]
    fn repeated_keys_append() {
        let doc = read_string("[rule]\nservers = a\nservers = b\n").unwrap();
        assert_eq!(doc.sections[0].get_all("servers"), vec!["a", "b"]);
    }

    #[test]
    fn multiple_sections() {
        let doc = read_string("[general]\nverbose = true\n[transport]\nbind = unix\n").unwrap();
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[1].name, "transport");
    }

    #[test]
    fn sections_named_matches_dotted_ids() {
        let doc = read_string("[server.libera]\nhost = irc.libera.chat\n[server.oftc]\nhost = irc.oftc.net\n").unwrap();
        let names: Vec<_> = doc.sections_named("server").map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["server.libera", "server.oftc"]);
    }

    #[test]
    fn tryinclude_missing_file_is_tolerated() {
        let doc = read_string(r#"@tryinclude "does-not-exist.conf"
[general]
verbose = true
"#)
        .unwrap();
        assert_eq!(doc.sections.len(), 1);
    }
}
