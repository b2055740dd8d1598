//! Tokenizer for the extended-INI configuration grammar (spec.md §6), ported
//! from the original `ini.cpp::analyse` character-class dispatch. No crate in
//! the dependency corpus models `@include`/list-literal/repeatable-key INI,
//! so this is hand-written in the style of the bot's own IRC lexer
//! (`src/irc/lexer.rs`).

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Section(String),
    Word(String),
    QuotedWord(String),
    Assign,
    ListBegin,
    ListEnd,
    Comma,
    Include,
    TryInclude,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for LexError {}

fn is_quote(c: char) -> bool {
    c == '\'' || c == '"'
}

fn is_space(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn is_list(c: char) -> bool {
    c == '(' || c == ')' || c == ','
}

fn is_reserved(c: char) -> bool {
    is_list(c) || is_quote(c) || c == '[' || c == ']' || c == '@' || c == '#' || c == '='
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Cursor {
    fn new(source: &str) -> Self {
        Self { chars: source.chars().collect(), pos: 0, line: 1, column: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn err(&self, message: impl Into<String>) -> LexError {
        LexError { line: self.line, column: self.column, message: message.into() }
    }
}

pub fn analyse(source: &str) -> Result<Vec<Token>, LexError> {
    let mut cur = Cursor::new(source);
    let mut tokens = Vec::new();

    while let Some(c) = cur.peek() {
        let (line, column) = (cur.line, cur.column);

        match c {
            '\n' => {
                cur.advance();
            }
            '#' => {
                while let Some(c) = cur.peek() {
                    if c == '\n' {
                        break;
                    }
                    cur.advance();
                }
            }
            c if is_space(c) => {
                while cur.peek().is_some_and(is_space) {
                    cur.advance();
                }
            }
            '[' => {
                cur.advance();
                let mut value = String::new();
                loop {
                    match cur.peek() {
                        None => return Err(cur.err("section name expected after '[', got <EOF>")),
                        Some('\n') => return Err(cur.err("section not terminated, missing ']'")),
                        Some(']') => {
                            cur.advance();
                            break;
                        }
                        Some(c) if is_reserved(c) => {
                            return Err(cur.err(format!("section name expected after '[', got '{c}'")));
                        }
                        Some(c) => {
                            value.push(c);
                            cur.advance();
                        }
                    }
                }
                if value.is_empty() {
                    return Err(cur.err("empty section name"));
                }
                tokens.push(Token { kind: TokenKind::Section(value), line, column });
            }
            '=' => {
                cur.advance();
                tokens.push(Token { kind: TokenKind::Assign, line, column });
            }
            c if is_quote(c) => {
                let quote = c;
                cur.advance();
                let mut value = String::new();
                loop {
                    match cur.peek() {
                        None => return Err(cur.err(format!("undisclosed '{quote}', got <EOF>"))),
                        Some(c) if c == quote => {
                            cur.advance();
                            break;
                        }
                        Some(c) => {
                            value.push(c);
                            cur.advance();
                        }
                    }
                }
                tokens.push(Token { kind: TokenKind::QuotedWord(value), line, column });
            }
            '(' => {
                cur.advance();
                tokens.push(Token { kind: TokenKind::ListBegin, line, column });
            }
            ')' => {
                cur.advance();
                tokens.push(Token { kind: TokenKind::ListEnd, line, column });
            }
            ',' => {
                cur.advance();
                tokens.push(Token { kind: TokenKind::Comma, line, column });
            }
            '@' => {
                cur.advance();
                let mut directive = String::new();
                while cur.peek().is_some_and(|c| !is_space(c) && c != '\n') {
                    directive.push(cur.advance().unwrap());
                }
                let kind = match directive.as_str() {
                    "include" => TokenKind::Include,
                    "tryinclude" => TokenKind::TryInclude,
                    other => return Err(cur.err(format!("expected include after '@' token, got '{other}'"))),
                };
                tokens.push(Token { kind, line, column });
            }
            _ if !is_reserved(c) => {
                let mut value = String::new();
                while let Some(c) = cur.peek() {
                    if c.is_whitespace() || is_reserved(c) {
                        break;
                    }
                    value.push(c);
                    cur.advance();
                }
                tokens.push(Token { kind: TokenKind::Word(value), line, column });
            }
            c => return Err(cur.err(format!("unexpected character '{c}'"))),
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_section_and_assignment() {
        let tokens = analyse("[general]\nverbose = true\n").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Section("general".into()));
        assert_eq!(tokens[1].kind, TokenKind::Word("verbose".into()));
        assert_eq!(tokens[2].kind, TokenKind::Assign);
        assert_eq!(tokens[3].kind, TokenKind::Word("true".into()));
    }

    #[test]
    fn tokenizes_quoted_word_with_spaces() {
        let tokens = analyse(r#"name = "hello world""#).unwrap();
        assert_eq!(tokens[2].kind, TokenKind::QuotedWord("hello world".into()));
    }

    #[test]
    fn tokenizes_list() {
        let tokens = analyse(r#"channels = ( "#chan1", "#chan2" )"#).unwrap();
        assert!(tokens.iter().any(|t| t.kind == TokenKind::ListBegin));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Comma));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::ListEnd));
    }

    #[test]
    fn tokenizes_include_directives() {
        let tokens = analyse(r#"@include "other.conf""#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Include);
        let tokens = analyse(r#"@tryinclude "other.conf""#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::TryInclude);
    }

    #[test]
    fn rejects_unterminated_section() {
        let err = analyse("[general\n").unwrap_err();
        assert!(err.message.contains("not terminated"));
    }

    #[test]
    fn comments_are_skipped() {
        let tokens = analyse("# a comment\n[general]").unwrap();
        assert_eq!(tokens.len(), 1);
    }
}
