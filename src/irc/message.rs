//! RFC 1459/2812 client-side message parsing, generalized from the teacher's
//! Twitch-only `IrcParser` (`src/parser/parser.rs`) to the full wire grammar:
//!
//! ```text
//! message    ::= ['@' tags SPACE] [':' prefix SPACE] command [params] crlf
//! tags       ::= tag (';' tag)*
//! tag        ::= key ['=' escaped-value]
//! prefix     ::= nickname ['!' user] ['@' host] | servername
//! params     ::= *( SPACE middle ) [ SPACE ':' trailing ]
//! ```
//!
//! Unlike the teacher's parser, this one owns every field instead of borrowing
//! from the source line: messages here cross an `mpsc` channel into the
//! dispatcher task, so they can't carry a lifetime back to a socket buffer.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use super::lexer::Lexer;

/// The sender of a message: either a full `nick!user@host` hostmask or a bare
/// server name (e.g. the `:irc.example.org` prefix on numerics).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcSource {
    pub nickname: String,
    pub user: Option<String>,
    pub host: Option<String>,
}

impl IrcSource {
    /// True when this looks like a servername prefix rather than a hostmask
    /// (no `!user@host` portion at all).
    pub fn is_server(&self) -> bool {
        self.user.is_none() && self.host.is_none()
    }
}

impl fmt::Display for IrcSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nickname)?;
        if let Some(user) = &self.user {
            write!(f, "!{user}")?;
        }
        if let Some(host) = &self.host {
            write!(f, "@{host}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IrcMessage {
    pub tags: HashMap<String, String>,
    pub source: Option<IrcSource>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    /// The last parameter, if the line carried a `:trailing` argument or at
    /// least one middle parameter.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    pub fn nickname(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.nickname.as_str())
    }
}

impl fmt::Display for IrcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.tags.is_empty() {
            write!(f, "@")?;
            for (i, (k, v)) in self.tags.iter().enumerate() {
                if i > 0 {
                    write!(f, ";")?;
                }
                if v.is_empty() {
                    write!(f, "{k}")?;
                } else {
                    write!(f, "{k}={}", escape_tag_value(v))?;
                }
            }
            write!(f, " ")?;
        }

        if let Some(source) = &self.source {
            write!(f, ":{source} ")?;
        }

        write!(f, "{}", self.command)?;

        if let Some((last, rest)) = self.params.split_last() {
            for param in rest {
                write!(f, " {param}")?;
            }

            if last.is_empty() || last.contains(' ') || last.starts_with(':') {
                write!(f, " :{last}")?;
            } else {
                write!(f, " {last}")?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("missing command")]
    MissingCommand,
}

/// Parses one already-dechunked IRC line (CRLF stripped by the caller's frame
/// reader, trailing CR/LF tolerated anyway).
pub fn parse_line(line: &str) -> Result<IrcMessage, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut lexer = Lexer::new(line);
    let mut tags = HashMap::new();

    if lexer.peek_char() == Some('@') {
        lexer.next();
        let raw = lexer.next_word().unwrap_or("");
        for pair in raw.split(';') {
            if pair.is_empty() {
                continue;
            }
            match pair.split_once('=') {
                Some((key, value)) => {
                    tags.insert(key.to_string(), unescape_tag_value(value));
                }
                None => {
                    tags.insert(pair.to_string(), String::new());
                }
            }
        }
        lexer.skip_whitespace();
    }

    let source = if lexer.peek_char() == Some(':') {
        lexer.next();
        let token = lexer.next_word().ok_or(ParseError::MissingCommand)?;
        lexer.skip_whitespace();
        Some(parse_source(token))
    } else {
        None
    };

    let command = lexer.next_word().ok_or(ParseError::MissingCommand)?.to_string();
    lexer.skip_whitespace();

    let mut params = Vec::new();
    while !lexer.is_eof() {
        if lexer.peek_char() == Some(':') {
            lexer.next();
            params.push(lexer.rest().unwrap_or("").to_string());
            break;
        }

        match lexer.next_word() {
            Some(word) => params.push(word.to_string()),
            None => break,
        }

        lexer.skip_whitespace();
    }

    Ok(IrcMessage { tags, source, command, params })
}

fn parse_source(token: &str) -> IrcSource {
    if let Some((nick, rest)) = token.split_once('!') {
        return match rest.split_once('@') {
            Some((user, host)) => {
                IrcSource { nickname: nick.to_string(), user: Some(user.to_string()), host: Some(host.to_string()) }
            }
            None => IrcSource { nickname: nick.to_string(), user: Some(rest.to_string()), host: None },
        };
    }

    if let Some((nick, host)) = token.split_once('@') {
        return IrcSource { nickname: nick.to_string(), user: None, host: Some(host.to_string()) };
    }

    IrcSource { nickname: token.to_string(), user: None, host: None }
}

fn unescape_tag_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }

    out
}

fn escape_tag_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            ';' => out.push_str("\\:"),
            ' ' => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_privmsg() {
        let msg = parse_line(":jean!jean@host PRIVMSG #staff :hello there\r\n").unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.param(0), Some("#staff"));
        assert_eq!(msg.trailing(), Some("hello there"));
        assert_eq!(msg.nickname(), Some("jean"));
        let source = msg.source.unwrap();
        assert_eq!(source.user.as_deref(), Some("jean"));
        assert_eq!(source.host.as_deref(), Some("host"));
    }

    #[test]
    fn server_prefix_numeric() {
        let msg = parse_line(":irc.example.org 001 jean :Welcome").unwrap();
        assert_eq!(msg.command, "001");
        assert!(msg.source.as_ref().unwrap().is_server());
    }

    #[test]
    fn no_prefix_no_trailing() {
        let msg = parse_line("PING :there").unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.trailing(), Some("there"));
    }

    #[test]
    fn ircv3_tags_roundtrip_value() {
        let msg = parse_line("@id=234AB;time=2011-10-19T16:40:51.620Z :Nick!ident@host.com PRIVMSG me :Hello").unwrap();
        assert_eq!(msg.tags.get("id").map(String::as_str), Some("234AB"));
        assert_eq!(msg.command, "PRIVMSG");
    }

    #[test]
    fn escaped_tag_value() {
        let msg = parse_line(r"@note=a\sb\:c COMMAND").unwrap();
        assert_eq!(msg.tags.get("note").map(String::as_str), Some("a b;c"));
    }

    #[test]
    fn empty_line_is_error() {
        assert_eq!(parse_line("\r\n"), Err(ParseError::Empty));
    }

    #[test]
    fn display_roundtrips_trailing_with_space() {
        let msg = parse_line(":a!b@c PRIVMSG #chan :hi there").unwrap();
        assert_eq!(msg.to_string(), ":a!b@c PRIVMSG #chan :hi there");
    }
}
