//! Template substitution for plugin-facing output (spec.md §6, GLOSSARY "Template").
//!
//! Grammar: `#{key}` keyword lookup, `${VAR}` environment variable, `@{fg[,bg[,attr...]]}`
//! IRC color escape, `%H:%M` etc. strftime, `##{x}` literal `#{x}`. Ported from
//! the exact escaping rules in `string_util.cpp::format`/`substitute` rather than
//! reinvented, so `##`, `##hello`, and `##{hello}` keep their original meanings.

use std::collections::HashMap;
use std::env;

use chrono::Local;

const IRC_BOLD: char = '\x02';
const IRC_ITALIC: char = '\x09';
const IRC_STRIKE: char = '\x13';
const IRC_RESET: char = '\x0f';
const IRC_UNDERLINE: char = '\x15';
const IRC_UNDERLINE2: char = '\x1f';
const IRC_REVERSE: char = '\x16';

fn irc_color_code(name: &str) -> Option<u8> {
    Some(match name {
        "white" => 0,
        "black" => 1,
        "blue" => 2,
        "green" => 3,
        "red" => 4,
        "brown" => 5,
        "purple" => 6,
        "orange" => 7,
        "yellow" => 8,
        "lightgreen" => 9,
        "cyan" => 10,
        "lightcyan" => 11,
        "lightblue" => 12,
        "pink" => 13,
        "grey" => 14,
        "lightgrey" => 15,
        _ => return None,
    })
}

fn irc_attribute_char(name: &str) -> Option<char> {
    Some(match name {
        "bold" => IRC_BOLD,
        "italic" => IRC_ITALIC,
        "strike" => IRC_STRIKE,
        "reset" => IRC_RESET,
        "underline" => IRC_UNDERLINE,
        "underline2" => IRC_UNDERLINE2,
        "reverse" => IRC_REVERSE,
        _ => return None,
    })
}

/// Which substitution classes are active for a given `format` call.
#[derive(Debug, Clone, Copy)]
pub struct SubstFlags {
    pub date: bool,
    pub keywords: bool,
    pub env: bool,
    pub irc_attrs: bool,
}

impl Default for SubstFlags {
    fn default() -> Self {
        SubstFlags { date: true, keywords: true, env: true, irc_attrs: true }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Subst<'a> {
    pub keywords: HashMap<&'a str, String>,
    pub flags: SubstFlags,
}

fn is_reserved(c: char) -> bool {
    c == '#' || c == '@' || c == '$'
}

fn subst_keywords(content: &str, params: &Subst<'_>) -> String {
    params.keywords.get(content).cloned().unwrap_or_default()
}

fn subst_env(content: &str) -> String {
    env::var(content).unwrap_or_default()
}

fn subst_irc_attrs(content: &str) -> String {
    let list: Vec<&str> = if content.is_empty() {
        Vec::new()
    } else {
        content.split(',').map(str::trim).collect()
    };

    if list.is_empty() {
        return IRC_RESET.to_string();
    }

    let foreground = list[0];
    if foreground.is_empty() && list.len() < 2 {
        return String::new();
    }

    let mut out = String::new();
    out.push('\x03');

    if let Some(code) = irc_color_code(foreground) {
        out.push_str(&code.to_string());
    }

    if list.len() >= 2
        && let Some(code) = irc_color_code(list[1])
    {
        out.push(',');
        out.push_str(&code.to_string());
    }

    for attr in list.iter().skip(2) {
        if let Some(ch) = irc_attribute_char(attr) {
            out.push(ch);
        }
    }

    out
}

/// Expands `text` according to `params`. Mirrors `string_util::format`: date
/// substitution happens first (via `chrono`'s strftime-compatible formatter) so
/// it cannot be re-interpolated by keyword/env/color substitution.
pub fn format(text: &str, params: &Subst<'_>) -> String {
    let text = if params.flags.date {
        Local::now().format(text).to_string()
    } else {
        text.to_string()
    };

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let token = chars[i];

        if !is_reserved(token) {
            out.push(token);
            i += 1;
            continue;
        }

        // Token at the very end of input: emit literally.
        if i + 1 >= chars.len() {
            out.push(token);
            break;
        }

        if chars[i + 1] == '{' {
            let (value, consumed) = substitute(&chars, i + 2, token, params);
            out.push_str(&value);
            i = consumed;
            continue;
        }

        // "@#{var}" -> token differs from the next char: let the next iteration parse it.
        if chars[i + 1] != token {
            out.push(token);
            i += 1;
            continue;
        }

        // Doubled token: "##" / "##hello" / "##{hello}" -> literal, one token shorter.
        if i + 2 >= chars.len() {
            out.push(token);
            out.push(token);
            i += 2;
        } else if chars[i + 2] == '{' {
            out.push(token);
            i += 2;
        } else {
            out.push(token);
            out.push(token);
            i += 2;
        }
    }

    out
}

/// Reads a `token{content}` construct starting at `start` (just past the `{`),
/// returning the substituted value and the index just past the closing `}`.
fn substitute(chars: &[char], start: usize, token: char, params: &Subst<'_>) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && chars[end] != '}' {
        end += 1;
    }

    let content: String = chars[start..end].iter().collect();
    let next = if end < chars.len() { end + 1 } else { end };

    let default_value = format!("{token}{{{content}}}");

    let value = match token {
        '#' if params.flags.keywords => subst_keywords(&content, params),
        '$' if params.flags.env => subst_env(&content),
        '@' if params.flags.irc_attrs => subst_irc_attrs(&content),
        _ => default_value,
    };

    (value, next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subst_with(keywords: &[(&str, &str)]) -> Subst<'_> {
        Subst {
            keywords: keywords.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            flags: SubstFlags { date: false, ..Default::default() },
        }
    }

    #[test]
    fn keyword_lookup() {
        let params = subst_with(&[("target", "jean")]);
        assert_eq!(format("hello #{target}!", &params), "hello jean!");
    }

    #[test]
    fn missing_keyword_is_empty() {
        let params = subst_with(&[]);
        assert_eq!(format("x#{missing}y", &params), "xy");
    }

    #[test]
    fn double_hash_is_literal() {
        let params = subst_with(&[]);
        assert_eq!(format("##{hello}", &params), "#{hello}");
        assert_eq!(format("##hello", &params), "##hello");
        assert_eq!(format("##", &params), "##");
    }

    #[test]
    fn env_lookup() {
        unsafe { env::set_var("IRCCD_TEST_VAR", "value123") };
        let params = subst_with(&[]);
        assert_eq!(format("v=${IRCCD_TEST_VAR}", &params), "v=value123");
        unsafe { env::remove_var("IRCCD_TEST_VAR") };
    }

    #[test]
    fn irc_color_reset_on_empty() {
        let params = subst_with(&[]);
        assert_eq!(format("@{}", &params), IRC_RESET.to_string());
    }

    #[test]
    fn irc_color_fg_bg() {
        let params = subst_with(&[]);
        assert_eq!(format("@{red,white}", &params), "\x034,0");
    }

    #[test]
    fn trailing_reserved_token_is_literal() {
        let params = subst_with(&[]);
        assert_eq!(format("trailing#", &params), "trailing#");
    }
}
