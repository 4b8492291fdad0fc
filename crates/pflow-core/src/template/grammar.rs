//! Parses the `${path}` expression grammar:
//!
//! ```text
//! path   := ident ( subscript )?  ( "." ident ( subscript )? )*
//! subscript := "[" integer "]" ( "[" integer "]" )*
//! ident  := [A-Za-z_] [A-Za-z0-9_-]*
//! ```
//!
//! No external regex crate is used: the `$$` escape requires a negative
//! look-behind, which the `regex` crate's RE2-derived engine cannot
//! express, so the scanner below and the path grammar are both hand-rolled.

use crate::error::UserError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(i64),
}

pub type Path = Vec<Segment>;

pub fn path_to_string(path: &Path) -> String {
    let mut out = String::new();
    for seg in path {
        match seg {
            Segment::Key(k) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(k);
            }
            Segment::Index(i) => out.push_str(&format!("[{}]", i)),
        }
    }
    out
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn validate_ident(s: &str) -> Result<(), String> {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_ident_start(c) => {}
        _ => return Err(format!("invalid identifier `{}`", s)),
    }
    if chars.any(|c| !is_ident_continue(c)) {
        return Err(format!("invalid identifier `{}`", s));
    }
    Ok(())
}

/// Parses `[12][3]`-style bracket chains following an identifier.
fn parse_brackets(rest: &str, out: &mut Path) -> Result<(), String> {
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'[' {
            return Err(format!("expected `[` at `{}`", &rest[i..]));
        }
        let close = rest[i..]
            .find(']')
            .map(|p| p + i)
            .ok_or_else(|| "unterminated `[`".to_string())?;
        let digits = &rest[i + 1..close];
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("invalid array index `{}`", digits));
        }
        let n: i64 = digits
            .parse()
            .map_err(|_| format!("array index out of range: {}", digits))?;
        out.push(Segment::Index(n));
        i = close + 1;
    }
    Ok(())
}

/// Parses the text between `${` and `}` into a sequence of segments.
pub fn parse_path(raw: &str) -> Result<Path, String> {
    if raw.is_empty() {
        return Err("empty template path".to_string());
    }
    let mut segments = Path::new();
    for part in raw.split('.') {
        if part.is_empty() {
            return Err(format!("empty path segment in `{}`", raw));
        }
        let bracket_pos = part.find('[');
        let ident_str = match bracket_pos {
            Some(p) => &part[..p],
            None => part,
        };
        validate_ident(ident_str)?;
        segments.push(Segment::Key(ident_str.to_string()));
        if let Some(p) = bracket_pos {
            parse_brackets(&part[p..], &mut segments)?;
        }
    }
    Ok(segments)
}

pub fn parse_path_checked(raw: &str) -> Result<Path, UserError> {
    parse_path(raw).map_err(|reason| UserError::TemplateSyntax {
        template: format!("${{{}}}", raw),
        reason,
    })
}

/// One `${...}` occurrence located inside a larger string.
pub struct Match<'a> {
    pub full: &'a str,
    pub start: usize,
    pub end: usize,
    pub raw_path: &'a str,
}

/// Scans `s` for `${...}` references, honoring the `$$` escape (a doubled
/// leading `$` produces one literal `$` and suppresses template expansion of
/// the immediately following `{...}`).
///
/// Returns the list of real (non-escaped) matches plus the positions of
/// escaped `$$` markers so callers can reconstruct the literal output.
pub fn scan<'a>(s: &'a str) -> Result<(Vec<Match<'a>>, Vec<usize>), String> {
    let mut matches = Vec::new();
    let mut escapes = Vec::new();
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            if i + 1 < bytes.len() && bytes[i + 1] == b'$' {
                escapes.push(i);
                i += 2;
                continue;
            }
            if i + 1 < bytes.len() && bytes[i + 1] == b'{' {
                let close = s[i..]
                    .find('}')
                    .map(|p| p + i)
                    .ok_or_else(|| format!("unterminated `${{` at byte {}", i))?;
                let raw_path = &s[i + 2..close];
                matches.push(Match {
                    full: &s[i..=close],
                    start: i,
                    end: close + 1,
                    raw_path,
                });
                i = close + 1;
                continue;
            }
        }
        i += 1;
    }
    Ok((matches, escapes))
}

/// `true` when `s` is exactly one `${path}` reference with nothing else.
pub fn is_simple_template(s: &str) -> bool {
    let t = s.trim();
    t.starts_with("${") && t.ends_with('}') && t.len() == s.len() && {
        let inner = &s[2..s.len() - 1];
        !inner.is_empty() && !inner.contains("${")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_path() {
        let p = parse_path("a.b.c").unwrap();
        assert_eq!(
            p,
            vec![
                Segment::Key("a".into()),
                Segment::Key("b".into()),
                Segment::Key("c".into())
            ]
        );
    }

    #[test]
    fn parses_indices() {
        let p = parse_path("list[0][1]").unwrap();
        assert_eq!(
            p,
            vec![
                Segment::Key("list".into()),
                Segment::Index(0),
                Segment::Index(1)
            ]
        );
    }

    #[test]
    fn rejects_bad_ident() {
        assert!(parse_path("1abc").is_err());
        assert!(parse_path("a..b").is_err());
    }

    #[test]
    fn scan_finds_escape_and_template() {
        let (matches, escapes) = scan("prefix $${x} ${a.b} suffix").unwrap();
        assert_eq!(escapes.len(), 1);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].raw_path, "a.b");
    }

    #[test]
    fn simple_template_detection() {
        assert!(is_simple_template("${a.b}"));
        assert!(!is_simple_template("x${a.b}"));
        assert!(!is_simple_template("${a.b}y"));
    }
}
