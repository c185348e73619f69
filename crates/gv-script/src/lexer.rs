//! Minimal JavaScript/TypeScript token scanner.
//!
//! Only as much of the grammar as the type stripper and the bundler need:
//! identifiers, punctuators, and opaque string/template/regex/number tokens,
//! each with its byte span. Comments and whitespace are skipped but stay in
//! the original text, so rewrites can splice by span and keep positions.

use std::ops::Range;

/// Token category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident,
    Punct,
    Str,
    Template,
    Regex,
    Number,
}

/// One token with its span in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
    /// A line break separates this token from the previous one.
    pub newline_before: bool,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.clone()]
    }

    pub fn is(&self, source: &str, text: &str) -> bool {
        matches!(self.kind, TokenKind::Ident | TokenKind::Punct) && self.text(source) == text
    }
}

/// Scanning failure at a byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LexError {
    pub offset: usize,
    pub message: String,
}

const MULTI_PUNCT: &[&str] = &[
    "...", "===", "!==", "**=", "&&=", "||=", "??=", "=>", "?.", "==", "!=", "<=", ">=", "&&",
    "||", "??", "++", "--", "**", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=",
];

const REGEX_AFTER_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

/// Convert a byte offset into a 1-based `(line, column)` pair.
pub(crate) fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

/// Tokenize `source`.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let bytes = source.as_bytes();
    let mut tokens: Vec<Token> = Vec::new();
    let mut pos = 0;
    let mut newline_before = false;

    while pos < bytes.len() {
        let c = bytes[pos];
        if c == b'\n' {
            newline_before = true;
            pos += 1;
            continue;
        }
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        if source[pos..].starts_with("//") {
            pos = source[pos..].find('\n').map_or(bytes.len(), |i| pos + i);
            continue;
        }
        if source[pos..].starts_with("/*") {
            let end = source[pos + 2..].find("*/").ok_or_else(|| LexError {
                offset: pos,
                message: "unterminated block comment".to_string(),
            })?;
            if source[pos..pos + 2 + end].contains('\n') {
                newline_before = true;
            }
            pos += 2 + end + 2;
            continue;
        }

        let start = pos;
        let kind = if c == b'"' || c == b'\'' {
            pos = skip_string(source, pos)?;
            TokenKind::Str
        } else if c == b'`' {
            pos = skip_template(source, pos)?;
            TokenKind::Template
        } else if c.is_ascii_digit()
            || (c == b'.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit))
        {
            pos += 1;
            while pos < bytes.len() {
                let d = bytes[pos];
                if d.is_ascii_alphanumeric() || d == b'_' || d == b'.' {
                    pos += 1;
                } else if (d == b'+' || d == b'-') && matches!(bytes[pos - 1], b'e' | b'E') {
                    pos += 1;
                } else {
                    break;
                }
            }
            TokenKind::Number
        } else if is_ident_start(source, pos) {
            pos += char_len(source, pos);
            while pos < bytes.len() && is_ident_part(source, pos) {
                pos += char_len(source, pos);
            }
            TokenKind::Ident
        } else if c == b'/' && regex_allowed(source, tokens.last()) {
            pos = skip_regex(source, pos)?;
            TokenKind::Regex
        } else {
            let len = MULTI_PUNCT
                .iter()
                .find(|p| source[pos..].starts_with(**p))
                .map_or_else(|| char_len(source, pos), |p| p.len());
            pos += len;
            TokenKind::Punct
        };

        tokens.push(Token {
            kind,
            span: start..pos,
            newline_before,
        });
        newline_before = false;
    }
    Ok(tokens)
}

fn char_len(source: &str, pos: usize) -> usize {
    source[pos..].chars().next().map_or(1, char::len_utf8)
}

fn is_ident_start(source: &str, pos: usize) -> bool {
    source[pos..]
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$' || c == '#')
}

fn is_ident_part(source: &str, pos: usize) -> bool {
    source[pos..]
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn regex_allowed(source: &str, prev: Option<&Token>) -> bool {
    match prev {
        None => true,
        Some(tok) => match tok.kind {
            TokenKind::Ident => REGEX_AFTER_KEYWORDS.contains(&tok.text(source)),
            TokenKind::Punct => !matches!(tok.text(source), ")" | "]" | "}" | "++" | "--"),
            _ => false,
        },
    }
}

fn skip_string(source: &str, start: usize) -> Result<usize, LexError> {
    let bytes = source.as_bytes();
    let quote = bytes[start];
    let mut pos = start + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'\n' => break,
            c if c == quote => return Ok(pos + 1),
            _ => pos += 1,
        }
    }
    Err(LexError {
        offset: start,
        message: "unterminated string literal".to_string(),
    })
}

fn skip_regex(source: &str, start: usize) -> Result<usize, LexError> {
    let bytes = source.as_bytes();
    let mut pos = start + 1;
    let mut in_class = false;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'\n' => break,
            b'[' => {
                in_class = true;
                pos += 1;
            }
            b']' => {
                in_class = false;
                pos += 1;
            }
            b'/' if !in_class => {
                pos += 1;
                while pos < bytes.len() && is_ident_part(source, pos) {
                    pos += 1;
                }
                return Ok(pos);
            }
            _ => pos += 1,
        }
    }
    Err(LexError {
        offset: start,
        message: "unterminated regular expression".to_string(),
    })
}

/// Skip a template literal starting at the opening backtick, including any
/// nested `${ ... }` substitutions.
fn skip_template(source: &str, start: usize) -> Result<usize, LexError> {
    let bytes = source.as_bytes();
    let mut pos = start + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'`' => return Ok(pos + 1),
            b'$' if bytes.get(pos + 1) == Some(&b'{') => {
                pos = skip_substitution(source, pos + 2)?;
            }
            _ => pos += 1,
        }
    }
    Err(LexError {
        offset: start,
        message: "unterminated template literal".to_string(),
    })
}

/// Skip code inside `${ ... }` up to and including the closing brace.
fn skip_substitution(source: &str, start: usize) -> Result<usize, LexError> {
    let bytes = source.as_bytes();
    let mut pos = start;
    let mut depth = 0usize;
    while pos < bytes.len() {
        match bytes[pos] {
            b'"' | b'\'' => pos = skip_string(source, pos)?,
            b'`' => pos = skip_template(source, pos)?,
            b'{' => {
                depth += 1;
                pos += 1;
            }
            b'}' if depth == 0 => return Ok(pos + 1),
            b'}' => {
                depth -= 1;
                pos += 1;
            }
            _ => pos += 1,
        }
    }
    Err(LexError {
        offset: start,
        message: "unterminated template substitution".to_string(),
    })
}

/// Index of the token closing the bracket opened at `open`, honouring
/// nesting of the same bracket pair.
pub(crate) fn matching_close(
    source: &str,
    tokens: &[Token],
    open: usize,
    open_text: &str,
    close_text: &str,
) -> Option<usize> {
    let mut depth = 0usize;
    for (i, tok) in tokens.iter().enumerate().skip(open) {
        if tok.is(source, open_text) {
            depth += 1;
        } else if tok.is(source, close_text) {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Replace every non-newline character in `range` with a space so that
/// line and column positions after the range are unchanged.
pub(crate) fn blank_range(out: &mut [u8], range: Range<usize>) {
    for b in &mut out[range] {
        if *b != b'\n' && *b != b'\r' {
            *b = b' ';
        }
    }
}

#[cfg(test)]
#[path = "lexer_test.rs"]
mod tests;
