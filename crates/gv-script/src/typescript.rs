//! TypeScript type erasure.
//!
//! Migration files are commonly written in TypeScript with light
//! annotations (`db: Handle`, `interface Row { .. }`, `query<Row>(..)`).
//! This pass blanks type-only syntax with spaces so the result is plain
//! JavaScript with every remaining token at its original line and column.
//! Runtime TypeScript features (`enum`, `namespace`, parameter properties)
//! are left alone and surface as syntax errors from the module check.

use crate::lexer::{blank_range, matching_close, tokenize, LexError, Token, TokenKind};
use std::collections::{HashMap, HashSet};
use std::ops::Range;

const CONTROL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "with", "return", "typeof", "await", "yield", "new",
    "throw", "delete", "void", "in", "of", "instanceof", "else", "do", "case",
];

const MEMBER_MODIFIERS: &[&str] = &[
    "public", "private", "protected", "readonly", "declare", "override", "abstract",
];

/// Erase TypeScript type syntax from `source`.
pub(crate) fn strip_types(source: &str) -> Result<String, LexError> {
    let tokens = tokenize(source)?;
    let mut stripper = Stripper {
        src: source,
        toks: &tokens,
        blanks: Vec::new(),
        generics: HashMap::new(),
    };
    stripper.run();

    let mut out = source.as_bytes().to_vec();
    for range in stripper.blanks {
        if range.start < range.end && range.end <= tokens.len() {
            let bytes = tokens[range.start].span.start..tokens[range.end - 1].span.end;
            blank_range(&mut out, bytes);
        }
    }
    Ok(String::from_utf8(out)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

struct Stripper<'a> {
    src: &'a str,
    toks: &'a [Token],
    /// Token index ranges to blank.
    blanks: Vec<Range<usize>>,
    /// Closing `>` of each erased type parameter list, mapped to its `<`.
    generics: HashMap<usize, usize>,
}

impl Stripper<'_> {
    fn text(&self, i: usize) -> &str {
        self.toks.get(i).map_or("", |t| t.text(self.src))
    }

    fn is(&self, i: usize, text: &str) -> bool {
        self.toks.get(i).is_some_and(|t| t.is(self.src, text))
    }

    fn kind(&self, i: usize) -> Option<TokenKind> {
        self.toks.get(i).map(|t| t.kind)
    }

    fn is_ident(&self, i: usize) -> bool {
        self.kind(i) == Some(TokenKind::Ident)
    }

    fn newline_before(&self, i: usize) -> bool {
        self.toks.get(i).is_some_and(|t| t.newline_before)
    }

    fn matching(&self, open: usize) -> Option<usize> {
        let close = match self.text(open) {
            "(" => ")",
            "[" => "]",
            "{" => "}",
            _ => return None,
        };
        matching_close(self.src, self.toks, open, self.text(open), close)
    }

    /// Matching `>` for the `<` at `open`, skipping bracketed groups.
    fn matching_angle(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut k = open;
        while k < self.toks.len() {
            match self.text(k) {
                "<" => depth += 1,
                ">" => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(k);
                    }
                }
                "(" | "[" | "{" => k = self.matching(k)?,
                ";" | ")" | "]" | "}" | "&&" | "||" | "==" | "===" | "!=" | "!==" | "+" | "-"
                | "*" | "/" | "%" | "!" | "++" | "--" | ">=" | "<=" => return None,
                _ => {}
            }
            k += 1;
        }
        None
    }

    fn is_statement_start(&self, i: usize) -> bool {
        i == 0
            || self.newline_before(i)
            || matches!(self.text(i - 1), ";" | "{" | "}")
    }

    fn is_expression_end(&self, i: usize) -> bool {
        match self.kind(i) {
            Some(TokenKind::Ident) => !CONTROL_KEYWORDS.contains(&self.text(i)),
            Some(TokenKind::Punct) => matches!(self.text(i), ")" | "]" | "}"),
            Some(_) => true,
            None => false,
        }
    }

    fn blank(&mut self, range: Range<usize>) {
        if range.start < range.end {
            self.blanks.push(range);
        }
    }

    /// Index just past the type expression starting at `i`, or `i` when no
    /// type starts there.
    fn scan_type(&self, i: usize) -> usize {
        let mut j = i;
        if self.is(j, "|") || self.is(j, "&") {
            j += 1;
        }
        loop {
            let after = self.scan_type_primary(j);
            if after == j {
                return if j == i { i } else { j };
            }
            j = after;
            if self.is(j, "|") || self.is(j, "&") || self.is(j, "is") {
                j += 1;
                continue;
            }
            if self.is(j, "extends") && self.is_ident(j - 1) {
                j += 1;
                continue;
            }
            return j;
        }
    }

    fn scan_type_primary(&self, i: usize) -> usize {
        let mut j = match (self.kind(i), self.text(i)) {
            (Some(TokenKind::Punct), "(") => match self.matching(i) {
                Some(close) if self.is(close + 1, "=>") => self.scan_type(close + 2),
                Some(close) => close + 1,
                None => return i,
            },
            (Some(TokenKind::Punct), "{" | "[") => match self.matching(i) {
                Some(close) => close + 1,
                None => return i,
            },
            (Some(TokenKind::Punct), "-") if self.kind(i + 1) == Some(TokenKind::Number) => i + 2,
            (Some(TokenKind::Str | TokenKind::Number | TokenKind::Template), _) => i + 1,
            (Some(TokenKind::Ident), "typeof" | "keyof" | "readonly" | "unique" | "infer") => {
                let inner = self.scan_type_primary(i + 1);
                if inner == i + 1 {
                    return i;
                }
                inner
            }
            (Some(TokenKind::Ident), "new") if self.is(i + 1, "(") => self.scan_type_primary(i + 1),
            (Some(TokenKind::Ident), _) => {
                let mut j = i + 1;
                while self.is(j, ".") && self.is_ident(j + 1) {
                    j += 2;
                }
                if self.is(j, "<") {
                    if let Some(close) = self.matching_angle(j) {
                        j = close + 1;
                    }
                }
                j
            }
            _ => return i,
        };
        while self.is(j, "[") && !self.newline_before(j) {
            match self.matching(j) {
                Some(close) => j = close + 1,
                None => break,
            }
        }
        j
    }

    fn run(&mut self) {
        let mut class_bodies: HashSet<usize> = HashSet::new();
        let mut brace_stack: Vec<bool> = Vec::new();
        let mut module_clause: Option<Range<usize>> = None;
        let mut i = 0;

        while i < self.toks.len() {
            let text = self.text(i).to_string();
            let kind = self.kind(i);

            if kind == Some(TokenKind::Punct) {
                match text.as_str() {
                    "{" => brace_stack.push(class_bodies.contains(&i)),
                    "}" => {
                        brace_stack.pop();
                    }
                    "(" => self.strip_parameters(i),
                    "<" => {
                        if let Some(end) = self.generic_arguments(i) {
                            self.generics.insert(end, i);
                            self.blank(i..end + 1);
                            i = end + 1;
                            continue;
                        }
                    }
                    "!" => {
                        if i > 0
                            && !self.newline_before(i)
                            && self.is_expression_end(i - 1)
                            && matches!(self.text(i + 1), "." | ")" | "," | ";" | "]" | "[" | "?.")
                        {
                            self.blank(i..i + 1);
                        }
                    }
                    _ => {}
                }
                i += 1;
                continue;
            }
            if kind != Some(TokenKind::Ident) {
                i += 1;
                continue;
            }

            let in_class_body = brace_stack.last().copied().unwrap_or(false);
            let statement_start = self.is_statement_start(i);

            if statement_start && !in_class_body {
                if let Some(end) = self.type_only_statement(i) {
                    self.blank(i..end);
                    i = end;
                    continue;
                }
                if text == "import" || text == "export" {
                    module_clause = self.module_clause(i);
                }
            }

            if in_class_body && statement_start {
                if let Some(next) = self.strip_member(i) {
                    i = next;
                    continue;
                }
            }

            match text.as_str() {
                "class" => {
                    if let Some(body) = self.class_header(i) {
                        class_bodies.insert(body);
                    }
                }
                "abstract" if self.is(i + 1, "class") => self.blank(i..i + 1),
                "const" | "let" | "var" => self.strip_declaration(i),
                "as" | "satisfies" => {
                    let in_clause = module_clause.as_ref().is_some_and(|r| r.contains(&i));
                    if !in_clause
                        && i > 0
                        && !self.newline_before(i)
                        && self.is_expression_end(i - 1)
                    {
                        let end = if self.is(i + 1, "const") {
                            i + 2
                        } else {
                            self.scan_type(i + 1)
                        };
                        if end > i + 1 {
                            self.blank(i..end);
                            i = end;
                            continue;
                        }
                    }
                }
                _ => {}
            }
            i += 1;
        }
    }

    /// `interface`, `type X =`, `declare ...`, `import type`, `export type {`.
    /// Returns the index just past the statement.
    fn type_only_statement(&self, i: usize) -> Option<usize> {
        let (start_kw, offset) = if self.is(i, "export") {
            (self.text(i + 1), 1)
        } else {
            (self.text(i), 0)
        };
        let k = i + offset;
        let end = match start_kw {
            "interface" if self.is_ident(k + 1) => {
                let mut j = k + 2;
                while j < self.toks.len() && !self.is(j, "{") {
                    j += 1;
                }
                self.matching(j)? + 1
            }
            "type" if self.is_ident(k + 1) && (self.is(k + 2, "=") || self.is(k + 2, "<")) => {
                let mut j = k + 2;
                if self.is(j, "<") {
                    j = self.matching_angle(j)? + 1;
                }
                if !self.is(j, "=") {
                    return None;
                }
                self.scan_type(j + 1)
            }
            "type" if self.is(k + 1, "{") => {
                let close = self.matching(k + 1)?;
                let mut j = close + 1;
                if self.is(j, "from") {
                    j += 2;
                }
                j
            }
            "declare" if self.is_ident(k + 1) => self.statement_end(k + 1),
            _ if offset == 0 && start_kw == "import" && self.is(k + 1, "type") => {
                let mut j = k + 2;
                while j < self.toks.len() && !self.is(j, "from") && !self.is(j, ";") {
                    j += 1;
                }
                if self.is(j, "from") {
                    j += 2;
                }
                j
            }
            _ => return None,
        };
        Some(if self.is(end, ";") { end + 1 } else { end })
    }

    /// End of a declaration starting at `i`: a `;`, a line break, or the end
    /// of a braced body, whichever comes first at nesting depth zero.
    fn statement_end(&self, i: usize) -> usize {
        let mut j = i;
        while j < self.toks.len() {
            if j > i && self.newline_before(j) {
                return j;
            }
            match self.text(j) {
                ";" => return j,
                "{" => {
                    if let Some(close) = self.matching(j) {
                        if self.toks[..j].last().is_some_and(|t| t.is(self.src, ")")) {
                            j = close + 1;
                            continue;
                        }
                        return close + 1;
                    }
                }
                "(" | "[" => {
                    if let Some(close) = self.matching(j) {
                        j = close + 1;
                        continue;
                    }
                }
                _ => {}
            }
            j += 1;
        }
        j
    }

    fn module_clause(&self, i: usize) -> Option<Range<usize>> {
        let limit = (i + 4).min(self.toks.len());
        (i + 1..limit)
            .take_while(|&j| !self.is(j, "from") && !self.is(j, ";"))
            .find(|&j| self.is(j, "{"))
            .and_then(|open| Some(open..self.matching(open)? + 1))
    }

    fn class_header(&mut self, i: usize) -> Option<usize> {
        let mut j = i + 1;
        let mut implements_at = None;
        while j < self.toks.len() && !self.is(j, "{") {
            if self.is(j, "implements") {
                implements_at = Some(j);
            }
            if self.is(j, "<") && self.is_ident(j - 1) {
                if let Some(close) = self.matching_angle(j) {
                    self.blank(j..close + 1);
                    j = close + 1;
                    continue;
                }
            }
            j += 1;
        }
        if j >= self.toks.len() {
            return None;
        }
        if let Some(start) = implements_at {
            self.blank(start..j);
        }
        Some(j)
    }

    /// Strip modifiers and field annotations at the start of a class member.
    fn strip_member(&mut self, i: usize) -> Option<usize> {
        let mut j = i;
        while MEMBER_MODIFIERS.contains(&self.text(j))
            && (self.is_ident(j + 1) || self.is(j + 1, "[") || self.is(j + 1, "#"))
        {
            self.blank(j..j + 1);
            j += 1;
        }
        if self.is(j, "static") {
            j += 1;
        }
        if !self.is_ident(j) {
            return (j > i).then_some(j);
        }
        let mut k = j + 1;
        if self.is(k, "?") || self.is(k, "!") {
            k += 1;
        }
        if self.is(k, ":") {
            let end = self.scan_type(k + 1);
            self.blank(j + 1..end);
            return Some(end);
        }
        (j > i).then_some(j)
    }

    fn strip_declaration(&mut self, i: usize) {
        let binding_end = match self.text(i + 1) {
            "{" | "[" => match self.matching(i + 1) {
                Some(close) => close + 1,
                None => return,
            },
            _ if self.is_ident(i + 1) => i + 2,
            _ => return,
        };
        let mut colon = binding_end;
        if self.is(colon, "!") {
            colon += 1;
        }
        if self.is(colon, ":") {
            let end = self.scan_type(colon + 1);
            self.blank(binding_end..end);
        }
    }

    /// Recognize `<...>` generic parameters or arguments at `i` and return the
    /// index of the closing `>`.
    fn generic_arguments(&self, i: usize) -> Option<usize> {
        if i == 0 || self.newline_before(i) {
            return None;
        }
        let prev_is_name = self.is_ident(i - 1) && !CONTROL_KEYWORDS.contains(&self.text(i - 1));
        let arrow_start = matches!(self.text(i - 1), "=" | "(" | "," | ":" | "?" | "=>");
        if !prev_is_name && !arrow_start {
            return None;
        }
        let close = self.matching_angle(i)?;
        if !self.is(close + 1, "(") {
            return None;
        }
        if arrow_start {
            let params_close = self.matching(close + 1)?;
            if !self.is(params_close + 1, "=>") && !self.is(params_close + 1, ":") {
                return None;
            }
        }
        Some(close)
    }

    /// Index of the token before `open`, looking through an erased type
    /// parameter list such as the `<T>` in `function id<T>(`.
    fn before_parameters(&self, open: usize) -> Option<usize> {
        let prev = open.checked_sub(1)?;
        match self.generics.get(&prev) {
            Some(&angle) => angle.checked_sub(1),
            None => Some(prev),
        }
    }

    fn is_parameter_list(&self, open: usize, close: usize) -> bool {
        let before = self.before_parameters(open);
        let prev = before.map_or("", |p| self.text(p));
        let prev_ident = before.is_some_and(|p| self.is_ident(p));
        let two_back = |text: &str| before.is_some_and(|p| p > 0 && self.is(p - 1, text));
        if prev == "catch" {
            return true;
        }
        let after_function = prev == "function"
            || (prev_ident && two_back("function"))
            || (prev == "*" && two_back("function"));
        if after_function || self.is(close + 1, "=>") {
            return true;
        }
        let method_like = prev_ident && !CONTROL_KEYWORDS.contains(&prev);
        if self.is(close + 1, "{") {
            return method_like;
        }
        if self.is(close + 1, ":") {
            let end = self.scan_type(close + 2);
            if end > close + 2 && (self.is(end, "{") || self.is(end, "=>")) {
                return method_like || matches!(prev, "=" | "(" | "," | "=>" | "");
            }
        }
        false
    }

    fn strip_parameters(&mut self, open: usize) {
        let Some(close) = self.matching(open) else {
            return;
        };
        if !self.is_parameter_list(open, close) {
            return;
        }

        let mut depth = 0usize;
        let mut pending_ternary = 0usize;
        let mut k = open + 1;
        while k < close {
            let text = self.text(k);
            match text {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                "?" if depth == 0 => {
                    let param_end = self.is_ident(k - 1) || self.is(k - 1, "}") || self.is(k - 1, "]");
                    if param_end && matches!(self.text(k + 1), ":" | "," | ")") {
                        self.blank(k..k + 1);
                    } else {
                        pending_ternary += 1;
                    }
                }
                ":" if depth == 0 && pending_ternary > 0 => pending_ternary -= 1,
                ":" if depth == 0 => {
                    let end = self.scan_type(k + 1).min(close);
                    self.blank(k..end);
                    k = end;
                    continue;
                }
                _ => {}
            }
            k += 1;
        }

        if self.is(close + 1, ":") {
            let end = self.scan_type(close + 2);
            if self.is(end, "{") || self.is(end, "=>") {
                self.blank(close + 1..end);
            }
        }
    }
}

#[cfg(test)]
#[path = "typescript_test.rs"]
mod tests;
