//! Migration bundler.
//!
//! Resolves a migration file and its relative imports, erases TypeScript
//! types, checks every module with the interpreter's module parser, and
//! rewrites `import`/`export` statements into a small module registry. The
//! result is one classic script that assigns the entry module's exports to
//! the global `migration`.

use crate::error::{CompileError, Diagnostic};
use crate::lexer::{line_col, matching_close, tokenize, Token, TokenKind};
use crate::typescript::strip_types;
use boa_engine::{Context, Module, Source};
use regex::Regex;
use std::collections::{HashSet, VecDeque};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// Global the bundle assigns the entry module's exports to.
pub const EXPORT_GLOBAL: &str = "migration";

const RESOLVE_EXTENSIONS: &[&str] = &["ts", "js", "mjs", "mts"];

/// Compile the migration at `entry` into a self-contained bundle.
pub fn compile(entry: &Path) -> Result<String, CompileError> {
    let entry = match absolute(entry) {
        Ok(path) => path,
        Err(message) => return Err(CompileError::new(vec![diagnostic(entry, 0, 0, message)])),
    };
    let entry_dir = entry
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));

    let mut bundler = Bundler {
        entry_dir,
        modules: Vec::new(),
        seen: HashSet::new(),
        queue: VecDeque::new(),
        diagnostics: Vec::new(),
    };
    bundler.seen.insert(entry.clone());
    bundler.queue.push_back(entry.clone());
    while let Some(path) = bundler.queue.pop_front() {
        bundler.process(&path);
    }

    if !bundler.diagnostics.is_empty() {
        return Err(CompileError::new(bundler.diagnostics));
    }
    let entry_id = bundler.module_id(&entry);
    Ok(emit(&bundler.modules, &entry_id))
}

/// True for extensions handled by the TypeScript eraser.
pub fn is_typescript(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("ts" | "mts" | "cts")
    )
}

fn absolute(path: &Path) -> Result<PathBuf, String> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| format!("cannot determine working directory: {e}"))?
            .join(path)
    };
    Ok(normalize(&joined))
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn diagnostic(file: &Path, line: usize, column: usize, message: impl Into<String>) -> Diagnostic {
    Diagnostic {
        file: file.to_path_buf(),
        line,
        column,
        message: message.into(),
    }
}

static LOCATION_RE: OnceLock<Regex> = OnceLock::new();

/// Extract `line N, col M` from an interpreter syntax error message.
pub(crate) fn parse_location(message: &str) -> (usize, usize) {
    let re = LOCATION_RE.get_or_init(|| {
        Regex::new(r"line (\d+), col(?:umn)?:? (\d+)").expect("valid regex literal")
    });
    re.captures(message)
        .and_then(|caps| Some((caps[1].parse().ok()?, caps[2].parse().ok()?)))
        .unwrap_or((0, 0))
}

/// Parse `js` as an ES module and report the first syntax error.
fn check_syntax(path: &Path, js: &str) -> Option<Diagnostic> {
    let mut context = Context::default();
    match Module::parse(Source::from_bytes(js), None, &mut context) {
        Ok(_) => None,
        Err(err) => {
            let message = err.to_string();
            let (line, column) = parse_location(&message);
            Some(diagnostic(path, line, column, message))
        }
    }
}

struct Edit {
    range: Range<usize>,
    replacement: String,
}

struct Bundler {
    entry_dir: PathBuf,
    /// `(module id, rewritten body)` in discovery order
    modules: Vec<(String, String)>,
    seen: HashSet<PathBuf>,
    queue: VecDeque<PathBuf>,
    diagnostics: Vec<Diagnostic>,
}

impl Bundler {
    fn module_id(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.entry_dir).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn process(&mut self, path: &Path) {
        let Some(js) = self.load(path) else {
            return;
        };
        let tokens = match tokenize(&js) {
            Ok(tokens) => tokens,
            Err(err) => {
                let (line, column) = line_col(&js, err.offset);
                self.diagnostics
                    .push(diagnostic(path, line, column, err.message));
                return;
            }
        };
        let mut rewriter = Rewriter {
            src: &js,
            toks: &tokens,
            path,
            edits: Vec::new(),
            trailer: Vec::new(),
            diagnostics: Vec::new(),
            imports: Vec::new(),
        };
        rewriter.run();

        let Rewriter {
            edits,
            trailer,
            diagnostics,
            imports,
            ..
        } = rewriter;
        self.diagnostics.extend(diagnostics);

        let mut resolved = Vec::with_capacity(imports.len());
        for (specifier, offset) in &imports {
            match self.resolve(path, specifier) {
                Ok(target) => {
                    resolved.push(self.module_id(&target));
                    if self.seen.insert(target.clone()) {
                        self.queue.push_back(target);
                    }
                }
                Err(message) => {
                    let (line, column) = line_col(&js, *offset);
                    self.diagnostics
                        .push(diagnostic(path, line, column, message));
                    resolved.push(String::new());
                }
            }
        }

        let body = apply_edits(&js, edits, &resolved, &trailer);
        let id = self.module_id(path);
        self.modules.push((id, body));
    }

    fn load(&mut self, path: &Path) -> Option<String> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                self.diagnostics
                    .push(diagnostic(path, 0, 0, format!("cannot read file: {e}")));
                return None;
            }
        };
        let js = if is_typescript(path) {
            match strip_types(&raw) {
                Ok(js) => js,
                Err(err) => {
                    let (line, column) = line_col(&raw, err.offset);
                    self.diagnostics
                        .push(diagnostic(path, line, column, err.message));
                    return None;
                }
            }
        } else {
            raw
        };
        if let Some(d) = check_syntax(path, &js) {
            self.diagnostics.push(d);
            return None;
        }
        Some(js)
    }

    fn resolve(&self, from: &Path, specifier: &str) -> Result<PathBuf, String> {
        if !specifier.starts_with("./") && !specifier.starts_with("../") {
            return Err(format!(
                "only relative imports are supported, found '{specifier}'"
            ));
        }
        let base = normalize(&from.parent().unwrap_or(Path::new("/")).join(specifier));
        if base.is_file() {
            return Ok(base);
        }
        for ext in RESOLVE_EXTENSIONS {
            let mut candidate = base.clone().into_os_string();
            candidate.push(".");
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        for ext in RESOLVE_EXTENSIONS {
            let candidate = base.join(format!("index.{ext}"));
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(format!("cannot resolve import '{specifier}'"))
    }
}

/// Placeholder in replacements for the resolved id of import number N.
fn require_placeholder(index: usize) -> String {
    format!("\u{0}{index}\u{0}")
}

fn apply_edits(js: &str, mut edits: Vec<Edit>, resolved: &[String], trailer: &[String]) -> String {
    edits.sort_by_key(|e| e.range.start);
    let mut out = String::with_capacity(js.len() + 256);
    let mut cursor = 0;
    for edit in edits {
        if edit.range.start < cursor {
            continue;
        }
        out.push_str(&js[cursor..edit.range.start]);
        let mut replacement = edit.replacement;
        for (index, id) in resolved.iter().enumerate() {
            let quoted = serde_json::to_string(id).unwrap_or_else(|_| format!("\"{id}\""));
            replacement = replacement.replace(&require_placeholder(index), &quoted);
        }
        out.push_str(&replacement);
        let removed_newlines = js[edit.range.clone()].matches('\n').count();
        out.push_str(&"\n".repeat(removed_newlines));
        cursor = edit.range.end;
    }
    out.push_str(&js[cursor..]);
    if !trailer.is_empty() {
        out.push('\n');
        out.push_str(&trailer.join("\n"));
    }
    out
}

fn emit(modules: &[(String, String)], entry_id: &str) -> String {
    let quote = |s: &str| serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""));
    let mut out = String::new();
    out.push_str(&format!("var {EXPORT_GLOBAL} = (function () {{\n\"use strict\";\n"));
    out.push_str("var __modules = {};\n");
    for (id, body) in modules {
        out.push_str(&format!(
            "__modules[{}] = function (__exports, __require) {{\n{body}\n}};\n",
            quote(id)
        ));
    }
    out.push_str(concat!(
        "var __cache = {};\n",
        "function __require(id) {\n",
        "  if (Object.prototype.hasOwnProperty.call(__cache, id)) return __cache[id];\n",
        "  var exports = {};\n",
        "  __cache[id] = exports;\n",
        "  __modules[id](exports, __require);\n",
        "  return exports;\n",
        "}\n",
        "function __reexport(target, source) {\n",
        "  Object.keys(source).forEach(function (k) { if (k !== \"default\") target[k] = source[k]; });\n",
        "}\n",
    ));
    out.push_str(&format!("var __entry = __require({});\n", quote(entry_id)));
    out.push_str(concat!(
        "return (__entry.default !== null && typeof __entry.default === \"object\")",
        " ? __entry.default : __entry;\n",
        "})();\n",
    ));
    out
}

/// Token-level rewrite of one module's import and export statements.
struct Rewriter<'a> {
    src: &'a str,
    toks: &'a [Token],
    path: &'a Path,
    edits: Vec<Edit>,
    trailer: Vec<String>,
    diagnostics: Vec<Diagnostic>,
    /// `(specifier, byte offset)` in the order placeholders were issued
    imports: Vec<(String, usize)>,
}

impl Rewriter<'_> {
    fn text(&self, i: usize) -> &str {
        self.toks.get(i).map_or("", |t| t.text(self.src))
    }

    fn is(&self, i: usize, text: &str) -> bool {
        self.toks.get(i).is_some_and(|t| t.is(self.src, text))
    }

    fn is_ident(&self, i: usize) -> bool {
        self.toks.get(i).is_some_and(|t| t.kind == TokenKind::Ident)
    }

    fn is_str(&self, i: usize) -> bool {
        self.toks.get(i).is_some_and(|t| t.kind == TokenKind::Str)
    }

    fn span(&self, start: usize, end_exclusive: usize) -> Range<usize> {
        self.toks[start].span.start..self.toks[end_exclusive - 1].span.end
    }

    fn error_at(&mut self, i: usize, message: impl Into<String>) {
        let offset = self.toks.get(i).map_or(self.src.len(), |t| t.span.start);
        let (line, column) = line_col(self.src, offset);
        self.diagnostics
            .push(diagnostic(self.path, line, column, message));
    }

    /// Register an import of the string literal at `i` and return the
    /// `__require(...)` expression for it.
    fn require(&mut self, i: usize) -> String {
        let raw = self.text(i);
        let specifier = raw
            .get(1..raw.len().saturating_sub(1))
            .unwrap_or("")
            .to_string();
        let offset = self.toks[i].span.start;
        self.imports.push((specifier, offset));
        format!("__require({})", require_placeholder(self.imports.len() - 1))
    }

    fn with_semicolon(&self, end: usize) -> usize {
        if self.is(end, ";") {
            end + 1
        } else {
            end
        }
    }

    fn run(&mut self) {
        let mut i = 0;
        while i < self.toks.len() {
            let keyword = self.text(i);
            let statement = (keyword == "import" || keyword == "export")
                && self.toks[i].kind == TokenKind::Ident
                && !(i > 0 && (self.is(i - 1, ".") || self.is(i - 1, "?.")))
                && !self.is(i + 1, ":");
            if !statement {
                i += 1;
                continue;
            }
            let next = if keyword == "import" {
                self.rewrite_import(i)
            } else {
                self.rewrite_export(i)
            };
            i = next.max(i + 1);
        }
    }

    fn rewrite_import(&mut self, i: usize) -> usize {
        if self.is(i + 1, "(") || self.is(i + 1, ".") {
            self.error_at(i, "dynamic import() and import.meta are not supported");
            return i + 1;
        }

        let mut j = i + 1;
        let mut default_binding = None;
        let mut namespace = None;
        let mut named = None;

        if !self.is_str(j) {
            if self.is_ident(j) && !(self.is(j, "from") && self.is_str(j + 1)) {
                default_binding = Some(self.text(j).to_string());
                j += 1;
                if self.is(j, ",") {
                    j += 1;
                }
            }
            if self.is(j, "*") {
                if !self.is(j + 1, "as") || !self.is_ident(j + 2) {
                    self.error_at(j, "malformed namespace import");
                    return j + 1;
                }
                namespace = Some(self.text(j + 2).to_string());
                j += 3;
            } else if self.is(j, "{") {
                let Some(close) = matching_close(self.src, self.toks, j, "{", "}") else {
                    self.error_at(j, "unterminated import list");
                    return j + 1;
                };
                named = Some(self.specifiers(j + 1, close, ": "));
                j = close + 1;
            }
            if !self.is(j, "from") || !self.is_str(j + 1) {
                self.error_at(j, "expected 'from' followed by a module specifier");
                return j + 1;
            }
            j += 1;
        }

        let require = self.require(j);
        let mut parts = Vec::new();
        match (&default_binding, &namespace, &named) {
            (None, None, None) => parts.push(format!("{require};")),
            _ => {
                parts.push(format!("var __import{i} = {require};"));
                if let Some(name) = &default_binding {
                    parts.push(format!("const {name} = __import{i}.default;"));
                }
                if let Some(ns) = &namespace {
                    parts.push(format!("const {ns} = __import{i};"));
                }
                if let Some(list) = &named {
                    parts.push(format!("const {{ {list} }} = __import{i};"));
                }
            }
        }
        let end = self.with_semicolon(j + 1);
        self.edits.push(Edit {
            range: self.span(i, end),
            replacement: parts.join(" "),
        });
        end
    }

    /// Render `a, b as c` between `start` and `close` as `a, b<sep>c`.
    fn specifiers(&self, start: usize, close: usize, separator: &str) -> String {
        self.specifier_pairs(start, close)
            .into_iter()
            .map(|(name, alias)| {
                if name == alias {
                    name
                } else {
                    format!("{name}{separator}{alias}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `(imported or local name, alias)` pairs of a braced specifier list.
    fn specifier_pairs(&self, start: usize, close: usize) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut k = start;
        while k < close {
            if self.is(k, ",") {
                k += 1;
                continue;
            }
            let name = self.text(k).to_string();
            if self.is(k + 1, "as") && k + 2 < close {
                pairs.push((name, self.text(k + 2).to_string()));
                k += 3;
            } else {
                pairs.push((name.clone(), name));
                k += 1;
            }
        }
        pairs
    }

    fn rewrite_export(&mut self, i: usize) -> usize {
        match self.text(i + 1) {
            "default" => {
                self.edits.push(Edit {
                    range: self.span(i, i + 2),
                    replacement: "__exports.default =".to_string(),
                });
                i + 2
            }
            "function" | "class" | "async" => {
                let mut j = i + 2;
                if self.is(i + 1, "async") {
                    j += 1;
                }
                if self.is(j, "*") {
                    j += 1;
                }
                if !self.is_ident(j) {
                    self.error_at(j, "exported declaration must be named");
                    return j;
                }
                let name = self.text(j).to_string();
                self.trailer.push(format!("__exports.{name} = {name};"));
                self.edits.push(Edit {
                    range: self.span(i, i + 1),
                    replacement: String::new(),
                });
                j
            }
            "const" | "let" | "var" => {
                match self.declared_names(i + 2) {
                    Ok(names) => {
                        for name in names {
                            self.trailer.push(format!("__exports.{name} = {name};"));
                        }
                    }
                    Err(at) => {
                        self.error_at(at, "destructuring exports are not supported");
                    }
                }
                self.edits.push(Edit {
                    range: self.span(i, i + 1),
                    replacement: String::new(),
                });
                i + 2
            }
            "{" => {
                let Some(close) = matching_close(self.src, self.toks, i + 1, "{", "}") else {
                    self.error_at(i + 1, "unterminated export list");
                    return i + 2;
                };
                let pairs = self.specifier_pairs(i + 2, close);
                if self.is(close + 1, "from") && self.is_str(close + 2) {
                    let require = self.require(close + 2);
                    let assignments: Vec<String> = pairs
                        .iter()
                        .map(|(name, alias)| format!("__exports.{alias} = __m.{name};"))
                        .collect();
                    let end = self.with_semicolon(close + 3);
                    self.edits.push(Edit {
                        range: self.span(i, end),
                        replacement: format!(
                            "(function (__m) {{ {} }})({require});",
                            assignments.join(" ")
                        ),
                    });
                    end
                } else {
                    for (name, alias) in pairs {
                        self.trailer.push(format!("__exports.{alias} = {name};"));
                    }
                    let end = self.with_semicolon(close + 1);
                    self.edits.push(Edit {
                        range: self.span(i, end),
                        replacement: String::new(),
                    });
                    end
                }
            }
            "*" => {
                let (namespace, from_at) = if self.is(i + 2, "as") && self.is_ident(i + 3) {
                    (Some(self.text(i + 3).to_string()), i + 4)
                } else {
                    (None, i + 2)
                };
                if !self.is(from_at, "from") || !self.is_str(from_at + 1) {
                    self.error_at(from_at, "expected 'from' followed by a module specifier");
                    return from_at;
                }
                let require = self.require(from_at + 1);
                let replacement = match namespace {
                    Some(ns) => format!("__exports.{ns} = {require};"),
                    None => format!("__reexport(__exports, {require});"),
                };
                let end = self.with_semicolon(from_at + 2);
                self.edits.push(Edit {
                    range: self.span(i, end),
                    replacement,
                });
                end
            }
            other => {
                let message = format!("unsupported export form 'export {other}'");
                self.error_at(i + 1, message);
                i + 1
            }
        }
    }

    /// Names bound by a `const`/`let`/`var` declaration whose first
    /// declarator starts at `start`. Returns the offending token index for
    /// destructuring patterns.
    fn declared_names(&self, start: usize) -> Result<Vec<String>, usize> {
        let mut names = Vec::new();
        let mut k = start;
        'declarators: loop {
            if !self.is_ident(k) {
                return Err(k);
            }
            names.push(self.text(k).to_string());
            k += 1;
            let mut depth = 0usize;
            while k < self.toks.len() {
                let tok = &self.toks[k];
                let text = tok.text(self.src);
                if depth == 0 && tok.newline_before && !self.continues_expression(k) {
                    break 'declarators;
                }
                match text {
                    ";" if depth == 0 => break 'declarators,
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => {
                        if depth == 0 {
                            break 'declarators;
                        }
                        depth -= 1;
                    }
                    "," if depth == 0 => {
                        k += 1;
                        continue 'declarators;
                    }
                    _ => {}
                }
                k += 1;
            }
            break;
        }
        Ok(names)
    }

    /// Whether the token at `k`, which starts a new line, continues the
    /// expression on the previous line.
    fn continues_expression(&self, k: usize) -> bool {
        let prev = &self.toks[k - 1];
        if prev.kind == TokenKind::Punct && !matches!(prev.text(self.src), ")" | "]" | "}") {
            return true;
        }
        let tok = &self.toks[k];
        tok.kind == TokenKind::Punct && !matches!(tok.text(self.src), "{" | "}")
    }
}

#[cfg(test)]
#[path = "bundle_test.rs"]
mod tests;
