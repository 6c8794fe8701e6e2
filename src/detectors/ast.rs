//! detectors/ast.rs
//!
//! tree-sitter walk over Python sources: top-level functions, their
//! parameters and docstrings.

use std::cell::RefCell;

use tree_sitter::{Node, Parser, Tree};

use crate::state::{FunctionInfo, FunctionTable};

thread_local! {
    static PY_PARSER: RefCell<Option<Parser>> = RefCell::new(make_python_parser());
}

fn make_python_parser() -> Option<Parser> {
    let mut p = Parser::new();
    p.set_language(&tree_sitter_python::language()).ok()?;
    Some(p)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    pub line: usize,
    pub column: usize,
    pub kind: &'static str,
}

impl std::fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at line {}, column {}", self.kind, self.line, self.column)
    }
}

pub fn parse_source(source: &str) -> Option<Tree> {
    PY_PARSER.with(|p| p.borrow_mut().as_mut()?.parse(source, None))
}

/// Parse `source` and build its function table.
///
/// Fails on the first ERROR or MISSING node tree-sitter recovered from.
pub fn extract_functions(source: &str) -> Result<FunctionTable, SyntaxIssue> {
    let tree = parse_source(source).ok_or(SyntaxIssue {
        line: 0,
        column: 0,
        kind: "parser unavailable",
    })?;
    let root = tree.root_node();

    if root.has_error() {
        return Err(first_syntax_issue(root).unwrap_or(SyntaxIssue {
            line: 1,
            column: 1,
            kind: "syntax error",
        }));
    }

    let mut table = FunctionTable::new();
    let mut w = root.walk();
    for node in root.named_children(&mut w) {
        let def = match node.kind() {
            "function_definition" => node,
            "decorated_definition" => match node.child_by_field_name("definition") {
                Some(d) if d.kind() == "function_definition" => d,
                _ => continue,
            },
            _ => continue,
        };

        if is_async(def) {
            continue;
        }

        if let Some(info) = function_info(def, source) {
            table.insert(info);
        }
    }

    Ok(table)
}

fn first_syntax_issue(node: Node) -> Option<SyntaxIssue> {
    if node.is_error() || node.is_missing() {
        let pos = node.start_position();
        return Some(SyntaxIssue {
            line: pos.row + 1,
            column: pos.column + 1,
            kind: if node.is_missing() {
                "missing token"
            } else {
                "syntax error"
            },
        });
    }

    if !node.has_error() {
        return None;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(issue) = first_syntax_issue(child) {
            return Some(issue);
        }
    }
    None
}

fn is_async(def: Node) -> bool {
    def.child(0).map(|c| c.kind() == "async").unwrap_or(false)
}

fn function_info(def: Node, source: &str) -> Option<FunctionInfo> {
    let name = def
        .child_by_field_name("name")?
        .utf8_text(source.as_bytes())
        .ok()?
        .to_string();

    let args = def
        .child_by_field_name("parameters")
        .map(|p| parameter_names(p, source))
        .unwrap_or_default();

    let doc = def
        .child_by_field_name("body")
        .and_then(|b| docstring(b, source))
        .unwrap_or_default();

    Some(FunctionInfo { name, args, doc })
}

/// Named positional parameters. Everything from the first `*`, `*args`
/// or `**kwargs` on is keyword-only or variadic and is left out.
fn parameter_names(params: Node, source: &str) -> Vec<String> {
    let text = |n: Node| n.utf8_text(source.as_bytes()).ok().map(str::to_owned);

    let mut out = Vec::new();
    let mut w = params.walk();
    for p in params.named_children(&mut w) {
        if ends_positional(p) {
            break;
        }

        let name = match p.kind() {
            "identifier" => text(p),
            "default_parameter" | "typed_default_parameter" => {
                p.child_by_field_name("name").and_then(text)
            }
            // `x: int` has no name field
            "typed_parameter" => p
                .named_child(0)
                .filter(|c| c.kind() == "identifier")
                .and_then(text),
            _ => None,
        };

        if let Some(n) = name {
            out.push(n);
        }
    }
    out
}

fn ends_positional(p: Node) -> bool {
    let is_splat = |k: &str| {
        matches!(
            k,
            "keyword_separator" | "list_splat_pattern" | "dictionary_splat_pattern"
        )
    };

    match p.kind() {
        // `*args: int` and `**kw: str` wrap the splat pattern
        "typed_parameter" => p.named_child(0).is_some_and(|c| is_splat(c.kind())),
        k => is_splat(k),
    }
}

fn docstring(body: Node, source: &str) -> Option<String> {
    let mut w = body.walk();
    let first = body
        .named_children(&mut w)
        .find(|n| n.kind() != "comment")?;

    if first.kind() != "expression_statement" {
        return None;
    }

    let lit = first.named_child(0)?;
    if lit.kind() != "string" {
        return None;
    }

    let raw = lit.utf8_text(source.as_bytes()).ok()?;
    Some(clean_docstring(strip_string_quotes(raw)))
}

fn strip_string_quotes(raw: &str) -> &str {
    let body = raw.trim_start_matches(|c: char| matches!(c, 'r' | 'R' | 'u' | 'U' | 'b' | 'B' | 'f' | 'F'));

    for q in ["\"\"\"", "'''", "\"", "'"] {
        if body.len() >= 2 * q.len() && body.starts_with(q) && body.ends_with(q) {
            return &body[q.len()..body.len() - q.len()];
        }
    }
    body
}

/// Strip common indentation from every line after the first, then trim
/// leading and trailing blank lines.
pub fn clean_docstring(doc: &str) -> String {
    let lines: Vec<&str> = doc.lines().collect();
    if lines.is_empty() {
        return String::new();
    }

    let indent = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    cleaned.push(lines[0].trim().to_string());
    for l in lines.iter().skip(1) {
        let stripped = l.get(indent..).unwrap_or_else(|| l.trim_start());
        cleaned.push(stripped.trim_end().to_string());
    }

    while cleaned.first().map(|l| l.is_empty()).unwrap_or(false) {
        cleaned.remove(0);
    }
    while cleaned.last().map(|l| l.is_empty()).unwrap_or(false) {
        cleaned.pop();
    }

    cleaned.join("\n")
}
