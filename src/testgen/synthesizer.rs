//! synthesizer.rs
//!
//! Turns a SourceAnalysis into a self-contained pytest module.

use std::collections::HashSet;
use std::path::Path;

use crate::state::SourceAnalysis;
use crate::testgen::heuristics::{ArithmeticOp, GENERIC_EDGE_CASE};

/// Generated pytest source plus the analysis it came from.
#[derive(Debug, Clone)]
pub struct GeneratedTestSuite<'a> {
    pub source: String,
    pub test_count: usize,
    pub module_name: String,
    pub analysis: &'a SourceAnalysis,
}

/// Loads the target by file location, found through `sys.path`. Stems that
/// are not valid module paths (`my.calc.py`) still import this way.
const LOADER: &str = r#"import importlib.util
import pathlib
import sys


def _load_module(file_name, module_name):
    for entry in sys.path:
        candidate = pathlib.Path(entry or ".") / file_name
        if candidate.is_file():
            spec = importlib.util.spec_from_file_location(module_name, candidate)
            module = importlib.util.module_from_spec(spec)
            sys.modules[module_name] = module
            spec.loader.exec_module(module)
            return module
    raise ImportError("cannot locate " + file_name)
"#;

pub fn synthesize(analysis: &SourceAnalysis) -> GeneratedTestSuite<'_> {
    let module_name = module_name(&analysis.path);

    let file_name = Path::new(&analysis.path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    let mut out = String::new();
    out.push_str(&format!("# Generated tests for {}\n", analysis.path));
    out.push_str(LOADER);
    out.push_str(&format!(
        "\n_module = _load_module({}, {})\n",
        py_str(file_name),
        py_str(&module_name)
    ));

    let mut used = HashSet::new();
    let mut test_count = 0;

    for f in analysis.functions.iter() {
        let op = ArithmeticOp::from_name(&f.name);

        let edge_cases: Vec<&str> = match analysis.note_for(&f.name) {
            Some(note) if !note.edge_cases.is_empty() => {
                note.edge_cases.iter().map(String::as_str).collect()
            }
            _ => vec![GENERIC_EDGE_CASE],
        };

        for edge in edge_cases {
            let name = unique_test_name(&f.name, edge, &mut used);
            let values = argument_values(edge, f.args.len());

            out.push_str("\n\n");
            out.push_str(&format!("def {}():\n", name));
            out.push_str(&format!("    {}\n", py_str(edge)));
            out.push_str(&format!(
                "    result = _module.{}({})\n",
                f.name,
                values.join(", ")
            ));

            match (op, values.as_slice()) {
                (Some(op), [a, b]) => {
                    out.push_str(&format!(
                        "    assert result == ({}) {} ({})\n",
                        a,
                        op.symbol(),
                        b
                    ));
                }
                _ => {
                    out.push_str("    del result\n");
                }
            }

            test_count += 1;
        }
    }

    GeneratedTestSuite {
        source: out,
        test_count,
        module_name,
        analysis,
    }
}

/// Identifier the loaded module is registered under: the file stem with
/// anything outside `[A-Za-z0-9_]` replaced.
pub fn module_name(path: &str) -> String {
    let stem = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module");

    let mut name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Representative Python literals for `arity` arguments, picked from the
/// wording of the edge case.
pub fn argument_values(edge: &str, arity: usize) -> Vec<String> {
    let e = edge.to_ascii_lowercase();

    (0..arity)
        .map(|i| {
            if e.contains("negative") {
                format!("-{}", i + 2)
            } else if e.contains("zero") {
                if i == 0 && arity > 1 { "1".into() } else { "0".into() }
            } else if e.contains("large") {
                format!("{}", 1_000_000_000_000_000_000u64 + i as u64)
            } else if e.contains("float") || e.contains("decimal") {
                format!("{}", 1.5 + 0.75 * i as f64)
            } else if e.contains("empty") {
                "\"\"".into()
            } else if e.contains("none") || e.contains("null") {
                "None".into()
            } else {
                format!("{}", i + 1)
            }
        })
        .collect()
}

fn unique_test_name(func: &str, edge: &str, used: &mut HashSet<String>) -> String {
    let base = format!("test_{}_{}", func, slug(edge));
    let mut name = base.clone();
    let mut n = 2;
    while !used.insert(name.clone()) {
        name = format!("{}_{}", base, n);
        n += 1;
    }
    name
}

fn slug(s: &str) -> String {
    let mut out = String::new();
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() {
        "case".into()
    } else {
        out
    }
}

/// Double-quoted Python string literal.
pub fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
