//! heuristics.rs
//!
//! Offline stand-in for the reasoning provider.
//!
//! Everything here is a pure function of a function's name and argument
//! list, so two runs over the same file always produce the same notes.

use crate::state::{FunctionNote, FunctionTable};

pub const GENERIC_EDGE_CASE: &str = "typical inputs";
const NO_ARGS_EDGE_CASE: &str = "calling with no arguments";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithmeticOp {
    /// Recognize arithmetic-style names by any `_`-separated token.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        lower.split('_').find_map(|tok| match tok {
            "add" | "sum" | "plus" => Some(ArithmeticOp::Add),
            "sub" | "subtract" | "minus" => Some(ArithmeticOp::Sub),
            "mul" | "multiply" | "times" | "product" => Some(ArithmeticOp::Mul),
            "div" | "divide" | "quotient" => Some(ArithmeticOp::Div),
            _ => None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
        }
    }

    fn description(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "Returns the sum of its arguments.",
            ArithmeticOp::Sub => "Returns the difference of its arguments.",
            ArithmeticOp::Mul => "Returns the product of its arguments.",
            ArithmeticOp::Div => "Returns the quotient of its arguments.",
        }
    }

    fn edge_cases(self) -> [&'static str; 3] {
        match self {
            ArithmeticOp::Add => [
                "adding negative numbers",
                "adding zero",
                "adding large integers",
            ],
            ArithmeticOp::Sub => [
                "subtracting negative numbers",
                "subtracting zero",
                "subtracting large integers",
            ],
            ArithmeticOp::Mul => [
                "multiplying negative numbers",
                "multiplying by zero",
                "multiplying large integers",
            ],
            ArithmeticOp::Div => [
                "dividing negative numbers",
                "division by zero",
                "dividing large integers",
            ],
        }
    }
}

pub fn offline_note(name: &str, args: &[String]) -> FunctionNote {
    let (desc, edge_cases) = match ArithmeticOp::from_name(name) {
        Some(op) => (
            op.description().to_string(),
            op.edge_cases().iter().map(|s| s.to_string()).collect(),
        ),
        None if args.is_empty() => (
            format!("Function `{}` taking no arguments.", name),
            vec![NO_ARGS_EDGE_CASE.to_string()],
        ),
        None => (
            format!("Function `{}` taking ({}).", name, args.join(", ")),
            vec![GENERIC_EDGE_CASE.to_string()],
        ),
    };

    FunctionNote {
        name: name.to_string(),
        desc,
        edge_cases,
    }
}

pub fn offline_notes(functions: &FunctionTable) -> Vec<FunctionNote> {
    functions
        .iter()
        .map(|f| offline_note(&f.name, &f.args))
        .collect()
}

pub fn offline_summary(file: &str, functions: &FunctionTable) -> String {
    let n = functions.len();
    if n == 0 {
        format!("Offline analysis of {}: 0 function(s)", file)
    } else {
        format!(
            "Offline analysis of {}: {} function(s): {}",
            file,
            n,
            functions.names().join(", ")
        )
    }
}
