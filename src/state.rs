use std::sync::atomic::{AtomicU64, Ordering};

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/* ---------- analysis ---------- */

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    pub args: Vec<String>,
    pub doc: String,
}

/// Function table in file order with unique names.
///
/// Serializes as a JSON object `name -> {args, doc}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionTable(Vec<FunctionInfo>);

impl FunctionTable {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// A redefinition keeps the first position and takes the latest signature.
    pub fn insert(&mut self, info: FunctionInfo) {
        match self.0.iter_mut().find(|f| f.name == info.name) {
            Some(slot) => *slot = info,
            None => self.0.push(info),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FunctionInfo> {
        self.0.iter().find(|f| f.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionInfo> {
        self.0.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Serialize)]
struct SignatureView<'a> {
    args: &'a [String],
    doc: &'a str,
}

impl Serialize for FunctionTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for f in &self.0 {
            map.serialize_entry(
                &f.name,
                &SignatureView {
                    args: &f.args,
                    doc: &f.doc,
                },
            )?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionNote {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub edge_cases: Vec<String>,
}

/// Where the summary and function notes came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotesOrigin {
    Provider { name: String },
    Offline { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceAnalysis {
    pub path: String,
    pub functions: FunctionTable,
    pub summary: String,
    pub function_notes: Vec<FunctionNote>,
    pub origin: NotesOrigin,
}

impl SourceAnalysis {
    pub fn note_for(&self, name: &str) -> Option<&FunctionNote> {
        self.function_notes.iter().find(|n| n.name == name)
    }
}

/* ---------- execution ---------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Runner {
    Pytest,
    Script,
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCounts {
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub passed: bool,
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
    pub output: String,
    pub runner: Runner,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<TestCounts>,
}

impl ExecutionResult {
    pub fn from_streams(runner: Runner, returncode: i32, stdout: String, stderr: String) -> Self {
        let output = combine_output(&stdout, &stderr);
        let counts = match runner {
            Runner::Pytest => crate::executor::process::parse_pytest_counts(&output),
            _ => None,
        };

        Self {
            passed: returncode == 0,
            returncode,
            stdout,
            stderr,
            output,
            runner,
            counts,
        }
    }

    /// Normalized failure for anything that kept the tests from running.
    pub fn execution_error(detail: impl std::fmt::Display) -> Self {
        Self {
            passed: false,
            returncode: -1,
            stdout: String::new(),
            stderr: String::new(),
            output: format!("Execution error: {detail}"),
            runner: Runner::None,
            counts: None,
        }
    }
}

pub fn combine_output(stdout: &str, stderr: &str) -> String {
    let mut out = String::from(stdout);
    if !stderr.is_empty() {
        out.push('\n');
        out.push_str(stderr);
    }
    out
}

/* ---------- reporting ---------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugReport {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub suggested_fix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Passed,
    Failed,
}

/* ---------- lifecycle ---------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Analyzed,
    Synthesized,
    Executed,
    Classified,
    Reported,
    Done,
    Error,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Reported | Stage::Done | Stage::Error)
    }
}

/* ---------- result ---------- */

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub exec: ExecutionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<BugReport>,
    pub tests_generated: usize,
    pub analysis: SourceAnalysis,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PipelineResult {
    Completed(Box<RunReport>),
    Error { error: String },
}

impl PipelineResult {
    pub fn status(&self) -> Option<RunStatus> {
        match self {
            PipelineResult::Completed(run) => Some(run.status),
            PipelineResult::Error { .. } => None,
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status() == Some(RunStatus::Passed)
    }
}

/* ---------- metrics ---------- */

/// Run counters. Owned by whoever builds the pipeline; nothing global.
#[derive(Debug, Default)]
pub struct Metrics {
    tests_generated: AtomicU64,
    tests_run: AtomicU64,
    tests_passed: AtomicU64,
    tests_failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub tests_generated: u64,
    pub tests_run: u64,
    pub tests_passed: u64,
    pub tests_failed: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_generated(&self) {
        self.tests_generated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, status: RunStatus) {
        self.tests_run.fetch_add(1, Ordering::Relaxed);
        match status {
            RunStatus::Passed => self.tests_passed.fetch_add(1, Ordering::Relaxed),
            RunStatus::Failed => self.tests_failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tests_generated: self.tests_generated.load(Ordering::Relaxed),
            tests_run: self.tests_run.load(Ordering::Relaxed),
            tests_passed: self.tests_passed.load(Ordering::Relaxed),
            tests_failed: self.tests_failed.load(Ordering::Relaxed),
        }
    }
}
