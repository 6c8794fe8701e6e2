//! classifier.rs
//!
//! Pass/fail decision, metrics, and bug-report escalation.

use tracing::info;

use crate::error::QaError;
use crate::persistence::{IssueEntry, MemoryStore};
use crate::state::{BugReport, ExecutionResult, Metrics, RunStatus, Severity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: RunStatus,
    pub report: Option<BugReport>,
}

pub struct OutcomeClassifier<'a> {
    store: &'a MemoryStore,
    metrics: &'a Metrics,
    tail_lines: usize,
}

impl<'a> OutcomeClassifier<'a> {
    pub fn new(store: &'a MemoryStore, metrics: &'a Metrics, tail_lines: usize) -> Self {
        Self {
            store,
            metrics,
            tail_lines,
        }
    }

    pub fn classify(
        &self,
        exec: &ExecutionResult,
        source_key: &str,
        run_id: Option<&str>,
    ) -> Result<Classification, QaError> {
        let status = if exec.passed {
            RunStatus::Passed
        } else {
            RunStatus::Failed
        };
        self.metrics.record_outcome(status);

        if status == RunStatus::Passed {
            return Ok(Classification {
                status,
                report: None,
            });
        }

        let report = build_report(exec, source_key, self.tail_lines);

        let mut entry = IssueEntry::new(report.clone());
        entry.returncode = Some(exec.returncode);
        entry.run_id = run_id.map(str::to_owned);
        self.store.record_issue(source_key, entry)?;

        info!(
            file = source_key,
            severity = ?report.severity,
            "created bug report and saved to memory bank"
        );

        Ok(Classification {
            status,
            report: Some(report),
        })
    }
}

pub fn build_report(exec: &ExecutionResult, source_key: &str, tail_lines: usize) -> BugReport {
    let severity = severity_of(exec);

    BugReport {
        title: format!("Auto-generated bug report for {}", source_key),
        description: tail(&exec.output, tail_lines),
        severity,
        suggested_fix: suggested_fix(exec, severity).to_string(),
    }
}

/// Last `n` lines of `output`, joined with `\n`.
pub fn tail(output: &str, n: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

fn severity_of(exec: &ExecutionResult) -> Severity {
    if exec.returncode == -1 {
        return Severity::High;
    }

    match exec.counts {
        Some(c) if c.errors > 0 => Severity::High,
        Some(c) if c.failed > 0 => Severity::Medium,
        _ => Severity::Low,
    }
}

fn suggested_fix(exec: &ExecutionResult, severity: Severity) -> &'static str {
    match severity {
        Severity::High if exec.returncode == -1 => {
            "Tests could not run to completion; check for hangs, slow imports, or a missing interpreter."
        }
        Severity::High => "Module failed to import under test; fix import-time errors first.",
        Severity::Medium => "Investigate failing assertion in generated tests.",
        Severity::Low => "Inspect the script output for the non-zero exit status.",
    }
}
