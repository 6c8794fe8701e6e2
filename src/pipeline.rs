//! pipeline.rs
//!
//! Drives one file through analyze → synthesize → execute → classify.
//!
//! A `Pipeline` holds no per-run state, so one value can serve many runs
//! (and many threads). Metrics accumulate across every run it performs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info_span, warn};
use uuid::Uuid;

use crate::classifier::OutcomeClassifier;
use crate::config::{Config, PipelineConfig};
use crate::error::QaError;
use crate::executor::{PythonSandbox, Sandbox};
use crate::llm::{LlmClient, OfflineProvider, ReasoningProvider};
use crate::persistence::MemoryStore;
use crate::state::{Metrics, PipelineResult, RunReport, SourceAnalysis, Stage};
use crate::testgen::{synthesize, SourceAnalyzer};

pub struct Pipeline {
    config: PipelineConfig,
    provider: Box<dyn ReasoningProvider>,
    sandbox: Box<dyn Sandbox>,
    store: MemoryStore,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    /// Offline provider, local python sandbox, memory bank from `config`.
    pub fn new(config: PipelineConfig) -> Self {
        let sandbox = PythonSandbox::new(config.python.clone());
        let store = MemoryStore::new(config.memory_path.clone());

        Self {
            config,
            provider: Box::new(OfflineProvider),
            sandbox: Box::new(sandbox),
            store,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Full wiring from a loaded config. An unconfigured LLM section (or
    /// `offline`) means heuristics only.
    pub fn from_config(cfg: &Config, offline: bool) -> Self {
        let pipeline = Self::new(cfg.pipeline.clone());
        let client = LlmClient::new(cfg.llm.clone());

        if offline {
            return pipeline;
        }
        if client.wants_default_credentials() {
            warn!("vertex project set without GEMINI_API_KEY; application-default credentials are not supported, running offline");
            return pipeline;
        }
        if !client.is_configured() {
            debug!("no reasoning provider configured, running offline");
            return pipeline;
        }
        pipeline.with_provider(Box::new(client))
    }

    pub fn with_provider(mut self, provider: Box<dyn ReasoningProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_sandbox(mut self, sandbox: Box<dyn Sandbox>) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Analysis only; no tests are written or run and no metrics move.
    pub fn analyze_only(&self, path: &Path) -> Result<SourceAnalysis, QaError> {
        SourceAnalyzer::new(self.provider.as_ref()).analyze(path)
    }

    pub fn run(&self, path: &Path) -> Result<PipelineResult, QaError> {
        let run_id = Uuid::new_v4().to_string();
        let _span = info_span!("run", id = %run_id, file = %path.display()).entered();

        let mut stage = Stage::Start;
        debug!(?stage);

        let analysis = match self.analyze_only(path) {
            Ok(a) => a,
            Err(e) if e.is_analysis_failure() => {
                stage = Stage::Error;
                warn!(?stage, error = %e, "analysis failed");
                return Ok(PipelineResult::Error {
                    error: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };
        stage = Stage::Analyzed;
        debug!(?stage, functions = analysis.functions.len());

        let suite = synthesize(&analysis);
        let tests_generated = suite.test_count;
        self.metrics.record_generated();
        stage = Stage::Synthesized;
        debug!(?stage, tests = tests_generated, module = %suite.module_name);

        let exec = self
            .sandbox
            .execute(&suite.source, path, self.config.timeout());
        stage = Stage::Executed;
        debug!(?stage, returncode = exec.returncode, runner = ?exec.runner);

        let classification = OutcomeClassifier::new(
            &self.store,
            &self.metrics,
            self.config.report_tail_lines,
        )
        .classify(&exec, &analysis.path, Some(&run_id))?;
        stage = Stage::Classified;
        debug!(?stage, status = ?classification.status);

        stage = if classification.report.is_some() {
            Stage::Reported
        } else {
            Stage::Done
        };
        debug!(?stage, terminal = stage.is_terminal());

        Ok(PipelineResult::Completed(Box::new(RunReport {
            status: classification.status,
            exec,
            report: classification.report,
            tests_generated,
            analysis,
        })))
    }

    /// Sequential runs through this pipeline. Stops at the first
    /// persistence error.
    pub fn run_batch<P: AsRef<Path>>(
        &self,
        paths: &[P],
    ) -> Result<Vec<(PathBuf, PipelineResult)>, QaError> {
        paths
            .iter()
            .map(|p| {
                let p = p.as_ref();
                self.run(p).map(|r| (p.to_path_buf(), r))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::state::{ExecutionResult, MetricsSnapshot, RunStatus, Runner, Severity, TestCounts};

    /// Canned result; remembers what it was asked to run.
    struct FakeSandbox {
        result: ExecutionResult,
        seen: Mutex<Vec<String>>,
    }

    impl FakeSandbox {
        fn new(result: ExecutionResult) -> Self {
            Self {
                result,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Sandbox for FakeSandbox {
        fn execute(&self, test_source: &str, _original: &Path, _timeout: Duration) -> ExecutionResult {
            self.seen.lock().unwrap().push(test_source.to_string());
            self.result.clone()
        }
    }

    impl Sandbox for Arc<FakeSandbox> {
        fn execute(&self, test_source: &str, original: &Path, timeout: Duration) -> ExecutionResult {
            self.as_ref().execute(test_source, original, timeout)
        }
    }

    fn pipeline_in(dir: &Path, result: ExecutionResult) -> (Pipeline, Arc<FakeSandbox>) {
        let fake = Arc::new(FakeSandbox::new(result));
        let cfg = PipelineConfig {
            memory_path: dir.join("memory_bank.json"),
            ..PipelineConfig::default()
        };
        let p = Pipeline::new(cfg).with_sandbox(Box::new(fake.clone()));
        (p, fake)
    }

    fn pytest_result(rc: i32, stdout: &str) -> ExecutionResult {
        ExecutionResult::from_streams(Runner::Pytest, rc, stdout.into(), String::new())
    }

    #[test]
    fn missing_file_is_error_result_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let (p, fake) = pipeline_in(dir.path(), pytest_result(0, ""));

        let r = p.run(&dir.path().join("does_not_exist.py")).unwrap();

        match r {
            PipelineResult::Error { error } => assert!(error.contains("not found")),
            other => panic!("expected error result, got {other:?}"),
        }
        assert_eq!(p.metrics().snapshot(), MetricsSnapshot::default());
        assert!(fake.seen.lock().unwrap().is_empty());
        assert!(!dir.path().join("memory_bank.json").exists());
    }

    #[test]
    fn passing_run_reports_no_bug() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("calc.py");
        fs::write(&src, "def add(a, b):\n    return a + b\n").unwrap();
        let (p, fake) = pipeline_in(dir.path(), pytest_result(0, "3 passed in 0.01s"));

        let r = p.run(&src).unwrap();
        let PipelineResult::Completed(run) = r else {
            panic!("expected completed run");
        };

        assert_eq!(run.status, RunStatus::Passed);
        assert!(run.report.is_none());
        assert_eq!(run.tests_generated, 3);
        assert!(fake.seen.lock().unwrap()[0].contains("_module.add("));

        let m = p.metrics().snapshot();
        assert_eq!((m.tests_generated, m.tests_run, m.tests_passed), (1, 1, 1));
        assert!(!dir.path().join("memory_bank.json").exists());
    }

    #[test]
    fn failing_run_files_a_bug_report() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("calc.py");
        fs::write(&src, "def divide(a, b):\n    return a / b\n").unwrap();
        let failing = pytest_result(
            1,
            "..F\nE       ZeroDivisionError: division by zero\n1 failed, 2 passed in 0.02s",
        );
        assert_eq!(
            failing.counts,
            Some(TestCounts {
                passed: 2,
                failed: 1,
                errors: 0
            })
        );
        let (p, _fake) = pipeline_in(dir.path(), failing);

        let PipelineResult::Completed(run) = p.run(&src).unwrap() else {
            panic!("expected completed run");
        };
        let report = run.report.expect("failing run has a report");

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(report.severity, Severity::Medium);
        assert!(report.description.contains("ZeroDivisionError"));

        let key = run.analysis.path.clone();
        let issues = p.store().issues_for(&key).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].returncode, Some(1));
        assert!(issues[0].run_id.is_some());
        assert_eq!(p.metrics().snapshot().tests_failed, 1);
    }

    #[test]
    fn unusable_memory_bank_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("calc.py");
        fs::write(&src, "def f():\n    pass\n").unwrap();
        fs::write(dir.path().join("memory_bank.json"), "[[[").unwrap();
        let (p, _fake) = pipeline_in(dir.path(), pytest_result(1, "1 failed in 0.01s"));

        assert!(matches!(p.run(&src), Err(QaError::Persistence { .. })));
    }

    #[test]
    fn batch_runs_each_file_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let b = dir.path().join("b.py");
        fs::write(&a, "def add(x, y):\n    return x + y\n").unwrap();
        fs::write(&b, "x = (\n").unwrap();
        let (p, _fake) = pipeline_in(dir.path(), pytest_result(0, "1 passed"));

        let results = p.run_batch(&[&a, &b]).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, a);
        assert!(results[0].1.is_passed());
        assert!(matches!(results[1].1, PipelineResult::Error { .. }));
        assert_eq!(p.metrics().snapshot().tests_run, 1);
    }
}
