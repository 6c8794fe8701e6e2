use std::env;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, warn};

use crate::executor::process::{no_tests_collected, run_bounded, ExecFailure};
use crate::state::{ExecutionResult, Runner};

/// Executes generated test source against an original file.
///
/// Implementations never fail outward: every problem becomes a failing
/// `ExecutionResult` with `returncode == -1`.
pub trait Sandbox: Send + Sync {
    fn execute(&self, test_source: &str, original: &Path, timeout: Duration) -> ExecutionResult;
}

/// pytest in a child interpreter, one temp directory per run.
#[derive(Debug, Clone)]
pub struct PythonSandbox {
    python: String,
}

impl PythonSandbox {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    pub fn python(&self) -> &str {
        &self.python
    }

    /// Everything between creating and removing the temp directory.
    pub fn run_isolated(
        &self,
        test_source: &str,
        original: &Path,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecFailure> {
        let original = original.canonicalize()?;
        let import_dir = original
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let workdir = tempfile::Builder::new().prefix("codeqa_").tempdir()?;
        let test_path = write_test_file(workdir.path(), &original, test_source)?;
        let pythonpath = prepend_pythonpath(&import_dir, env::var_os("PYTHONPATH"))?;

        debug!(test = %test_path.display(), import_dir = %import_dir.display(), "running pytest");

        let raw = run_bounded(
            self.command(workdir.path(), &pythonpath)
                .args(["-m", "pytest", "-q", "-p", "no:cacheprovider"])
                .arg(&test_path),
            timeout,
        )?;
        let result = ExecutionResult::from_streams(Runner::Pytest, raw.returncode, raw.stdout, raw.stderr);

        if no_tests_collected(result.returncode, &result.output) && original.is_file() {
            debug!(file = %original.display(), "pytest collected no tests, running file as a script");

            let raw = run_bounded(
                self.command(workdir.path(), &pythonpath).arg(&original),
                timeout,
            )?;
            return Ok(ExecutionResult::from_streams(
                Runner::Script,
                raw.returncode,
                raw.stdout,
                raw.stderr,
            ));
        }

        Ok(result)
    }

    fn command(&self, workdir: &Path, pythonpath: &OsString) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.current_dir(workdir)
            .env("PYTHONPATH", pythonpath)
            .env("PYTHONDONTWRITEBYTECODE", "1");
        cmd
    }
}

impl Default for PythonSandbox {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl Sandbox for PythonSandbox {
    fn execute(&self, test_source: &str, original: &Path, timeout: Duration) -> ExecutionResult {
        match self.run_isolated(test_source, original, timeout) {
            Ok(result) => result,
            Err(e) => {
                warn!(file = %original.display(), error = %e, "sandbox execution failed");
                ExecutionResult::execution_error(e)
            }
        }
    }
}

/// Name must match pytest's `test_*.py` discovery pattern.
pub fn test_file_name(original: &Path) -> String {
    let stem: String = original
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    format!("test_{stem}_generated.py")
}

fn write_test_file(dir: &Path, original: &Path, test_source: &str) -> io::Result<PathBuf> {
    let path = dir.join(test_file_name(original));
    fs::write(&path, test_source)?;
    Ok(path)
}

fn prepend_pythonpath(dir: &Path, existing: Option<OsString>) -> io::Result<OsString> {
    let mut paths = vec![dir.to_path_buf()];
    if let Some(existing) = existing {
        paths.extend(env::split_paths(&existing));
    }
    env::join_paths(paths).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_is_discoverable() {
        assert_eq!(
            test_file_name(Path::new("/x/my-calc.py")),
            "test_my_calc_generated.py"
        );
    }

    #[test]
    fn import_dir_goes_first() {
        let joined = prepend_pythonpath(
            Path::new("/src/pkg"),
            Some(env::join_paths(["/a", "/b"]).unwrap()),
        )
        .unwrap();
        let parts: Vec<PathBuf> = env::split_paths(&joined).collect();

        assert_eq!(
            parts,
            vec![
                PathBuf::from("/src/pkg"),
                PathBuf::from("/a"),
                PathBuf::from("/b")
            ]
        );
    }

    #[test]
    fn missing_original_is_normalized() {
        let r = PythonSandbox::default().execute(
            "def test_x():\n    pass\n",
            Path::new("/no/such/file.py"),
            Duration::from_secs(5),
        );

        assert!(!r.passed);
        assert_eq!(r.returncode, -1);
        assert!(r.output.starts_with("Execution error:"));
        assert_eq!(r.runner, Runner::None);
    }

    #[test]
    fn missing_interpreter_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("m.py");
        fs::write(&original, "x = 1\n").unwrap();

        let r = PythonSandbox::new("codeqa-no-such-python").execute(
            "",
            &original,
            Duration::from_secs(5),
        );

        assert_eq!(r.returncode, -1);
        assert!(r.output.contains("failed to launch"));
    }
}
