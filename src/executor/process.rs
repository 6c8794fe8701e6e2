// Runs one command with a deadline and returns raw streams + exit code.
// No interpretation beyond pytest's summary counts.

use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};
use regex::Regex;
use thiserror::Error;

use crate::state::TestCounts;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExecResult {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum ExecFailure {
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out after {:.3}s", .limit.as_secs_f64())]
    Timeout { limit: Duration },

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Spawn `cmd` with piped output and wait at most `timeout` for it.
///
/// The deadline covers both the exit and the drain of its pipes. On unix
/// the child leads its own process group, and the whole group is killed on
/// expiry so background grandchildren cannot hold the pipes open.
pub fn run_bounded(cmd: &mut Command, timeout: Duration) -> Result<RawExecResult, ExecFailure> {
    let program = cmd.get_program().to_string_lossy().into_owned();

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ExecFailure::Launch { program, source })?;

    let (tx, rx) = crossbeam_channel::unbounded();
    spawn_reader(Stream::Stdout, child.stdout.take(), tx.clone());
    spawn_reader(Stream::Stderr, child.stderr.take(), tx);

    // `None` when the limit is too large to represent; waits are then unbounded
    let deadline = Instant::now().checked_add(timeout);
    let expired = || deadline.is_some_and(|d| Instant::now() >= d);

    let status = loop {
        if expired() {
            kill_and_reap(&mut child);
            return Err(ExecFailure::Timeout { limit: timeout });
        }

        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                kill_and_reap(&mut child);
                return Err(ExecFailure::Io(e));
            }
        }
    };

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    // each reader sends exactly once, when its pipe reaches EOF
    for _ in 0..2 {
        let received = match deadline {
            Some(d) => rx.recv_timeout(d.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok((Stream::Stdout, buf)) => stdout = buf,
            Ok((Stream::Stderr, buf)) => stderr = buf,
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                kill_group(child.id());
                return Err(ExecFailure::Timeout { limit: timeout });
            }
        }
    }

    Ok(RawExecResult {
        returncode: status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn kill_and_reap(child: &mut Child) {
    kill_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

/// SIGKILL the group led by `pid`. The leader may already be reaped; the
/// group id stays valid while any member is alive.
#[cfg(unix)]
fn kill_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_: u32) {}

fn spawn_reader<R: Read + Send + 'static>(
    which: Stream,
    pipe: Option<R>,
    tx: Sender<(Stream, Vec<u8>)>,
) {
    let Some(mut pipe) = pipe else {
        let _ = tx.send((which, Vec::new()));
        return;
    };
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send((which, buf));
    });
}

static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) (passed|failed|errors?)\b").expect("count pattern is valid")
});

/// Counts from pytest's final summary line, if it printed one.
pub fn parse_pytest_counts(output: &str) -> Option<TestCounts> {
    let summary = output.lines().rev().find(|l| COUNT_RE.is_match(l))?;

    let mut counts = TestCounts::default();
    for c in COUNT_RE.captures_iter(summary) {
        let n = c[1].parse::<usize>().unwrap_or(0);
        match &c[2] {
            "passed" => counts.passed = n,
            "failed" => counts.failed = n,
            _ => counts.errors = n,
        }
    }
    Some(counts)
}

/// pytest exit code 5 means nothing was collected.
pub fn no_tests_collected(returncode: i32, output: &str) -> bool {
    if returncode == 5 {
        return true;
    }
    let lower = output.to_lowercase();
    lower.contains("collected 0 items") || lower.contains("no tests ran")
}
