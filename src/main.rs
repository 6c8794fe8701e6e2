use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use codeqa::config;
use codeqa::{logger, Pipeline, PipelineResult};

#[derive(Parser, Debug)]
#[command(
    name = "codeqa",
    version,
    about = "Generate pytest suites for Python files, run them in a sandbox, and file bug reports for failures."
)]
struct Cli {
    #[arg(required = true, help = "Python files or directories of *.py files")]
    paths: Vec<PathBuf>,

    #[arg(long, default_value_t = false, help = "Only analyze; do not generate or run tests")]
    analyze_only: bool,

    #[arg(long, default_value_t = false, help = "Skip the reasoning provider and use offline heuristics")]
    offline: bool,

    #[arg(long, help = "Per-run subprocess timeout in seconds")]
    timeout: Option<u64>,

    #[arg(long, help = "Memory bank JSON file")]
    memory: Option<PathBuf>,

    #[arg(long, help = "Python interpreter used to run pytest")]
    python: Option<String>,

    #[arg(long, help = "Config file (default: <config dir>/codeqa/config.toml)")]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = false, help = "Print run counters to stderr when done")]
    metrics: bool,

    #[arg(short, long, default_value_t = false, help = "Debug logging")]
    verbose: bool,
}

#[derive(Serialize)]
struct Entry<'a, T: Serialize> {
    path: &'a Path,
    result: T,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{e}");
            eprintln!("codeqa: {e}");
            ExitCode::from(2)
        }
    }
}

/// Ok(true) when every input passed.
fn run(cli: Cli) -> Result<bool, Box<dyn Error>> {
    let mut cfg = config::load(cli.config.as_deref())?;
    if let Some(t) = cli.timeout {
        cfg.pipeline.timeout_secs = t;
    }
    if let Some(m) = cli.memory {
        cfg.pipeline.memory_path = m;
    }
    if let Some(p) = cli.python {
        cfg.pipeline.python = p;
    }

    let inputs = expand_inputs(&cli.paths)?;
    debug!(count = inputs.len(), "resolved inputs");

    let pipeline = Pipeline::from_config(&cfg, cli.offline);

    let (values, ok) = if cli.analyze_only {
        analyze_all(&pipeline, &inputs)?
    } else {
        run_all(&pipeline, &inputs)?
    };

    let out = match values.len() {
        1 => values.into_iter().next().unwrap_or(Value::Null),
        _ => Value::Array(values),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);

    if cli.metrics {
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&pipeline.metrics().snapshot())?
        );
    }

    Ok(ok)
}

fn run_all(pipeline: &Pipeline, inputs: &[PathBuf]) -> Result<(Vec<Value>, bool), Box<dyn Error>> {
    let single = inputs.len() == 1;
    let mut ok = true;
    let mut values = Vec::with_capacity(inputs.len());

    for (path, result) in pipeline.run_batch(inputs)? {
        ok &= result.is_passed();
        values.push(render(single, &path, &result)?);
    }
    Ok((values, ok))
}

fn analyze_all(pipeline: &Pipeline, inputs: &[PathBuf]) -> Result<(Vec<Value>, bool), Box<dyn Error>> {
    let single = inputs.len() == 1;
    let mut ok = true;
    let mut values = Vec::with_capacity(inputs.len());

    for path in inputs {
        let v = match pipeline.analyze_only(path) {
            Ok(analysis) => render(single, path, &analysis)?,
            Err(e) if e.is_analysis_failure() => {
                ok = false;
                let err = PipelineResult::Error {
                    error: e.to_string(),
                };
                render(single, path, &err)?
            }
            Err(e) => return Err(e.into()),
        };
        values.push(v);
    }
    Ok((values, ok))
}

fn render<T: Serialize>(single: bool, path: &Path, result: &T) -> serde_json::Result<Value> {
    if single {
        serde_json::to_value(result)
    } else {
        serde_json::to_value(Entry { path, result })
    }
}

/// Directories expand to their `*.py` files, non-recursive and sorted; a
/// directory without any is an error. Anything else passes through
/// untouched so the pipeline can report it.
fn expand_inputs(paths: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();

    for p in paths {
        if !p.is_dir() {
            out.push(p.clone());
            continue;
        }

        let mut found: Vec<PathBuf> = fs::read_dir(p)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|f| f.is_file() && f.extension().is_some_and(|ext| ext == "py"))
            .collect();
        if found.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("no *.py files in {}", p.display()),
            ));
        }
        found.sort();
        out.extend(found);
    }

    Ok(out)
}
