//! Pipeline construction and execution.
//!
//! A fully-expanded line containing `|` runs through a fixed sequence:
//! split on `|`, tokenize every stage, spawn one child per stage with the
//! connecting pipes wired to standard input/output, then wait for all of
//! them. Stages are always external programs, never built-ins.

use crate::command::{EXIT_EXEC_FAILURE, ExitCode};
use crate::env::Environment;
use crate::external::{exit_code, find_command_path};
use crate::lexer::{self, TokenizeError};
use log::debug;
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use thiserror::Error;

/// Errors that abort a pipeline before or during stage launch.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A `|`-delimited segment produced no words; nothing runs.
    #[error("empty pipeline stage")]
    EmptyStage,
    /// A segment failed to tokenize; nothing runs.
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    /// The operating system refused to spawn a stage; evaluation of the
    /// line is abandoned after reaping the stages already launched.
    #[error("failed to spawn pipeline stage: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Run one fully-expanded command line containing at least one `|`.
///
/// The pipeline's exit code is the last stage's. A stage whose program
/// cannot be resolved is reported on standard error and recorded as exit
/// status 127; the other stages still run and simply observe end-of-stream
/// or a broken pipe.
pub fn run_pipeline(line: &str, env: &Environment) -> Result<ExitCode, PipelineError> {
    run_pipeline_with_stdout(line, env, Stdio::inherit())
}

fn run_pipeline_with_stdout(
    line: &str,
    env: &Environment,
    last_stdout: Stdio,
) -> Result<ExitCode, PipelineError> {
    let stages = split_stages(line)?;
    debug!("pipeline stages: {stages:?}");

    let last = stages.len() - 1;
    let search_paths = env.get_var("PATH").unwrap_or_default();

    let mut statuses: Vec<ExitCode> = vec![0; stages.len()];
    let mut children: Vec<(usize, Child)> = Vec::with_capacity(stages.len());
    // Read end of the pipe feeding the next stage, handed over at spawn.
    let mut upstream: Option<ChildStdout> = None;
    let mut last_stdout = Some(last_stdout);

    for (i, argv) in stages.iter().enumerate() {
        let stdin = match upstream.take() {
            Some(prev) => Stdio::from(prev),
            None if i == 0 => Stdio::inherit(),
            // The upstream stage never launched; readers see end-of-stream.
            None => Stdio::null(),
        };

        let Some(program) = find_command_path(OsStr::new(&search_paths), Path::new(&argv[0]))
        else {
            eprintln!("{}: command not found or not executable", argv[0]);
            statuses[i] = EXIT_EXEC_FAILURE;
            continue;
        };

        let mut cmd = Command::new(&program);
        cmd.args(&argv[1..])
            .env_clear()
            .envs(&env.vars)
            .current_dir(&env.current_dir)
            .stdin(stdin);
        if i < last {
            cmd.stdout(Stdio::piped());
        } else {
            cmd.stdout(last_stdout.take().expect("last stage stdout used once"));
        }

        match cmd.spawn() {
            Ok(mut child) => {
                // The parent's only handle on the new pipe; the next
                // iteration moves it into the downstream stage.
                upstream = child.stdout.take();
                children.push((i, child));
            }
            Err(err) => {
                wait_all(children, &mut statuses);
                return Err(PipelineError::Spawn(err));
            }
        }
    }

    wait_all(children, &mut statuses);
    Ok(statuses[last])
}

/// Split on `|` and tokenize every stage up front, so that a malformed
/// segment anywhere aborts the pipeline before any process is launched.
fn split_stages(line: &str) -> Result<Vec<Vec<String>>, PipelineError> {
    let mut stages = Vec::new();
    for segment in line.split('|') {
        let words = lexer::split_words(segment)?;
        if words.is_empty() {
            return Err(PipelineError::EmptyStage);
        }
        stages.push(words);
    }
    Ok(stages)
}

/// Reap every launched child, unordered, recording each stage's status.
fn wait_all(children: Vec<(usize, Child)>, statuses: &mut [ExitCode]) {
    for (i, mut child) in children {
        match child.wait() {
            Ok(status) => statuses[i] = exit_code(status),
            Err(err) => {
                eprintln!("wait for pipeline stage failed: {err}");
                statuses[i] = -1;
            }
        }
    }
}
