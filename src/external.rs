use crate::command::{
    CommandFactory, EXIT_EXEC_FAILURE, ExecutableCommand, ExitCode, Stdin, Stdout,
};
use crate::env::Environment;
use crate::interpreter::Factory;
use anyhow::Result;
use log::debug;
use std::ffi::{OsStr, OsString};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

/// Command that is not a builtin: an external program resolved against PATH.
pub struct ExternalCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        let search_paths = env.get_var("PATH")?;
        let program = find_command_path(OsStr::new(&search_paths), Path::new(name))?;
        Some(Box::new(ExternalCommand {
            program,
            args: args.iter().map(Into::into).collect(),
        }))
    }
}

impl ExecutableCommand for ExternalCommand {
    /// Spawn the program and block until it exits. Exec failure is reported
    /// to standard error with a distinguished status and never terminates
    /// the interpreter.
    fn execute(
        self: Box<Self>,
        stdin: Box<dyn Stdin>,
        stdout: Box<dyn Stdout>,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        debug!("spawning {}", self.program.display());
        let mut child = match std::process::Command::new(&self.program)
            .args(&self.args)
            .env_clear()
            .envs(&env.vars)
            .current_dir(&env.current_dir)
            .stdin(stdin.stdio())
            .stdout(stdout.stdio())
            .spawn()
        {
            Ok(child) => child,
            Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                eprintln!(
                    "{}: command not found or not executable",
                    self.program.display()
                );
                return Ok(EXIT_EXEC_FAILURE);
            }
            Err(err) => return Err(err.into()),
        };
        let status = child.wait()?;
        Ok(exit_code(status))
    }
}

/// Map a child's wait status onto the shell's exit code convention.
pub(crate) fn exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(code) => code,
        None => terminated_by_signal(status),
    }
}

fn terminated_by_signal(status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => 128 + signal,
        None => -1,
    }
}

/// Resolve a program name the way `execvp` would against the given PATH value.
///
/// Behavior:
/// - Absolute path, or any path with a directory component (`bin/sh`,
///   `./foo`): returned as-is if it exists.
/// - Single bare component: each directory in `search_paths` is tried in
///   order and the first existing match wins.
/// - Empty path: `None`.
pub fn find_command_path(search_paths: &OsStr, program: &Path) -> Option<PathBuf> {
    if program.as_os_str().is_empty() {
        return None;
    }

    if program.is_absolute() || program.components().count() > 1 {
        return program.exists().then(|| program.to_path_buf());
    }

    std::env::split_paths(search_paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.exists())
}
