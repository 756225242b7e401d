use crate::env::Environment;
use anyhow::Result;
use std::io::{Read, Write};
use std::process::Stdio;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure,
/// mirroring the convention used by POSIX shells.
pub type ExitCode = i32;

/// Exit code reported when a program cannot be found or executed.
pub const EXIT_EXEC_FAILURE: ExitCode = 127;

/// Exit code recorded when a built-in is invoked with malformed arguments.
pub const EXIT_USAGE: ExitCode = 255;

/// Abstraction over a readable input stream that can also be converted into
/// a [`Stdio`] handle when the command turns out to be an external process.
///
/// A blanket implementation exists for any type that implements `Read` and
/// `Into<Stdio>` (e.g. `StdinLock` via a wrapper, or `ChildStdout`).
pub trait Stdin: Read {
    /// Convert this input into a [`Stdio`] handle for `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Read + Into<Stdio>> Stdin for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// Abstraction over a writable output stream that can also be converted into
/// a [`Stdio`] handle when the command turns out to be an external process.
pub trait Stdout: Write {
    /// Convert this output into a [`Stdio`] handle for `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Write + Into<Stdio>> Stdout for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// Object-safe trait for any command the interpreter can execute.
///
/// Built-ins get this via a blanket impl and run in-process; external
/// commands spawn a child and block until it exits.
pub trait ExecutableCommand {
    /// Executes the command against the given streams and environment.
    fn execute(
        self: Box<Self>,
        stdin: Box<dyn Stdin>,
        stdout: Box<dyn Stdout>,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`. The
/// external-command factory uses the environment to resolve the program
/// against PATH.
pub trait CommandFactory {
    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>>;
}
