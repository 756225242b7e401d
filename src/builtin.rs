use crate::command::{
    CommandFactory, EXIT_USAGE, ExecutableCommand, ExitCode, Stdin, Stdout,
};
use crate::env::Environment;
use crate::interpreter::Factory;
use anyhow::Result;
use argh::{EarlyExit, FromArgs};
use std::fs;
use std::io::{Read, Write};

/// Built-in commands known to the interpreter at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed
/// directly in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "export" or "vars".
    fn name() -> &'static str;

    /// Executes the command using provided IO streams and environment.
    ///
    /// Return value follows shell conventions: 0 for success, non-zero for
    /// error.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        mut stdin: Box<dyn Stdin>,
        mut stdout: Box<dyn Stdout>,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        match T::execute(*self, &mut stdin, &mut stdout, env) {
            Ok(code) => Ok(code),
            Err(e) => {
                // Runtime failures are reported but never fatal to the shell.
                eprintln!("{}: {e:#}", T::name());
                Ok(1)
            }
        }
    }
}

/// Result of argh rejecting (or answering `--help` for) a builtin invocation.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        _stdin: Box<dyn Stdin>,
        mut stdout: Box<dyn Stdout>,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        if self.is_error {
            eprintln!("{}", self.output.trim_end());
            env.exit_status = EXIT_USAGE;
            Ok(EXIT_USAGE)
        } else {
            writeln!(stdout, "{}", self.output.trim_end())?;
            Ok(0)
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

/// Report a malformed builtin invocation and record the usage status.
fn usage_error(env: &mut Environment, message: &str) -> Result<ExitCode> {
    eprintln!("{message}");
    env.exit_status = EXIT_USAGE;
    Ok(EXIT_USAGE)
}

#[derive(FromArgs)]
/// Terminate the interpreter. Takes no arguments.
pub struct Exit {}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        env.should_exit = true;
        env.exit_status = 0;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Set or remove an environment variable.
pub struct Export {
    #[argh(positional)]
    /// NAME=VALUE to set; NAME= or a bare NAME to remove.
    pub assignment: String,
}

impl BuiltinCommand for Export {
    fn name() -> &'static str {
        "export"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        match self.assignment.split_once('=') {
            Some((name, "")) => env.unset_var(name),
            Some((name, value)) => env.set_var(name, value),
            None => env.unset_var(&self.assignment),
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Set or update a shell-local variable.
pub struct Local {
    #[argh(positional)]
    /// NAME=VALUE; a VALUE of $OTHER copies another local at assignment time.
    pub assignment: String,
}

impl BuiltinCommand for Local {
    fn name() -> &'static str {
        "local"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let Some((name, value)) = self.assignment.split_once('=') else {
            return usage_error(env, "local: usage: local NAME=VALUE");
        };

        // A $NAME value copies the referenced local as it is right now;
        // an unknown reference is stored literally.
        let value = match value.strip_prefix('$') {
            Some(referenced) => env.locals.get(referenced).unwrap_or(value).to_string(),
            None => value.to_string(),
        };

        env.locals.set(name, value);
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List all shell-local variables as NAME=VALUE, one per line, in storage
/// order.
pub struct Vars {}

impl BuiltinCommand for Vars {
    fn name() -> &'static str {
        "vars"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        for (name, value) in env.locals.iter() {
            writeln!(stdout, "{name}={value}")?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List the current directory in sorted order, directories suffixed with
/// '/', hidden entries skipped.
pub struct Ls {}

impl BuiltinCommand for Ls {
    fn name() -> &'static str {
        "ls"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&env.current_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let is_dir = entry.file_type()?.is_dir();
            entries.push((name, is_dir));
        }
        entries.sort();

        for (name, is_dir) in entries {
            if is_dir {
                writeln!(stdout, "{name}/")?;
            } else {
                writeln!(stdout, "{name}")?;
            }
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List processes from the operating system's process table.
pub struct Ps {}

impl BuiltinCommand for Ps {
    fn name() -> &'static str {
        "ps"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{:>5} {:>5} {:>1} {}", "PID", "PPID", "S", "COMMAND")?;

        for entry in fs::read_dir("/proc")? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            // Processes may vanish between the listing and the read.
            let Ok(stat) = fs::read_to_string(entry.path().join("stat")) else {
                continue;
            };
            if let Some((pid, ppid, state, comm)) = parse_proc_stat(&stat) {
                writeln!(stdout, "{pid:>5} {ppid:>5} {state} {comm}")?;
            }
        }
        Ok(0)
    }
}

/// Pull pid, ppid, state and command name out of one `/proc/<pid>/stat` line.
fn parse_proc_stat(stat: &str) -> Option<(i32, i32, char, &str)> {
    let open = stat.find('(')?;
    let close = open + stat[open..].find(')')?;

    let pid: i32 = stat[..open].trim().parse().ok()?;
    let comm = &stat[open + 1..close];

    let mut rest = stat[close + 1..].split_whitespace();
    let state = rest.next()?.chars().next()?;
    let ppid: i32 = rest.next()?.parse().ok()?;

    Some((pid, ppid, state, comm))
}
