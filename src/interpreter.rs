use crate::command::{CommandFactory, EXIT_EXEC_FAILURE, ExitCode, Stdin};
use crate::env::Environment;
use crate::expand::{self, ExpandError};
use crate::lexer::{self, TokenizeError};
use crate::pipeline::{self, PipelineError};
use anyhow::Context;
use log::debug;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;

const PROMPT: &str = "minish> ";

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports commands defined in this crate — the built-ins and
/// ExternalCommand.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Errors that abort evaluation of a single command line.
///
/// Every variant is line-scoped: the offending line is dropped, reported
/// once, and the interpreter moves on to the next line.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Expand(#[from] ExpandError),
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// A launched command failed in a way that is not an exec failure.
    #[error("{0}")]
    Command(anyhow::Error),
}

/// The command interpreter: an [`Environment`] plus the ordered list of
/// [`CommandFactory`] objects queried to create commands by name.
///
/// One instance owns all evaluation state; nothing is global, so separate
/// instances are fully isolated (handy for tests).
///
/// Example
/// ```
/// use minish::Interpreter;
/// let mut sh = Interpreter::default();
/// let code = sh.eval("local GREETING=hello").unwrap();
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(),
            commands,
        }
    }

    /// Evaluate one command line.
    ///
    /// The line is expanded exactly once (command substitutions first,
    /// then variables) and only then split: into pipeline stages when the
    /// expanded line contains `|`, or straight into an argument vector.
    /// Returns the executed command's exit code; an empty line is a no-op
    /// reported as success.
    pub fn eval(&mut self, line: &str) -> Result<ExitCode, EvalError> {
        let line = expand::expand_substitutions(line, &self.env)?;
        let line = expand::expand_variables(&line, &self.env);
        debug!("expanded line: {line:?}");

        if line.contains('|') {
            return Ok(pipeline::run_pipeline(&line, &self.env)?);
        }

        let argv = lexer::split_words(&line)?;
        if argv.is_empty() {
            return Ok(0);
        }
        self.run_argv(&argv)
    }

    /// Resolve one argument vector against the factories and execute it.
    fn run_argv(&mut self, argv: &[String]) -> Result<ExitCode, EvalError> {
        let name = argv[0].as_str();
        let args: Vec<&str> = argv[1..].iter().map(String::as_str).collect();

        for factory in &self.commands {
            if let Some(cmd) = factory.try_create(&self.env, name, &args) {
                let stdin = Box::new(InheritedStdin(std::io::stdin().lock()));
                return cmd
                    .execute(stdin, Box::new(std::io::stdout()), &mut self.env)
                    .map_err(EvalError::Command);
            }
        }

        eprintln!("{name}: command not found or not executable");
        Ok(EXIT_EXEC_FAILURE)
    }

    /// Interactive mode: prompt, evaluate, repeat until `exit` or
    /// end-of-input. Returns the status the process should exit with.
    pub fn run_interactive(&mut self) -> anyhow::Result<ExitCode> {
        let mut rl = DefaultEditor::new()?;

        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    rl.add_history_entry(line.as_str())?;
                    self.eval_and_report(&line);
                    if self.env.should_exit {
                        return Ok(self.env.exit_status);
                    }
                }
                // A discarded line, not a termination request.
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => return Ok(self.env.exit_status),
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Batch mode: evaluate every line of the script in order. Reaching the
    /// end of the script exits successfully regardless of earlier statuses.
    pub fn run_script(&mut self, path: &Path) -> anyhow::Result<ExitCode> {
        let file =
            File::open(path).with_context(|| format!("cannot open script {}", path.display()))?;

        for line in BufReader::new(file).lines() {
            let line = line?;
            self.eval_and_report(&line);
            if self.env.should_exit {
                return Ok(self.env.exit_status);
            }
        }
        Ok(0)
    }

    /// Evaluate a line, reporting any line-scoped error without stopping.
    fn eval_and_report(&mut self, line: &str) {
        if let Err(err) = self.eval(line) {
            eprintln!("minish: {err}");
        }
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the full built-in set plus the external
    /// command launcher, tried in that order.
    fn default() -> Self {
        use crate::builtin::*;
        use crate::external::ExternalCommand;
        Self::new(vec![
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<Export>::default()),
            Box::new(Factory::<Local>::default()),
            Box::new(Factory::<Vars>::default()),
            Box::new(Factory::<Ls>::default()),
            Box::new(Factory::<Ps>::default()),
            Box::new(Factory::<ExternalCommand>::default()),
        ])
    }
}

struct InheritedStdin<'a>(std::io::StdinLock<'a>);

impl Read for InheritedStdin<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl Stdin for InheritedStdin<'_> {
    fn stdio(self: Box<Self>) -> Stdio {
        Stdio::inherit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::EXIT_USAGE;

    fn interpreter() -> Interpreter {
        let mut sh = Interpreter::default();
        sh.env.set_var("PATH", "/usr/bin:/bin");
        sh
    }

    #[test]
    fn test_empty_line_is_a_noop() {
        let mut sh = interpreter();
        assert_eq!(sh.eval("").unwrap(), 0);
        assert_eq!(sh.eval("   \n").unwrap(), 0);
        assert!(!sh.env.should_exit);
    }

    #[test]
    fn test_local_copy_semantics_through_eval() {
        let mut sh = interpreter();
        sh.eval("local A=1").unwrap();
        sh.eval("local B=$A").unwrap();
        sh.eval("local A=2").unwrap();

        assert_eq!(sh.env.locals.get("A"), Some("2"));
        assert_eq!(sh.env.locals.get("B"), Some("1"));
    }

    #[test]
    fn test_export_feeds_variable_expansion() {
        let mut sh = interpreter();
        sh.eval("export WHO=world").unwrap();
        let expanded = expand::expand_variables("echo $WHO", &sh.env);
        assert_eq!(expanded, "echo world");
    }

    #[test]
    fn test_exit_sets_should_exit() {
        let mut sh = interpreter();
        assert_eq!(sh.eval("exit").unwrap(), 0);
        assert!(sh.env.should_exit);
        assert_eq!(sh.env.exit_status, 0);
    }

    #[test]
    fn test_exit_with_arguments_is_a_usage_error() {
        let mut sh = interpreter();
        assert_eq!(sh.eval("exit now").unwrap(), EXIT_USAGE);
        assert!(!sh.env.should_exit);
        assert_eq!(sh.env.exit_status, EXIT_USAGE);
    }

    #[test]
    fn test_malformed_substitution_drops_the_line() {
        let mut sh = interpreter();
        sh.eval("local SENTINEL=untouched").unwrap();

        let err = sh.eval("local SENTINEL=$(echo broken").unwrap_err();
        assert!(matches!(
            err,
            EvalError::Expand(ExpandError::UnbalancedParens)
        ));
        // fail-fast: the malformed line had no partial effect
        assert_eq!(sh.env.locals.get("SENTINEL"), Some("untouched"));
    }

    #[test]
    fn test_missing_quote_drops_the_line() {
        let mut sh = interpreter();
        let err = sh.eval("echo 'oops").unwrap_err();
        assert!(matches!(
            err,
            EvalError::Tokenize(TokenizeError::MissingClosingQuote)
        ));
    }

    #[test]
    fn test_unknown_command_reports_exec_failure() {
        let mut sh = interpreter();
        let code = sh.eval("definitely-not-a-command-xyz").unwrap();
        assert_eq!(code, EXIT_EXEC_FAILURE);
        assert!(!sh.env.should_exit);
    }

    #[test]
    fn test_substitution_result_feeds_execution() {
        let mut sh = interpreter();
        let code = sh.eval("$(echo true)").unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn test_pipeline_line_is_routed_to_the_pipeline_builder() {
        let mut sh = interpreter();
        let err = sh.eval("echo hi ||").unwrap_err();
        assert!(matches!(
            err,
            EvalError::Pipeline(PipelineError::EmptyStage)
        ));
    }
}
