use anyhow::Result;
use argh::FromArgs;
use minish::Interpreter;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::path::PathBuf;

#[derive(FromArgs)]
/// A small line-oriented command interpreter.
struct Args {
    #[argh(positional)]
    /// script file to evaluate in batch mode; interactive when omitted.
    script: Option<PathBuf>,

    #[argh(switch, short = 'v')]
    /// trace expansion and pipeline construction on standard error.
    verbose: bool,
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    init_logging(args.verbose)?;

    let mut sh = Interpreter::default();
    let status = match args.script {
        Some(path) => sh.run_script(&path)?,
        None => sh.run_interactive()?,
    };
    std::process::exit(status)
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )?;
    Ok(())
}
