use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Insertion-ordered table of shell-local variables.
///
/// Locals are distinct from environment variables: they are never passed to
/// child processes and are only consulted by the expanders and the `local`
/// and `vars` built-ins. Storage order is the order of first assignment;
/// overwriting a name keeps its position.
#[derive(Debug, Clone, Default)]
pub struct LocalVars {
    entries: Vec<(String, String)>,
}

impl LocalVars {
    /// Look up a local variable by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set or overwrite a local variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Iterate over all entries in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Mutable, user-level view of the process environment used by the interpreter.
///
/// The environment contains:
/// - `vars`: the environment variables visible to executed commands.
/// - `locals`: the shell-local variable table, invisible to children.
/// - `current_dir`: the working directory for command execution.
/// - `should_exit`: a flag the evaluation loop checks to know when to stop.
/// - `exit_status`: the status reported when the interpreter exits on
///   end-of-input; built-in usage errors set it to 255.
///
/// Note: fields are public for simplicity to keep the crate small.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// Shell-local variables managed by the `local` built-in.
    pub locals: LocalVars,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// When set to true, indicates that the evaluation loop should exit.
    pub should_exit: bool,
    /// Status used when the interpreter later exits via end-of-input.
    pub exit_status: i32,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// This snapshots `std::env::vars()` and initializes `current_dir` from
    /// `std::env::current_dir()`. The snapshot is authoritative afterwards:
    /// `export` edits it, and children receive exactly its contents.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            locals: LocalVars::default(),
            current_dir,
            should_exit: false,
            exit_status: 0,
        }
    }

    /// Get the value of an environment variable.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    /// Set or override an environment variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Remove an environment variable. Removing an absent name is a no-op.
    pub fn unset_var(&mut self, key: &str) {
        self.vars.remove(key);
    }

    /// Variable lookup as seen by the expanders: the environment wins over
    /// the local table; an undefined name is `None`.
    pub fn lookup(&self, name: &str) -> Option<String> {
        self.get_var(name)
            .or_else(|| self.locals.get(name).map(str::to_string))
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
