//! Command-substitution and variable expansion over raw command lines.
//!
//! Both passes run once, before any tokenization: substitution first, then
//! variables. Expanded values are never re-tokenized or re-scanned for `$`
//! references.

use crate::env::Environment;
use log::debug;
use std::process::Command;
use thiserror::Error;

/// Errors that abort expansion of a whole command line.
///
/// Expansion errors are fail-fast and line-scoped: the caller must drop the
/// line rather than use a partial result.
#[derive(Debug, Error)]
pub enum ExpandError {
    /// A `$(` without a matching `)`.
    #[error("unmatched parentheses in command substitution")]
    UnbalancedParens,
    /// A `$()` with nothing between the markers.
    #[error("empty command substitution")]
    EmptySubstitution,
    /// The host shell for a substitution capture could not be spawned.
    #[error("failed to spawn substitution command: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Replace every `$(cmd)` construct with the captured output of running `cmd`.
///
/// The leftmost `$(` is located, its matching `)` found by counting nested
/// parentheses, and the inner command is recursively expanded *before*
/// execution so nested substitutions resolve inside-out. The capture is
/// spliced in with at most one trailing newline stripped, and the scan
/// restarts from the beginning of the string, which also picks up any later
/// substitutions on the same line. Returns a new owned string.
pub fn expand_substitutions(line: &str, env: &Environment) -> Result<String, ExpandError> {
    let mut result = line.to_string();

    while let Some(start) = result.find("$(") {
        let inner_start = start + 2;
        let inner_end = match find_closing_paren(&result[inner_start..]) {
            Some(offset) => inner_start + offset,
            None => return Err(ExpandError::UnbalancedParens),
        };

        let inner = &result[inner_start..inner_end];
        if inner.is_empty() {
            return Err(ExpandError::EmptySubstitution);
        }

        // Inner substitutions resolve first, deepest command runs first.
        let inner = expand_substitutions(inner, env)?;
        let captured = capture_output(&inner, env)?;
        debug!("substitution {:?} captured {:?}", inner, captured);

        result.replace_range(start..=inner_end, &captured);
    }

    Ok(result)
}

/// Byte offset of the `)` matching an already-consumed `$(`, if any.
fn find_closing_paren(s: &str) -> Option<usize> {
    let mut depth = 1usize;
    for (idx, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Run a fully-expanded substitution command through the host shell and
/// capture its standard output, stripping at most one trailing newline.
fn capture_output(command: &str, env: &Environment) -> Result<String, ExpandError> {
    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .env_clear()
        .envs(&env.vars)
        .current_dir(&env.current_dir)
        .output()
        .map_err(ExpandError::Spawn)?;

    let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
    if captured.ends_with('\n') {
        captured.pop();
    }
    Ok(captured)
}

/// Token delimiters recognized by the variable expander.
const DELIMITERS: [char; 4] = [' ', '\t', '\n', '='];

/// Replace every delimiter-bounded `$NAME` token with NAME's value.
///
/// Resolution order is the environment table first, then the local variable
/// store, then the empty string. Tokens beginning `$(` are left alone (they
/// belong to command substitution), and everything outside a matched token,
/// including delimiters and surrounding quotes, is preserved verbatim.
/// Expanded values are not re-scanned, so this pass never recurses.
pub fn expand_variables(line: &str, env: &Environment) -> String {
    let mut result = String::with_capacity(line.len());
    let mut token = String::new();

    for ch in line.chars() {
        if DELIMITERS.contains(&ch) {
            flush_token(&mut result, &mut token, env);
            result.push(ch);
        } else {
            token.push(ch);
        }
    }
    flush_token(&mut result, &mut token, env);

    result
}

/// Append the pending token to `out`, substituting it when it names a variable.
fn flush_token(out: &mut String, token: &mut String, env: &Environment) {
    if let Some(name) = token.strip_prefix('$') {
        if !name.is_empty() && !name.starts_with('(') {
            out.push_str(&env.lookup(name).unwrap_or_default());
            token.clear();
            return;
        }
    }
    out.push_str(token);
    token.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::LocalVars;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn test_env() -> Environment {
        let mut vars = HashMap::new();
        // a minimal PATH so `sh` can find the usual tools
        vars.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
        Environment {
            vars,
            locals: LocalVars::default(),
            current_dir: PathBuf::from("."),
            should_exit: false,
            exit_status: 0,
        }
    }

    #[test]
    fn test_expansion_is_identity_without_dollar() {
        let env = test_env();
        let line = "echo plain words | sort -r";
        assert_eq!(expand_substitutions(line, &env).unwrap(), line);
        assert_eq!(expand_variables(line, &env), line);
    }

    #[test]
    fn test_simple_substitution() {
        let env = test_env();
        let out = expand_substitutions("echo $(echo inner)", &env).unwrap();
        assert_eq!(out, "echo inner");
    }

    #[test]
    fn test_nested_substitution_resolves_inside_out() {
        let env = test_env();
        let out = expand_substitutions("$(echo $(echo inner))", &env).unwrap();
        assert_eq!(out, "inner");
    }

    #[test]
    fn test_sequential_substitutions() {
        let env = test_env();
        let out = expand_substitutions("$(echo a) and $(echo b)", &env).unwrap();
        assert_eq!(out, "a and b");
    }

    #[test]
    fn test_only_one_trailing_newline_is_stripped() {
        let env = test_env();
        let out = expand_substitutions("$(printf 'a\\nb\\n')", &env).unwrap();
        assert_eq!(out, "a\nb");
    }

    #[test]
    fn test_unbalanced_parens_abort_the_line() {
        let env = test_env();
        let err = expand_substitutions("$(echo foo", &env).unwrap_err();
        assert!(matches!(err, ExpandError::UnbalancedParens));
    }

    #[test]
    fn test_empty_substitution_aborts_the_line() {
        let env = test_env();
        let err = expand_substitutions("echo $()", &env).unwrap_err();
        assert!(matches!(err, ExpandError::EmptySubstitution));
    }

    #[test]
    fn test_variable_from_environment() {
        let mut env = test_env();
        env.set_var("GREETING", "hello");
        assert_eq!(expand_variables("echo $GREETING", &env), "echo hello");
    }

    #[test]
    fn test_variable_falls_back_to_locals() {
        let mut env = test_env();
        env.locals.set("NAME", "local-value");
        assert_eq!(expand_variables("echo $NAME", &env), "echo local-value");
    }

    #[test]
    fn test_environment_wins_over_locals() {
        let mut env = test_env();
        env.set_var("NAME", "from-env");
        env.locals.set("NAME", "from-locals");
        assert_eq!(expand_variables("echo $NAME", &env), "echo from-env");
    }

    #[test]
    fn test_undefined_variable_expands_to_empty() {
        let env = test_env();
        assert_eq!(expand_variables("echo $NO_SUCH_VAR.", &env), "echo ");
    }

    #[test]
    fn test_equal_sign_delimits_tokens() {
        let mut env = test_env();
        env.locals.set("A", "1");
        assert_eq!(expand_variables("local B=$A", &env), "local B=1");
    }

    #[test]
    fn test_command_substitution_tokens_are_skipped() {
        let env = test_env();
        assert_eq!(expand_variables("echo $(pwd", &env), "echo $(pwd");
    }

    #[test]
    fn test_quoted_tokens_are_preserved_verbatim() {
        let mut env = test_env();
        env.set_var("A", "value");
        assert_eq!(expand_variables("echo '$A'", &env), "echo '$A'");
    }

    #[test]
    fn test_expanded_values_are_not_rescanned() {
        let mut env = test_env();
        env.set_var("OUTER", "$INNER");
        env.set_var("INNER", "surprise");
        assert_eq!(expand_variables("echo $OUTER", &env), "echo $INNER");
    }

    #[test]
    fn test_bare_dollar_is_literal() {
        let env = test_env();
        assert_eq!(expand_variables("echo $ a", &env), "echo $ a");
    }
}
