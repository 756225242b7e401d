//! Quote-aware word splitting for one fully-expanded command line.
//!
//! Splitting happens after substitution and variable expansion, so the words
//! produced here are final: they are never re-expanded or re-scanned.

use thiserror::Error;

/// Errors that can occur while splitting a command line into words.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenizeError {
    /// A single-quoted token was never closed.
    #[error("missing closing quote")]
    MissingClosingQuote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    Word,
    SingleQuote,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    buffer: String,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        let mut input: Vec<char> = line.chars().collect();
        // A trailing newline terminates the last word like any other space.
        if let Some(last) = input.last_mut() {
            if *last == '\n' {
                *last = ' ';
            }
        }
        LexingFSM {
            input,
            pos: 0,
            state: LexingState::Start,
            buffer: String::new(),
        }
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    /// Walk the input, accumulating words according to the splitting rules.
    fn split(&mut self) -> Result<Vec<String>, TokenizeError> {
        let mut words = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start => self.handle_start(ch),
                LexingState::Word => self.handle_word(ch, &mut words),
                LexingState::SingleQuote => self.handle_single_quote(ch, &mut words),
            }
        }

        match self.state {
            LexingState::SingleQuote => return Err(TokenizeError::MissingClosingQuote),
            LexingState::Word => words.push(std::mem::take(&mut self.buffer)),
            LexingState::Start => {}
        }

        Ok(words)
    }

    fn handle_start(&mut self, ch: char) {
        match ch {
            ' ' => {}
            '\'' => self.state = LexingState::SingleQuote,
            c => {
                self.buffer.push(c);
                self.state = LexingState::Word;
            }
        }
    }

    fn handle_word(&mut self, ch: char, words: &mut Vec<String>) {
        match ch {
            ' ' => {
                words.push(std::mem::take(&mut self.buffer));
                self.state = LexingState::Start;
            }
            // A quote is only special at the start of a word.
            c => self.buffer.push(c),
        }
    }

    fn handle_single_quote(&mut self, ch: char, words: &mut Vec<String>) {
        match ch {
            '\'' => {
                // The quoted text is one word, even when empty.
                words.push(std::mem::take(&mut self.buffer));
                self.state = LexingState::Start;
            }
            c => self.buffer.push(c),
        }
    }
}

/// Split one fully-expanded command line into its argument vector.
///
/// Words are separated by spaces; runs of spaces collapse. Text enclosed in
/// single quotes forms one literal word with the quotes stripped and any
/// embedded spaces preserved. An unterminated quote aborts the whole line
/// with [`TokenizeError::MissingClosingQuote`] rather than producing a
/// partial vector. Empty input yields an empty vector, which callers treat
/// as a no-op line.
pub fn split_words(line: &str) -> Result<Vec<String>, TokenizeError> {
    let mut lexer = LexingFSM::new(line);
    lexer.split()
}

/// Re-quote an argument vector into a line that [`split_words`] maps back to
/// the same vector, provided no word contains a single quote itself.
pub fn requote(words: &[String]) -> String {
    let quoted: Vec<String> = words.iter().map(|w| format!("'{}'", w)).collect();
    quoted.join(" ")
}
