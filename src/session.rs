//! Terminal presentation of submissions.
//!
//! A [`Session`] owns the display state and the selected grammar rule. Each
//! submission takes `&mut self`, so submissions are serialized: a new one can
//! only start after the previous one has been joined and rendered.
use crate::catalog::{Catalog, GrammarRule};
use crate::completion::{CompletionBackend, CompletionError};
use crate::orchestrator::{Orchestrator, SubmissionState};
use anyhow::{anyhow, Context, Result};
use std::io::{BufRead, Write};

/// Hint shown when a blank sentence is submitted.
pub const EMPTY_INPUT_HINT: &str = "Please enter a sentence to translate.";

const GRAMMAR_USAGE: &str = "Usage: :grammar <name>";

/// Render the rewritten sentence and one checklist line per catalog rule.
pub fn render_text(state: &SubmissionState, catalog: &Catalog) -> String {
    let mut out = String::new();
    out.push_str("Timeless sentence:\n");
    out.push_str(&format!("  {}\n", state.timeless_sentence));
    out.push_str("\nGrammars:\n");
    for name in catalog.names() {
        let mark = if state.applies(name) { 'x' } else { ' ' };
        out.push_str(&format!("  [{mark}] {name}\n"));
    }
    out
}

pub struct Session<'o, 'a, B> {
    orchestrator: &'o Orchestrator<'a, B>,
    selected: &'a GrammarRule,
    state: SubmissionState,
}

impl<'o, 'a, B: CompletionBackend> Session<'o, 'a, B> {
    pub fn new(orchestrator: &'o Orchestrator<'a, B>, selected: &'a GrammarRule) -> Self {
        Self {
            orchestrator,
            selected,
            state: SubmissionState::default(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    /// Switch the active grammar rule.
    pub fn select(&mut self, name: &str) -> Result<()> {
        self.selected = self.orchestrator.catalog().require(name)?;
        Ok(())
    }

    /// Process one sentence and replace the display state with the result.
    ///
    /// On failure the previous state is cleared; nothing partial is shown.
    pub fn submit(&mut self, sentence: &str) -> Result<&SubmissionState, CompletionError> {
        self.state = SubmissionState::default();
        self.state = self.orchestrator.process(sentence, self.selected)?;
        Ok(&self.state)
    }

    /// Read sentences and commands line by line until EOF or `:quit`.
    ///
    /// Failed submissions are reported and the loop continues, except for
    /// authentication failures, which end the session.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> Result<()> {
        let catalog = self.orchestrator.catalog();
        writeln!(
            output,
            "Grammar: {} (type :grammars to list, :grammar <name> to switch, :quit to exit)",
            self.selected.name
        )?;
        for line in input.lines() {
            let line = line.context("read input line")?;
            let line = line.trim();
            if line == ":quit" {
                break;
            }
            if line == ":grammars" {
                for name in catalog.names() {
                    let mark = if name == self.selected.name { '*' } else { ' ' };
                    writeln!(output, "{mark} {name}")?;
                }
                continue;
            }
            if line == ":grammar" {
                writeln!(output, "{GRAMMAR_USAGE}")?;
                continue;
            }
            if let Some(name) = line.strip_prefix(":grammar ") {
                match self.select(name.trim()) {
                    Ok(()) => writeln!(output, "Grammar: {}", self.selected.name)?,
                    Err(err) => writeln!(output, "{err}")?,
                }
                continue;
            }
            if line.is_empty() {
                writeln!(output, "{EMPTY_INPUT_HINT}")?;
                continue;
            }
            match self.submit(line) {
                Ok(state) => write!(output, "{}", render_text(state, catalog))?,
                Err(err) if err.is_fatal() => {
                    return Err(anyhow!(err).context("session ended"));
                }
                Err(err) => writeln!(output, "Submission failed: {err}")?,
            }
            output.flush()?;
        }
        Ok(())
    }
}
