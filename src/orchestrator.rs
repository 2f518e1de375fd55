//! Dual-task orchestration.
//!
//! One submission issues two structured completions against the same
//! sentence: a rewrite under the selected grammar rule and a classification
//! of which catalog rules apply. Both run on their own scoped thread and the
//! submission joins them; the first failure to arrive is the one reported.
//! Blocking HTTP calls cannot be interrupted and the scope joins every thread,
//! so [`Orchestrator::process`] returns only after both calls have finished,
//! even when one failed early. The sibling's result is dropped.
use crate::catalog::{Catalog, GrammarRule};
use crate::completion::{CompletionBackend, CompletionError, StructuredClient};
use crate::shape::{
    ClassificationShape, GrammarClassification, TranslationResult, TranslationShape,
};
use serde::Serialize;
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

/// Joined view of one submission, as rendered to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubmissionState {
    pub timeless_sentence: String,
    pub applicable_grammars: Vec<String>,
}

impl SubmissionState {
    pub fn applies(&self, rule: &str) -> bool {
        self.applicable_grammars.iter().any(|name| name == rule)
    }
}

enum TaskOutcome {
    Rewrite(Result<TranslationResult, CompletionError>),
    Classify(Result<GrammarClassification, CompletionError>),
}

/// Runs rewrite and classification completions for a fixed catalog.
///
/// The classification schema is built from the catalog when the orchestrator
/// is constructed and stays fixed afterwards.
pub struct Orchestrator<'a, B> {
    client: StructuredClient<B>,
    catalog: &'a Catalog,
    selector_instruction: String,
    translation: TranslationShape,
    classification: ClassificationShape,
}

impl<'a, B: CompletionBackend> Orchestrator<'a, B> {
    pub fn new(
        client: StructuredClient<B>,
        catalog: &'a Catalog,
        selector_instruction: String,
    ) -> Self {
        Self {
            client,
            catalog,
            selector_instruction,
            translation: TranslationShape::new(),
            classification: ClassificationShape::from_catalog(catalog),
        }
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    #[cfg(test)]
    pub fn client(&self) -> &StructuredClient<B> {
        &self.client
    }

    /// Rewrite `sentence` under `rule` and classify it against the catalog.
    ///
    /// A blank sentence yields an empty state without contacting the backend.
    /// Every call is a fresh pair of round trips; model output may differ
    /// between identical submissions.
    pub fn process(
        &self,
        sentence: &str,
        rule: &GrammarRule,
    ) -> Result<SubmissionState, CompletionError> {
        if sentence.trim().is_empty() {
            tracing::debug!("blank sentence; skipping completions");
            return Ok(SubmissionState::default());
        }

        let start = Instant::now();
        let (translation, classification) = self.run_both(sentence, rule).inspect_err(|err| {
            tracing::warn!(grammar = %rule.name, error = %err, "submission failed");
        })?;
        let state = SubmissionState {
            timeless_sentence: translation.timeless_sentence,
            applicable_grammars: classification.applicable_grammars,
        };
        let elapsed_ms = start.elapsed().as_millis();
        tracing::info!(
            grammar = %rule.name,
            elapsed_ms,
            applicable = state.applicable_grammars.len(),
            "submission complete"
        );
        Ok(state)
    }

    fn run_both(
        &self,
        sentence: &str,
        rule: &GrammarRule,
    ) -> Result<(TranslationResult, GrammarClassification), CompletionError> {
        let (tx, rx) = mpsc::channel();
        thread::scope(|scope| {
            let rewrite_tx = tx.clone();
            scope.spawn(move || {
                let outcome = self
                    .client
                    .complete(&rule.prompt, sentence, &self.translation);
                // receiver is gone only if the other task already failed
                let _ = rewrite_tx.send(TaskOutcome::Rewrite(outcome));
            });
            scope.spawn(move || {
                let outcome = self.client.complete(
                    &self.selector_instruction,
                    sentence,
                    &self.classification,
                );
                let _ = tx.send(TaskOutcome::Classify(outcome));
            });
            join_outcomes(rx)
        })
    }
}

/// Collect both task outcomes, returning the first failure in arrival order.
fn join_outcomes(
    rx: mpsc::Receiver<TaskOutcome>,
) -> Result<(TranslationResult, GrammarClassification), CompletionError> {
    let mut translation = None;
    let mut classification = None;
    for outcome in rx.iter().take(2) {
        match outcome {
            TaskOutcome::Rewrite(result) => translation = Some(result?),
            TaskOutcome::Classify(result) => classification = Some(result?),
        }
    }
    match (translation, classification) {
        (Some(translation), Some(classification)) => Ok((translation, classification)),
        _ => Err(CompletionError::Backend(
            "completion worker exited without a result".to_string(),
        )),
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
