use chrono::Utc;

use super::prompt::{
    build_simplification_prompt, build_system_instruction, check_items_delimiter_free,
    language_name, split_response,
};
use super::types::{SimplificationCapability, SimplificationResult};
use super::LensError;

/// Sends extraction items to the simplification backend and validates that
/// every item comes back exactly once, in order.
pub struct Simplifier {
    backend: Box<dyn SimplificationCapability>,
}

impl Simplifier {
    pub fn new(backend: Box<dyn SimplificationCapability>) -> Self {
        Self { backend }
    }

    /// Rewrite `items` in plain language for a reader of `age`.
    ///
    /// Language and model are validated even when there is nothing to send.
    /// With no items the backend is not called and the result is empty.
    pub fn simplify(
        &self,
        language: &str,
        items: &[&str],
        age: u32,
        diagnostics: &[String],
        model_selector: &str,
    ) -> Result<SimplificationResult, LensError> {
        let language = language_name(language)?;
        let model = self.backend.resolve_model(model_selector)?;

        let _span = tracing::info_span!("simplify", model = %model, items = items.len()).entered();

        if items.is_empty() {
            tracing::info!("No narrative to simplify, skipping model call");
            return Ok(SimplificationResult {
                responses: Vec::new(),
                prompt: String::new(),
                timestamp: Utc::now(),
                model,
            });
        }

        check_items_delimiter_free(items)?;

        let system_instruction = build_system_instruction(language);
        let prompt = build_simplification_prompt(items, age, diagnostics);

        let raw = self.backend.simplify(&system_instruction, &prompt, &model)?;
        let responses = split_response(&raw);

        if responses.len() != items.len() {
            tracing::warn!(
                expected = items.len(),
                actual = responses.len(),
                "Simplification response count does not match input"
            );
            return Err(LensError::CardinalityMismatch {
                expected: items.len(),
                actual: responses.len(),
            });
        }

        tracing::info!(responses = responses.len(), "Simplification complete");

        Ok(SimplificationResult {
            responses,
            prompt,
            timestamp: Utc::now(),
            model,
        })
    }
}
