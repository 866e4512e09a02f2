use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::LensError;
use crate::markup::NodePath;

/// Where an extracted fragment came from: subsection index and element path
/// inside that subsection's narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementAnchor {
    pub section: usize,
    pub path: NodePath,
}

/// One narrative fragment queued for simplification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionItem {
    pub text: String,
    pub anchor: ElementAnchor,
}

/// Output of the narrative extraction stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeExtraction {
    /// Two-letter language code of the ePI.
    pub language: String,
    /// Items in document order; the index is the annotation number.
    pub items: Vec<ExtractionItem>,
    /// Empty when the document tags no element for simplification.
    pub target_class: String,
}

impl NarrativeExtraction {
    pub fn texts(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.text.as_str()).collect()
    }
}

/// Demographic and clinical context from the patient summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientContext {
    pub gender: Option<String>,
    /// Whole years.
    pub age: u32,
    pub diagnostics: Vec<String>,
    pub medications: Vec<String>,
}

/// Simplified explanations, one per extraction item, in item order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplificationResult {
    pub responses: Vec<String>,
    /// Empty when nothing was sent to the model.
    pub prompt: String,
    pub timestamp: DateTime<Utc>,
    pub model: String,
}

/// A text-completion backend able to rewrite clinical text.
///
/// One implementation per backend; the pipeline holds exactly one.
pub trait SimplificationCapability: Send + Sync {
    /// Map a caller-supplied selector to the backend's model identifier.
    fn resolve_model(&self, selector: &str) -> Result<String, LensError>;

    /// Single blocking completion call.
    fn simplify(
        &self,
        system_instruction: &str,
        prompt: &str,
        model: &str,
    ) -> Result<String, LensError>;
}

impl<T: SimplificationCapability + ?Sized> SimplificationCapability for std::sync::Arc<T> {
    fn resolve_model(&self, selector: &str) -> Result<String, LensError> {
        (**self).resolve_model(selector)
    }

    fn simplify(
        &self,
        system_instruction: &str,
        prompt: &str,
        model: &str,
    ) -> Result<String, LensError> {
        (**self).simplify(system_instruction, prompt, model)
    }
}
