use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::Value;

use super::extraction::extract_narrative;
use super::patient::extract_patient_context_on;
use super::reinjection::reinject_annotations;
use super::simplification::Simplifier;
use super::types::{PatientContext, SimplificationCapability, SimplificationResult};
use super::LensError;
use crate::config::DEFAULT_MODEL;

/// Everything one lens run produced.
#[derive(Debug, Clone, Serialize)]
pub struct LensRun {
    /// The annotated ePI.
    pub bundle: Value,
    pub target_class: String,
    pub patient: PatientContext,
    pub simplification: SimplificationResult,
}

/// Runs the plain-language lens for one ePI / IPS pair:
/// extract → patient context → simplify → reinject
pub struct PlainLanguageLens {
    simplifier: Simplifier,
    default_model: String,
}

impl PlainLanguageLens {
    pub fn new(backend: Box<dyn SimplificationCapability>) -> Self {
        Self {
            simplifier: Simplifier::new(backend),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Model selector used when a caller passes an empty one.
    pub fn with_default_model(mut self, model: &str) -> Self {
        self.default_model = model.to_string();
        self
    }

    /// Annotate `epi` for the patient described by `ips`.
    pub fn annotate(&self, epi: Value, ips: &Value, model: &str) -> Result<Value, LensError> {
        Ok(self.run(epi, ips, model)?.bundle)
    }

    pub fn run(&self, epi: Value, ips: &Value, model: &str) -> Result<LensRun, LensError> {
        self.run_on(epi, ips, model, Local::now().date_naive())
    }

    /// Same as [`run`](Self::run) with patient age computed as of `today`.
    pub fn run_on(
        &self,
        epi: Value,
        ips: &Value,
        model: &str,
        today: NaiveDate,
    ) -> Result<LensRun, LensError> {
        let model = if model.trim().is_empty() {
            self.default_model.as_str()
        } else {
            model
        };
        let _span = tracing::info_span!("annotate", model = %model).entered();

        let extraction = extract_narrative(&epi)?;
        let patient = extract_patient_context_on(ips, today)?;

        let simplification = self.simplifier.simplify(
            &extraction.language,
            &extraction.texts(),
            patient.age,
            &patient.diagnostics,
            model,
        )?;

        let bundle = reinject_annotations(
            epi,
            &extraction.items,
            &simplification.responses,
            &extraction.target_class,
        )?;

        Ok(LensRun {
            bundle,
            target_class: extraction.target_class,
            patient,
            simplification,
        })
    }
}
