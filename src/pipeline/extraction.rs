use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::types::{ElementAnchor, ExtractionItem, NarrativeExtraction};
use super::LensError;
use crate::fhir::{self, path::PathExpression};
use crate::markup::Fragment;

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Collect the narrative fragments tagged for simplification.
///
/// Read-only. Subsections are visited in document order and each contributes
/// at most one item: its first element carrying the target class.
pub fn extract_narrative(bundle: &Value) -> Result<NarrativeExtraction, LensError> {
    let _span = tracing::info_span!("extract_narrative").entered();

    let target_class = discover_target_class(bundle)?;
    let language = document_language(bundle)?;

    let resource = fhir::first_resource(bundle)?;
    let sections = fhir::narrative_sections(resource)?;

    let mut items = Vec::new();
    for (section, subsection) in sections.iter().enumerate() {
        let Some(div) = fhir::section_div(subsection) else {
            tracing::debug!(section, "Subsection has no narrative, skipping");
            continue;
        };

        let fragment =
            Fragment::parse(div).map_err(|source| LensError::MarkupParse { section, source })?;

        if let Some(path) = fragment.find_first_by_class(&target_class) {
            // find_first_by_class only returns paths to elements
            let Some(element) = fragment.element(&path) else {
                continue;
            };
            items.push(ExtractionItem {
                text: normalize_whitespace(&element.text()),
                anchor: ElementAnchor { section, path },
            });
        }
    }

    tracing::info!(
        target_class = %target_class,
        language = %language,
        sections = sections.len(),
        items = items.len(),
        "Narrative extraction complete"
    );

    Ok(NarrativeExtraction {
        language,
        items,
        target_class,
    })
}

/// Class token of the element(s) tagged for plain-language simplification.
///
/// Empty when the document carries no such tag.
pub fn discover_target_class(bundle: &Value) -> Result<String, LensError> {
    let expression = PathExpression::parse(&fhir::target_class_expression())?;
    let matches: Vec<String> = expression
        .evaluate(bundle)
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();

    if matches.len() > 1 {
        tracing::warn!(
            count = matches.len(),
            used = %matches[0],
            "Several plain-language target classes found, using the first"
        );
    }

    Ok(matches.into_iter().next().unwrap_or_default())
}

/// Bundle language, falling back to the composition's.
fn document_language(bundle: &Value) -> Result<String, LensError> {
    bundle
        .get("language")
        .and_then(Value::as_str)
        .or_else(|| bundle.pointer("/entry/0/resource/language").and_then(Value::as_str))
        .map(str::to_string)
        .ok_or_else(|| LensError::MalformedDocument("document has no language".into()))
}

fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text.trim(), " ").into_owned()
}
