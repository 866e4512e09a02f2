//! Gravitate Health ePI vocabulary and bundle navigation.

pub mod path;

use serde_json::{json, Value};

use crate::pipeline::LensError;

pub const HTML_ELEMENT_LINK_URL: &str =
    "http://hl7.eu/fhir/ig/gravitate-health/StructureDefinition/HtmlElementLink";
pub const ADDITIONAL_INFORMATION_URL: &str =
    "http://hl7.eu/fhir/ig/gravitate-health/StructureDefinition/AdditionalInformation";

/// Coding that marks an HtmlElementLink as a plain-language target.
pub const TAGS_SYSTEM: &str = "http://hl7.eu/fhir/ig/gravitate-health/CodeSystem/tags";
pub const PLAIN_LANGUAGE_TAG_CODE: &str = "1";

pub const TYPE_OF_DATA_SYSTEM: &str =
    "http://hl7.eu/fhir/ig/gravitate-health/CodeSystem/type-of-data-cs";
pub const EPI_CATEGORY_SYSTEM: &str =
    "http://hl7.eu/fhir/ig/gravitate-health/CodeSystem/epicategory-cs";

pub const LENS_CLASS_PREFIX: &str = "plain-language-lens-";

/// Class token tying annotation `index` to its narrative element.
pub fn lens_class(index: usize) -> String {
    format!("{LENS_CLASS_PREFIX}{index}")
}

/// Path expression selecting the `elementClass` of every HtmlElementLink
/// tagged for plain-language simplification.
pub fn target_class_expression() -> String {
    format!(
        "Bundle.entry[0].resource.extension\
         .where(url='{HTML_ELEMENT_LINK_URL}')\
         .where(extension.valueCodeableReference.concept.coding.code='{PLAIN_LANGUAGE_TAG_CODE}' \
         and extension.valueCodeableReference.concept.coding.system='{TAGS_SYSTEM}')\
         .extension.where(url='elementClass').valueString"
    )
}

/// The composition: resource of the first bundle entry.
pub fn first_resource(bundle: &Value) -> Result<&Value, LensError> {
    bundle
        .pointer("/entry/0/resource")
        .filter(|r| r.is_object())
        .ok_or_else(|| LensError::MalformedDocument("bundle has no entry[0].resource".into()))
}

pub fn first_resource_mut(bundle: &mut Value) -> Result<&mut Value, LensError> {
    bundle
        .pointer_mut("/entry/0/resource")
        .filter(|r| r.is_object())
        .ok_or_else(|| LensError::MalformedDocument("bundle has no entry[0].resource".into()))
}

/// Subsections of the composition's first section, in document order.
pub fn narrative_sections(resource: &Value) -> Result<&[Value], LensError> {
    resource
        .pointer("/section/0/section")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| LensError::MalformedDocument("composition has no section[0].section".into()))
}

pub fn narrative_sections_mut(resource: &mut Value) -> Result<&mut Vec<Value>, LensError> {
    resource
        .pointer_mut("/section/0/section")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| LensError::MalformedDocument("composition has no section[0].section".into()))
}

/// The XHTML narrative of a subsection, if it has one.
pub fn section_div(section: &Value) -> Option<&str> {
    section.pointer("/text/div").and_then(Value::as_str)
}

/// AdditionalInformation extension carrying one simplified explanation.
pub fn additional_information(index: usize, explanation: &str) -> Value {
    json!({
        "extension": [
            {
                "url": "elementClass",
                "valueString": lens_class(index)
            },
            {
                "url": "type",
                "valueCodeableConcept": {
                    "coding": [
                        {
                            "system": TYPE_OF_DATA_SYSTEM,
                            "code": "TXT",
                            "display": "Text"
                        }
                    ]
                }
            },
            {
                "url": "concept",
                "valueString": explanation
            }
        ],
        "url": ADDITIONAL_INFORMATION_URL
    })
}

/// Category marking the ePI as focused (lens-processed).
pub fn focused_category() -> Value {
    json!({
        "coding": [
            {
                "system": EPI_CATEGORY_SYSTEM,
                "code": "F",
                "display": "Focused"
            }
        ]
    })
}
