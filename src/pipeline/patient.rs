use chrono::{Datelike, Local, NaiveDate};
use serde_json::Value;

use super::types::PatientContext;
use super::LensError;
use crate::fhir::path;

const PATIENT_QUERY: &str = "Bundle.entry.where(resource.resourceType='Patient').resource";
const CONDITION_QUERY: &str = "Bundle.entry.where(resource.resourceType='Condition').resource";
const MEDICATION_QUERY: &str = "Bundle.entry.where(resource.resourceType='Medication').resource";

/// Derive patient context from an IPS bundle, computing age as of today.
pub fn extract_patient_context(ips: &Value) -> Result<PatientContext, LensError> {
    extract_patient_context_on(ips, Local::now().date_naive())
}

/// Same as [`extract_patient_context`] with an explicit reference date.
pub fn extract_patient_context_on(ips: &Value, today: NaiveDate) -> Result<PatientContext, LensError> {
    let _span = tracing::info_span!("extract_patient_context").entered();

    let patients = path::evaluate(ips, PATIENT_QUERY)?;
    let patient = match patients.as_slice() {
        [] => return Err(LensError::PatientNotFound),
        [single] => single,
        _ => {
            return Err(LensError::AmbiguousPatient {
                count: patients.len(),
            })
        }
    };

    let gender = patient
        .get("gender")
        .and_then(Value::as_str)
        .map(str::to_string);

    let birth_raw = patient
        .get("birthDate")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let birth_date = NaiveDate::parse_from_str(birth_raw, "%Y-%m-%d")
        .map_err(|_| LensError::InvalidBirthDate(birth_raw.to_string()))?;
    if birth_date > today {
        return Err(LensError::InvalidBirthDate(birth_raw.to_string()));
    }

    let diagnostics = code_displays(ips, CONDITION_QUERY, "Condition")?;
    let medications = code_displays(ips, MEDICATION_QUERY, "Medication")?;

    tracing::info!(
        diagnostics = diagnostics.len(),
        medications = medications.len(),
        "Patient context derived"
    );

    Ok(PatientContext {
        gender,
        age: age_on(birth_date, today),
        diagnostics,
        medications,
    })
}

/// Whole years between `birth` and `today`; the birthday itself counts.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> u32 {
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

/// `code.coding[0].display` of every matching resource, in bundle order.
fn code_displays(ips: &Value, query: &str, kind: &str) -> Result<Vec<String>, LensError> {
    path::evaluate(ips, query)?
        .iter()
        .enumerate()
        .map(|(i, resource)| {
            resource
                .pointer("/code/coding/0/display")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| LensError::MissingField {
                    resource: format!("{kind} #{i}"),
                    field: "code.coding[0].display".into(),
                })
        })
        .collect()
}
