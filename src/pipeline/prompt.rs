//! Prompt construction and response splitting for plain-language rewriting.
//!
//! Items travel to the model as one `|`-delimited line and must come back in
//! the same order and count, using the same delimiter.

use super::LensError;

/// Separator between items in both prompt and response.
pub const DELIMITER: char = '|';

/// ePI language codes the lens can answer in.
pub const LANGUAGES: &[(&str, &str)] = &[
    ("es", "Spanish"),
    ("en", "English"),
    ("de", "German"),
    ("fr", "French"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("nl", "Dutch"),
    ("pl", "Polish"),
    ("ru", "Russian"),
    ("tr", "Turkish"),
    ("ar", "Arabic"),
    ("zh", "Chinese"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("vi", "Vietnamese"),
    ("th", "Thai"),
    ("el", "Greek"),
    ("cs", "Czech"),
    ("hu", "Hungarian"),
    ("ro", "Romanian"),
    ("sv", "Swedish"),
    ("fi", "Finnish"),
    ("da", "Danish"),
    ("no", "Norwegian"),
    ("is", "Icelandic"),
    ("et", "Estonian"),
    ("lv", "Latvian"),
    ("lt", "Lithuanian"),
    ("mt", "Maltese"),
    ("hr", "Croatian"),
    ("sk", "Slovak"),
    ("sl", "Slovenian"),
    ("bg", "Bulgarian"),
    ("cy", "Welsh"),
    ("ga", "Irish"),
    ("gd", "Gaelic"),
    ("eu", "Basque"),
    ("ca", "Catalan"),
    ("gl", "Galician"),
];

/// Display name for a two-letter language code.
pub fn language_name(code: &str) -> Result<&'static str, LensError> {
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .ok_or_else(|| LensError::UnrecognizedLanguage(code.to_string()))
}

/// System instruction: delimiter discipline and answer language.
pub fn build_system_instruction(language_name: &str) -> String {
    format!(
        "You are an AI assistant specialized in simplifying technical health information \
for different age groups. Your task is to read complex medical sentences separated by a \
delimiter and rewrite them in simple language appropriate for the specified age. Each piece \
of information is separated by a '{DELIMITER}' character. Maintain the structure and format \
in your response, ensuring each simplified sentence is also separated by '{DELIMITER}'.\n\
You must follow these indications extremely strictly:\n\
1. You must answer in {language_name}.\n\
2. Return exactly as many pieces as you were given, in the same order.\n"
    )
}

/// User prompt carrying the delimited items, reader age and diagnoses.
pub fn build_simplification_prompt(items: &[&str], age: u32, diagnostics: &[String]) -> String {
    let separator = DELIMITER.to_string();
    let piped = items.join(separator.as_str());
    let diagnostics_text = describe_diagnostics(diagnostics);
    format!(
        "Please simplify the following technical health information into plain language \
suitable for a {age}-year-old {diagnostics_text}. Each piece of information is separated \
by '{DELIMITER}'. Provide the simplified explanation for each piece of information in the same \
order, using the same delimiter '{DELIMITER}'. Ensure the explanations are clear, concise, and \
easy to understand.\n\nOriginal: {piped}\nAnswer:"
    )
}

fn describe_diagnostics(diagnostics: &[String]) -> String {
    if diagnostics.is_empty() {
        "without any diagnostics".to_string()
    } else {
        format!("with the following diagnostics: {}", diagnostics.join(", "))
    }
}

/// Reject items that would be split apart by the delimiter.
pub fn check_items_delimiter_free(items: &[&str]) -> Result<(), LensError> {
    match items.iter().position(|item| item.contains(DELIMITER)) {
        Some(index) => Err(LensError::DelimiterInItem {
            index,
            delimiter: DELIMITER,
        }),
        None => Ok(()),
    }
}

/// Split a model answer into trimmed, non-empty segments.
pub fn split_response(response: &str) -> Vec<String> {
    response
        .split(DELIMITER)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanish_resolves() {
        assert_eq!(language_name("es").unwrap(), "Spanish");
    }

    #[test]
    fn unlisted_code_rejected() {
        let err = language_name("xx").unwrap_err();
        assert!(matches!(err, LensError::UnrecognizedLanguage(code) if code == "xx"));
    }

    #[test]
    fn table_codes_unique() {
        let mut codes: Vec<&str> = LANGUAGES.iter().map(|(c, _)| *c).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), LANGUAGES.len());
        assert!(codes.iter().all(|c| c.len() == 2));
    }

    #[test]
    fn prompt_joins_items_with_delimiter() {
        let prompt = build_simplification_prompt(&["Take with food", "Avoid alcohol"], 8, &[]);
        assert!(prompt.contains("Original: Take with food|Avoid alcohol\nAnswer:"));
        assert!(prompt.contains("suitable for a 8-year-old without any diagnostics"));
    }

    #[test]
    fn prompt_lists_diagnostics() {
        let prompt =
            build_simplification_prompt(&["x"], 40, &["Asthma".to_string(), "Eczema".to_string()]);
        assert!(prompt.contains("with the following diagnostics: Asthma, Eczema"));
    }

    #[test]
    fn system_instruction_names_language() {
        let system = build_system_instruction("German");
        assert!(system.contains("You must answer in German."));
        assert!(system.contains("'|'"));
    }

    #[test]
    fn split_trims_and_drops_empty_segments() {
        assert_eq!(
            split_response("  One. | Two.|\n|Three.|  "),
            vec!["One.", "Two.", "Three."]
        );
        assert_eq!(split_response("Take this medicine with a meal.|"), vec![
            "Take this medicine with a meal."
        ]);
        assert!(split_response(" | |").is_empty());
    }

    #[test]
    fn delimiter_inside_item_rejected() {
        let err = check_items_delimiter_free(&["fine", "a|b"]).unwrap_err();
        assert!(matches!(err, LensError::DelimiterInItem { index: 1, .. }));
        assert!(check_items_delimiter_free(&["fine", "also fine"]).is_ok());
    }
}
