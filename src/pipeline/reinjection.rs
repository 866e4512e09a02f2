use std::collections::BTreeMap;

use serde_json::Value;

use super::types::ExtractionItem;
use super::LensError;
use crate::fhir;
use crate::markup::Fragment;

/// Attach simplified explanations to the ePI.
///
/// Response `i` becomes AdditionalInformation extension `i` and the element
/// item `i` was read from gains class `plain-language-lens-<i>`. Elements are
/// located through the anchors captured at extraction, not by a new search,
/// so extension and class numbering cannot drift apart. The composition's
/// category is set to Focused.
pub fn reinject_annotations(
    mut bundle: Value,
    items: &[ExtractionItem],
    responses: &[String],
    target_class: &str,
) -> Result<Value, LensError> {
    let _span = tracing::info_span!("reinject_annotations", items = items.len()).entered();

    if items.len() != responses.len() {
        return Err(LensError::CardinalityMismatch {
            expected: items.len(),
            actual: responses.len(),
        });
    }

    let resource = fhir::first_resource_mut(&mut bundle)?;

    tag_elements(resource, items, target_class)?;

    let extensions = extension_list(resource)?;
    extensions.extend(
        responses
            .iter()
            .enumerate()
            .map(|(i, response)| fhir::additional_information(i, response)),
    );

    resource["category"] = Value::Array(vec![fhir::focused_category()]);

    tracing::info!(annotations = responses.len(), "Annotations reinjected");
    Ok(bundle)
}

fn tag_elements(
    resource: &mut Value,
    items: &[ExtractionItem],
    target_class: &str,
) -> Result<(), LensError> {
    let mut by_section: BTreeMap<usize, Vec<(usize, &ExtractionItem)>> = BTreeMap::new();
    for (index, item) in items.iter().enumerate() {
        by_section.entry(item.anchor.section).or_default().push((index, item));
    }
    if by_section.is_empty() {
        return Ok(());
    }

    let sections = fhir::narrative_sections_mut(resource)?;

    for (section, anchored) in by_section {
        let mismatch = || LensError::AnchorMismatch {
            index: anchored[0].0,
            section,
        };

        let div = sections
            .get(section)
            .and_then(fhir::section_div)
            .ok_or_else(mismatch)?;
        let mut fragment =
            Fragment::parse(div).map_err(|source| LensError::MarkupParse { section, source })?;

        for (index, item) in &anchored {
            let Some(element) = fragment
                .element_mut(&item.anchor.path)
                .filter(|el| el.has_class(target_class))
            else {
                tracing::warn!(index = *index, section, "Anchor no longer points at a target element");
                return Err(LensError::AnchorMismatch {
                    index: *index,
                    section,
                });
            };
            if !element.append_class(&fhir::lens_class(*index)) {
                tracing::debug!(index = *index, section, "Element already carries its lens class");
            }
        }

        sections[section]["text"]["div"] = Value::String(fragment.to_string());
    }

    Ok(())
}

/// The composition's extension array, created if absent.
fn extension_list(resource: &mut Value) -> Result<&mut Vec<Value>, LensError> {
    let object = resource
        .as_object_mut()
        .ok_or_else(|| LensError::MalformedDocument("composition is not an object".into()))?;
    object
        .entry("extension")
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| LensError::MalformedDocument("composition extension is not an array".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::tests::{epi_bundle, html_element_link};
    use crate::pipeline::extraction::extract_narrative;
    use crate::pipeline::types::ElementAnchor;
    use serde_json::json;

    fn div_of(bundle: &Value, section: usize) -> &str {
        bundle["entry"][0]["resource"]["section"][0]["section"][section]["text"]["div"]
            .as_str()
            .unwrap()
    }

    fn responses(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn extensions_and_classes_share_numbering() {
        let bundle = epi_bundle(
            vec![html_element_link("t", "1")],
            &[
                r#"<div><p class="t">A</p></div>"#,
                r#"<div><p>none</p></div>"#,
                r#"<div><span class="t">B</span></div>"#,
            ],
        );
        let extraction = extract_narrative(&bundle).unwrap();
        let out = reinject_annotations(
            bundle,
            &extraction.items,
            &responses(&["simple A", "simple B"]),
            &extraction.target_class,
        )
        .unwrap();

        let extensions = out["entry"][0]["resource"]["extension"].as_array().unwrap();
        assert_eq!(extensions.len(), 3);
        assert_eq!(extensions[1]["extension"][0]["valueString"], "plain-language-lens-0");
        assert_eq!(extensions[1]["extension"][2]["valueString"], "simple A");
        assert_eq!(extensions[2]["extension"][0]["valueString"], "plain-language-lens-1");
        assert_eq!(extensions[2]["extension"][2]["valueString"], "simple B");

        assert_eq!(div_of(&out, 0), r#"<div><p class="t plain-language-lens-0">A</p></div>"#);
        assert_eq!(div_of(&out, 1), r#"<div><p>none</p></div>"#);
        assert_eq!(div_of(&out, 2), r#"<div><span class="t plain-language-lens-1">B</span></div>"#);
    }

    #[test]
    fn category_set_to_focused() {
        let bundle = epi_bundle(vec![], &[]);
        let out = reinject_annotations(bundle, &[], &[], "").unwrap();
        let category = out["entry"][0]["resource"]["category"].as_array().unwrap();
        assert_eq!(category.len(), 1);
        assert_eq!(category[0]["coding"][0]["code"], "F");
        assert_eq!(category[0]["coding"][0]["display"], "Focused");
    }

    #[test]
    fn no_items_changes_only_category() {
        let bundle = epi_bundle(
            vec![html_element_link("t", "1")],
            &[r#"<div><p class='x'>untouched</p></div>"#],
        );
        let mut expected = bundle.clone();
        expected["entry"][0]["resource"]["category"] = json!([fhir::focused_category()]);
        let out = reinject_annotations(bundle, &[], &[], "t").unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn missing_extension_array_created() {
        let mut bundle = epi_bundle(vec![], &[r#"<div><p class="t">A</p></div>"#]);
        bundle["entry"][0]["resource"]
            .as_object_mut()
            .unwrap()
            .remove("extension");
        let items = vec![ExtractionItem {
            text: "A".into(),
            anchor: ElementAnchor { section: 0, path: vec![0, 0] },
        }];
        let out = reinject_annotations(bundle, &items, &responses(&["a"]), "t").unwrap();
        assert_eq!(out["entry"][0]["resource"]["extension"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn count_mismatch_rejected() {
        let bundle = epi_bundle(vec![], &[r#"<div><p class="t">A</p></div>"#]);
        let items = vec![ExtractionItem {
            text: "A".into(),
            anchor: ElementAnchor { section: 0, path: vec![0, 0] },
        }];
        let err = reinject_annotations(bundle, &items, &[], "t").unwrap_err();
        assert!(matches!(err, LensError::CardinalityMismatch { expected: 1, actual: 0 }));
    }

    #[test]
    fn reapplying_does_not_duplicate_class_token() {
        let bundle = epi_bundle(
            vec![html_element_link("t", "1")],
            &[r#"<div><p class="t">A</p></div>"#],
        );
        let extraction = extract_narrative(&bundle).unwrap();
        let once = reinject_annotations(
            bundle,
            &extraction.items,
            &responses(&["a"]),
            &extraction.target_class,
        )
        .unwrap();

        let again = extract_narrative(&once).unwrap();
        assert_eq!(again.items, extraction.items);
        let twice = reinject_annotations(
            once,
            &again.items,
            &responses(&["a"]),
            &again.target_class,
        )
        .unwrap();

        assert_eq!(div_of(&twice, 0), r#"<div><p class="t plain-language-lens-0">A</p></div>"#);
        let extensions = twice["entry"][0]["resource"]["extension"].as_array().unwrap();
        assert_eq!(extensions.len(), 3);
    }

    #[test]
    fn stale_anchor_rejected() {
        let bundle = epi_bundle(vec![], &[r#"<div><p class="other">A</p></div>"#]);
        let items = vec![ExtractionItem {
            text: "A".into(),
            anchor: ElementAnchor { section: 0, path: vec![0, 0] },
        }];
        let err = reinject_annotations(bundle, &items, &responses(&["a"]), "t").unwrap_err();
        assert!(matches!(err, LensError::AnchorMismatch { index: 0, section: 0 }));
    }

    #[test]
    fn anchor_to_missing_section_rejected() {
        let bundle = epi_bundle(vec![], &[r#"<div><p class="t">A</p></div>"#]);
        let items = vec![ExtractionItem {
            text: "A".into(),
            anchor: ElementAnchor { section: 4, path: vec![0, 0] },
        }];
        let err = reinject_annotations(bundle, &items, &responses(&["a"]), "t").unwrap_err();
        assert!(matches!(err, LensError::AnchorMismatch { section: 4, .. }));
    }
}
