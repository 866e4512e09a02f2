use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::tree::{Attribute, Element, Fragment, Node};
use super::MarkupError;

impl Fragment {
    /// Parse an XHTML narrative fragment.
    ///
    /// Several top-level nodes are allowed. Tags must balance; anything left
    /// open at the end of input is an error.
    pub fn parse(src: &str) -> Result<Self, MarkupError> {
        let mut reader = Reader::from_str(src);
        let mut stack: Vec<Element> = Vec::new();
        let mut roots: Vec<Node> = Vec::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| MarkupError::Syntax(e.to_string()))?;

            let node = match event {
                Event::Start(start) => {
                    stack.push(element_from_start(&start, false)?);
                    continue;
                }
                Event::Empty(start) => Node::Element(element_from_start(&start, true)?),
                Event::End(end) => {
                    let name = lossy(end.name().as_ref());
                    let Some(open) = stack.pop() else {
                        return Err(MarkupError::UnmatchedEnd(name));
                    };
                    if open.name != name {
                        return Err(MarkupError::MismatchedEnd {
                            expected: open.name,
                            found: name,
                        });
                    }
                    Node::Element(open)
                }
                Event::Text(text) => Node::Text(lossy(&text)),
                Event::CData(data) => Node::CData(lossy(&data)),
                Event::Comment(comment) => Node::Comment(lossy(&comment)),
                Event::DocType(doctype) => Node::DocType(lossy(&doctype)),
                Event::Decl(_) => return Err(MarkupError::Unsupported("XML declaration")),
                Event::PI(_) => return Err(MarkupError::Unsupported("processing instruction")),
                Event::Eof => break,
            };

            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => roots.push(node),
            }
        }

        if let Some(open) = stack.pop() {
            return Err(MarkupError::UnclosedElement(open.name));
        }

        Ok(Fragment { nodes: roots })
    }
}

fn element_from_start(start: &BytesStart<'_>, self_closing: bool) -> Result<Element, MarkupError> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| MarkupError::Attribute(e.to_string()))?;
        attributes.push(Attribute {
            name: lossy(attr.key.as_ref()),
            raw_value: lossy(&attr.value),
        });
    }

    Ok(Element {
        name: lossy(start.name().as_ref()),
        attributes,
        children: Vec::new(),
        self_closing,
        raw_start: Some(lossy(start)),
    })
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_structure() {
        let frag = Fragment::parse(r#"<div xmlns="http://www.w3.org/1999/xhtml"><p>a<b>b</b></p></div>"#)
            .unwrap();
        assert_eq!(frag.nodes.len(), 1);
        let div = frag.element(&[0]).unwrap();
        assert_eq!(div.name, "div");
        assert_eq!(div.attribute("xmlns").unwrap(), "http://www.w3.org/1999/xhtml");
        let p = frag.element(&[0, 0]).unwrap();
        assert_eq!(p.children.len(), 2);
        assert_eq!(p.text(), "ab");
    }

    #[test]
    fn multiple_top_level_nodes() {
        let frag = Fragment::parse("lead <p>one</p><p>two</p> tail").unwrap();
        assert_eq!(frag.nodes.len(), 4);
        assert!(matches!(frag.nodes[0], Node::Text(_)));
    }

    #[test]
    fn self_closing_elements() {
        let frag = Fragment::parse(r#"<div>line<br/>next</div>"#).unwrap();
        let br = frag.element(&[0, 1]).unwrap();
        assert!(br.self_closing);
        assert!(br.children.is_empty());
    }

    #[test]
    fn unclosed_element_rejected() {
        let err = Fragment::parse("<div><p>open</p>").unwrap_err();
        assert_eq!(err, MarkupError::UnclosedElement("div".into()));
    }

    #[test]
    fn mismatched_end_rejected() {
        assert!(Fragment::parse("<div><p>x</div></p>").is_err());
    }

    #[test]
    fn stray_end_rejected() {
        assert!(Fragment::parse("<p>x</p></div>").is_err());
    }

    #[test]
    fn duplicate_attribute_rejected() {
        assert!(Fragment::parse(r#"<p class="a" class="b">x</p>"#).is_err());
    }

    #[test]
    fn xml_declaration_rejected() {
        let err = Fragment::parse(r#"<?xml version="1.0"?><div/>"#).unwrap_err();
        assert_eq!(err, MarkupError::Unsupported("XML declaration"));
    }

    #[test]
    fn empty_input_is_empty_fragment() {
        assert!(Fragment::parse("").unwrap().nodes.is_empty());
    }
}
