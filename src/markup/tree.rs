use std::borrow::Cow;

/// Child-index path from the fragment root to a node.
///
/// `[2, 0]` is the first child of the third top-level node.
pub type NodePath = Vec<usize>;

/// A parsed narrative fragment: the top-level nodes in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Character data exactly as written (entities still escaped).
    Text(String),
    CData(String),
    Comment(String),
    DocType(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    /// Written as `<name/>` in the source.
    pub self_closing: bool,
    /// Start tag content between `<` and `>` as read; dropped once the
    /// attributes are edited.
    pub(crate) raw_start: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// Value as written, without quotes (entities still escaped).
    pub raw_value: String,
}

impl Attribute {
    pub fn value(&self) -> Cow<'_, str> {
        unescape_lenient(&self.raw_value)
    }
}

impl Fragment {
    /// Pre-order depth-first search for the first element whose class list
    /// contains `token`. Siblings are visited in source order and an element
    /// is tested before its descendants. An empty token matches nothing.
    pub fn find_first_by_class(&self, token: &str) -> Option<NodePath> {
        if token.trim().is_empty() {
            return None;
        }
        let mut path = Vec::new();
        if find_in(&self.nodes, token, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    pub fn element(&self, path: &[usize]) -> Option<&Element> {
        let (first, rest) = path.split_first()?;
        let mut current = match self.nodes.get(*first)? {
            Node::Element(el) => el,
            _ => return None,
        };
        for idx in rest {
            current = match current.children.get(*idx)? {
                Node::Element(el) => el,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn element_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let (first, rest) = path.split_first()?;
        let mut current = match self.nodes.get_mut(*first)? {
            Node::Element(el) => el,
            _ => return None,
        };
        for idx in rest {
            current = match current.children.get_mut(*idx)? {
                Node::Element(el) => el,
                _ => return None,
            };
        }
        Some(current)
    }
}

fn find_in(nodes: &[Node], token: &str, path: &mut NodePath) -> bool {
    for (idx, node) in nodes.iter().enumerate() {
        let Node::Element(el) = node else {
            continue;
        };
        path.push(idx);
        if el.has_class(token) || find_in(&el.children, token, path) {
            return true;
        }
        path.pop();
    }
    false
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<Cow<'_, str>> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(Attribute::value)
    }

    /// Class tokens in attribute order.
    pub fn classes(&self) -> Vec<String> {
        self.attribute("class")
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, token: &str) -> bool {
        self.attribute("class")
            .is_some_and(|v| v.split_whitespace().any(|c| c == token))
    }

    /// Add `token` to the end of the class list, creating the attribute if
    /// needed. Existing tokens are kept. Returns false if already present.
    pub fn append_class(&mut self, token: &str) -> bool {
        if self.has_class(token) {
            return false;
        }
        let escaped = quick_xml::escape::escape(token).into_owned();
        match self.attributes.iter_mut().find(|a| a.name == "class") {
            Some(attr) => {
                let existing = attr.raw_value.trim_end();
                attr.raw_value = if existing.is_empty() {
                    escaped
                } else {
                    format!("{existing} {escaped}")
                };
            }
            None => self.attributes.push(Attribute {
                name: "class".to_string(),
                raw_value: escaped,
            }),
        }
        self.raw_start = None;
        true
    }

    /// Rendered text: all descendant text and CDATA, unescaped, in order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(raw) => out.push_str(&unescape_lenient(raw)),
            Node::CData(data) => out.push_str(data),
            Node::Element(el) => collect_text(&el.children, out),
            Node::Comment(_) | Node::DocType(_) => {}
        }
    }
}

/// Unescape XML entities plus the HTML named entities that show up in
/// product information narratives. Unknown entities leave the text as written.
pub fn unescape_lenient(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let semi = tail[1..]
            .find(|c: char| c == ';' || c == '&' || c.is_whitespace())
            .map(|i| i + 1)
            .filter(|&i| tail.as_bytes()[i] == b';');
        match semi {
            Some(semi) => {
                // Each reference is decoded on its own so one miss stays local.
                let reference = &tail[..=semi];
                match quick_xml::escape::unescape_with(reference, resolve_entity) {
                    Ok(decoded) => out.push_str(&decoded),
                    Err(_) => out.push_str(reference),
                }
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn resolve_entity(name: &str) -> Option<&'static str> {
    let value = match name {
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "apos" => "'",
        "quot" => "\"",
        "nbsp" => "\u{a0}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "hellip" => "\u{2026}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "deg" => "\u{b0}",
        "micro" => "\u{b5}",
        "middot" => "\u{b7}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        "iexcl" => "\u{a1}",
        "iquest" => "\u{bf}",
        "aacute" => "\u{e1}",
        "eacute" => "\u{e9}",
        "iacute" => "\u{ed}",
        "oacute" => "\u{f3}",
        "uacute" => "\u{fa}",
        "ntilde" => "\u{f1}",
        "Ntilde" => "\u{d1}",
        "auml" => "\u{e4}",
        "ouml" => "\u{f6}",
        "uuml" => "\u{fc}",
        "Auml" => "\u{c4}",
        "Ouml" => "\u{d6}",
        "Uuml" => "\u{dc}",
        "szlig" => "\u{df}",
        "plusmn" => "\u{b1}",
        "le" => "\u{2264}",
        "ge" => "\u{2265}",
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Fragment {
        Fragment::parse(src).unwrap()
    }

    #[test]
    fn finds_first_match_in_document_order() {
        let frag = parse(
            r#"<div><p class="a">one</p><p class="target">two</p><p class="target">three</p></div>"#,
        );
        let path = frag.find_first_by_class("target").unwrap();
        assert_eq!(path, vec![0, 1]);
        assert_eq!(frag.element(&path).unwrap().text(), "two");
    }

    #[test]
    fn parent_matches_before_descendants() {
        let frag = parse(r#"<div class="x"><span class="x">inner</span></div>"#);
        assert_eq!(frag.find_first_by_class("x").unwrap(), vec![0]);
    }

    #[test]
    fn depth_first_before_later_siblings() {
        let frag = parse(
            r#"<div><ul><li><b class="t">deep</b></li></ul><p class="t">shallow</p></div>"#,
        );
        let path = frag.find_first_by_class("t").unwrap();
        assert_eq!(frag.element(&path).unwrap().text(), "deep");
    }

    #[test]
    fn class_token_match_is_exact() {
        let frag = parse(r#"<div><p class="drugInteractionX">no</p></div>"#);
        assert!(frag.find_first_by_class("drugInteraction").is_none());
    }

    #[test]
    fn multi_token_class_attribute() {
        let frag = parse(r#"<div><p class="  bold   drugInteraction ">yes</p></div>"#);
        let path = frag.find_first_by_class("drugInteraction").unwrap();
        assert_eq!(
            frag.element(&path).unwrap().classes(),
            vec!["bold", "drugInteraction"]
        );
    }

    #[test]
    fn empty_token_never_matches() {
        let frag = parse(r#"<div class=""><p class="a">x</p></div>"#);
        assert!(frag.find_first_by_class("").is_none());
        assert!(frag.find_first_by_class("  ").is_none());
    }

    #[test]
    fn text_concatenates_descendants_and_unescapes() {
        let frag = parse(
            r#"<div><p class="t">Take <b>with</b> food &amp; water&nbsp;<![CDATA[<daily>]]></p></div>"#,
        );
        let path = frag.find_first_by_class("t").unwrap();
        assert_eq!(
            frag.element(&path).unwrap().text(),
            "Take with food & water\u{a0}<daily>"
        );
    }

    #[test]
    fn unknown_entity_left_as_written() {
        assert_eq!(unescape_lenient("a &bogus; b"), "a &bogus; b");
        assert_eq!(unescape_lenient("&#65;&lt;"), "A<");
    }

    #[test]
    fn unknown_entity_does_not_block_known_ones() {
        assert_eq!(
            unescape_lenient("A &amp; B &notanentity; C &lt; D&#x41;"),
            "A & B &notanentity; C < DA"
        );
    }

    #[test]
    fn bare_ampersands_kept() {
        assert_eq!(unescape_lenient("salt & pepper &amp more;"), "salt & pepper &amp more;");
        assert_eq!(unescape_lenient("trailing &"), "trailing &");
        assert_eq!(unescape_lenient("&; x"), "&; x");
    }

    #[test]
    fn text_decodes_mixed_entities_in_one_node() {
        let frag = parse(
            r#"<div><p class="t">Take with food &amp; water&rsquo;s fine, no m&aacute;s &zwsp; caf&eacute;</p></div>"#,
        );
        assert_eq!(
            frag.element(&[0, 0]).unwrap().text(),
            "Take with food & water\u{2019}s fine, no m\u{e1}s &zwsp; caf\u{e9}"
        );
    }

    #[test]
    fn append_class_extends_existing_list() {
        let mut frag = parse(r#"<div><p class="bold t">x</p></div>"#);
        let path = frag.find_first_by_class("t").unwrap();
        let el = frag.element_mut(&path).unwrap();
        assert!(el.append_class("plain-language-lens-0"));
        assert_eq!(el.classes(), vec!["bold", "t", "plain-language-lens-0"]);
    }

    #[test]
    fn append_class_is_not_duplicated() {
        let mut frag = parse(r#"<div><p class="t">x</p></div>"#);
        let el = frag.element_mut(&[0, 0]).unwrap();
        assert!(el.append_class("extra"));
        assert!(!el.append_class("extra"));
        assert_eq!(el.classes(), vec!["t", "extra"]);
    }

    #[test]
    fn append_class_creates_attribute() {
        let mut frag = parse(r#"<div><p id="p1">x</p></div>"#);
        let el = frag.element_mut(&[0, 0]).unwrap();
        el.append_class("new");
        assert_eq!(el.attribute("class").unwrap(), "new");
        assert_eq!(el.attribute("id").unwrap(), "p1");
    }

    #[test]
    fn element_path_through_text_is_none() {
        let frag = parse(r#"<div>text<p>x</p></div>"#);
        assert!(frag.element(&[0, 0]).is_none());
        assert!(frag.element(&[0, 1]).is_some());
        assert!(frag.element(&[]).is_none());
        assert!(frag.element(&[5]).is_none());
    }
}
