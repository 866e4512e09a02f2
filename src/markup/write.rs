use std::fmt;

use super::tree::{Element, Fragment, Node};

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.nodes.iter().try_for_each(|node| write_node(node, f))
    }
}

fn write_node(node: &Node, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match node {
        Node::Element(el) => write_element(el, f),
        Node::Text(raw) => f.write_str(raw),
        Node::CData(data) => write!(f, "<![CDATA[{data}]]>"),
        Node::Comment(comment) => write!(f, "<!--{comment}-->"),
        Node::DocType(doctype) => write!(f, "<!DOCTYPE {}>", doctype.trim()),
    }
}

fn write_element(el: &Element, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("<")?;
    match &el.raw_start {
        Some(raw) => f.write_str(raw)?,
        None => {
            f.write_str(&el.name)?;
            for attr in &el.attributes {
                // Single-quoted source values may hold a bare double quote.
                write!(f, " {}=\"{}\"", attr.name, attr.raw_value.replace('"', "&quot;"))?;
            }
        }
    }

    if el.self_closing && el.children.is_empty() {
        return f.write_str("/>");
    }

    f.write_str(">")?;
    el.children.iter().try_for_each(|child| write_node(child, f))?;
    write!(f, "</{}>", el.name)
}
