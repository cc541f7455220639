//! HTML output encoding: open/close tags, escaping, selection-aware
//! `option` rendering. The comment sentinel grammar comes from the trait's
//! provided methods.

use crate::escape::{escape_attr, escape_text};
use crate::node::{Element, Node};
use crate::resolver::is_void;
use serde_json::Value;
use stream::{Ambient, Encoder, ScopeId};

/// Encodes resolved [`Node`]s as HTML.
#[derive(Copy, Clone, Debug)]
pub struct HtmlEncoder {
    selection: ScopeId,
}

impl HtmlEncoder {
    pub(crate) fn new(selection: ScopeId) -> Self {
        Self { selection }
    }

    fn is_selected(&self, element: &Element, ambient: &Ambient<'_>) -> bool {
        let Some((_, value)) = element.attrs.iter().find(|(name, _)| name == "value") else {
            return false;
        };
        let selection = match ambient.get(self.selection) {
            Ok(selection) => selection,
            Err(error) => {
                log::warn!("encoder: selection scope is unreadable: {error}");
                return false;
            }
        };
        match selection {
            Value::String(selected) => selected == value,
            Value::Array(items) => items
                .iter()
                .any(|item| matches!(item, Value::String(selected) if selected == value)),
            _ => false,
        }
    }
}

impl Encoder<Node> for HtmlEncoder {
    fn open_markup(&self, element: &Node, ambient: &Ambient<'_>, is_root: bool) -> String {
        let Node::Element(element) = element else {
            log::warn!("encoder: open_markup called on a non-element node");
            return String::new();
        };
        let mut out = String::with_capacity(element.tag.len() + 2);
        if is_root && element.tag == "html" {
            out.push_str("<!DOCTYPE html>");
        }
        out.push('<');
        out.push_str(&element.tag);
        for (name, value) in &element.attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
        if element.tag == "option"
            && !element.attrs.iter().any(|(name, _)| name == "selected")
            && self.is_selected(element, ambient)
        {
            out.push_str(" selected=\"\"");
        }
        out.push('>');
        out
    }

    fn close_markup(&self, element: &Node) -> String {
        let Node::Element(element) = element else {
            return String::new();
        };
        if is_void(&element.tag) {
            String::new()
        } else {
            format!("</{}>", element.tag)
        }
    }

    fn escape_text(&self, text: &str) -> String {
        escape_text(text)
    }
}
