//! HTML node resolution: expansion of composites, providers and consumers,
//! tag validation, and form-control normalization.

use crate::encoder::HtmlEncoder;
use crate::node::{Attrs, Element, Node};
use serde_json::Value;
use stream::{Ambient, EngineError, Resolved, Resolver, ScopeId, SharedContext};

/// Build the resolver/encoder pair for one shared context. Registers the
/// selection scope both halves use for `select`/`option` coordination.
pub fn collaborators(context: &SharedContext) -> (HtmlResolver, HtmlEncoder) {
    let selection = context.register_scope(Value::Null);
    (HtmlResolver { selection }, HtmlEncoder::new(selection))
}

/// Resolves [`Node`]s for the serializer.
#[derive(Copy, Clone, Debug)]
pub struct HtmlResolver {
    selection: ScopeId,
}

impl Resolver<Node> for HtmlResolver {
    fn resolve(&self, node: Node, ambient: &Ambient<'_>) -> Result<Resolved<Node>, EngineError> {
        match node {
            Node::Text(text) => Ok(Resolved::Text(text)),
            Node::Empty => Ok(Resolved::Empty),
            Node::Element(element) => self.resolve_element(element),
            Node::Fragment(children) => Ok(Resolved::Children(children)),
            Node::Component { name, render } => match render(ambient) {
                Some(rendered) => Ok(Resolved::Children(vec![rendered])),
                None => Err(EngineError::Resolution(format!(
                    "component `{name}` produced no node"
                ))),
            },
            Node::Provider {
                scope,
                value,
                children,
            } => Ok(Resolved::Provider {
                scope,
                value,
                children,
            }),
            Node::Consumer { scope, render } => {
                let value = ambient.get(scope)?.clone();
                Ok(Resolved::Children(vec![render(&value)]))
            }
            Node::Boundary { children, fallback } => Ok(Resolved::Boundary { children, fallback }),
            Node::Pending(future) => Ok(Resolved::Pending(future)),
        }
    }
}

impl HtmlResolver {
    fn resolve_element(&self, mut element: Element) -> Result<Resolved<Node>, EngineError> {
        validate_tag(&element.tag)?;

        let mut ambient = None;
        match element.tag.as_str() {
            "input" => normalize_input(&mut element.attrs),
            "textarea" => normalize_textarea(&mut element)?,
            "select" => {
                // The selection travels as an ambient value so nested
                // `option`s can compare against it without threading it
                // through intermediate nodes.
                let value = take_attr(&mut element.attrs, "value")
                    .or_else(|| take_attr(&mut element.attrs, "defaultValue"));
                if let Some(value) = value {
                    ambient = Some((self.selection, Value::String(value)));
                }
            }
            _ => {}
        }

        let children = std::mem::take(&mut element.children);
        if is_void(&element.tag) && !children.is_empty() {
            return Err(EngineError::Resolution(format!(
                "void element `{}` must not have children",
                element.tag
            )));
        }

        Ok(Resolved::Markup {
            element: Node::Element(element),
            children,
            ambient,
        })
    }
}

fn validate_tag(tag: &str) -> Result<(), EngineError> {
    let mut chars = tag.chars();
    let valid = chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(EngineError::Resolution(format!(
            "`{tag}` is not a valid element name"
        )))
    }
}

/// Elements with no closing tag.
pub(crate) fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

/// `defaultValue`/`defaultChecked` collapse into `value`/`checked` unless
/// the controlled form is already present.
fn normalize_input(attrs: &mut Attrs) {
    collapse_default(attrs, "defaultValue", "value");
    collapse_default(attrs, "defaultChecked", "checked");
}

fn collapse_default(attrs: &mut Attrs, default_name: &str, name: &str) {
    let Some(default) = take_attr(attrs, default_name) else {
        return;
    };
    if !has_attr(attrs, name) {
        attrs.push((name.to_owned(), default));
    }
}

/// A textarea's value becomes its sole text child.
fn normalize_textarea(element: &mut Element) -> Result<(), EngineError> {
    let value = take_attr(&mut element.attrs, "value")
        .or_else(|| take_attr(&mut element.attrs, "defaultValue"));
    let Some(value) = value else {
        return Ok(());
    };
    if !element.children.is_empty() {
        return Err(EngineError::Resolution(
            "textarea carries both a value and children".to_owned(),
        ));
    }
    element.children.push(Node::Text(value));
    Ok(())
}

fn take_attr(attrs: &mut Attrs, name: &str) -> Option<String> {
    let index = attrs.iter().position(|(attr, _)| attr == name)?;
    Some(attrs.remove(index).1)
}

fn has_attr(attrs: &Attrs, name: &str) -> bool {
    attrs.iter().any(|(attr, _)| attr == name)
}
