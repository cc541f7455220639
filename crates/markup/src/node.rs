//! The HTML node tree fed to the serializer.
//!
//! Nodes own their children; resolution consumes a node and hands the
//! engine whatever it expands into. Render callbacks are `Arc`ed so a tree
//! description can share component definitions.

use serde_json::Value;
use smallvec::SmallVec;
use std::sync::Arc;
use stream::{Ambient, NodeFuture, ScopeId};

/// Attribute list. Most elements carry only a handful, so the first few
/// pairs live inline.
pub type Attrs = SmallVec<[(String, String); 4]>;

/// A primitive element: tag name, attributes, child nodes.
pub struct Element {
    pub tag: String,
    pub attrs: Attrs,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Attrs::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(nodes);
        self
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

/// One node of the tree handed to the serializer.
pub enum Node {
    /// A text leaf, escaped on emission.
    Text(String),
    /// A primitive element.
    Element(Element),
    /// A wrapper contributing no markup of its own.
    Fragment(Vec<Node>),
    /// A user composite. Rendering that produces no node is a fatal
    /// resolution failure, not empty output.
    Component {
        name: String,
        render: Arc<dyn Fn(&Ambient<'_>) -> Option<Node> + Send + Sync>,
    },
    /// Overrides one ambient scope for the subtree.
    Provider {
        scope: ScopeId,
        value: Value,
        children: Vec<Node>,
    },
    /// Renders from the current ambient value of a scope.
    Consumer {
        scope: ScopeId,
        render: Arc<dyn Fn(&Value) -> Node + Send + Sync>,
    },
    /// Pre-registers a fallback subtree for suspension underneath.
    Boundary {
        children: Vec<Node>,
        fallback: Vec<Node>,
    },
    /// Depends on an external value that is not ready yet.
    Pending(NodeFuture<Node>),
    /// Contributes nothing.
    Empty,
}

impl Node {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn component(
        name: impl Into<String>,
        render: impl Fn(&Ambient<'_>) -> Option<Self> + Send + Sync + 'static,
    ) -> Self {
        Self::Component {
            name: name.into(),
            render: Arc::new(render),
        }
    }

    pub fn provider(scope: ScopeId, value: Value, children: Vec<Self>) -> Self {
        Self::Provider {
            scope,
            value,
            children,
        }
    }

    pub fn consumer(scope: ScopeId, render: impl Fn(&Value) -> Self + Send + Sync + 'static) -> Self {
        Self::Consumer {
            scope,
            render: Arc::new(render),
        }
    }

    pub fn boundary(children: Vec<Self>, fallback: Vec<Self>) -> Self {
        Self::Boundary { children, fallback }
    }
}
