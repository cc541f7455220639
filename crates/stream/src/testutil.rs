//! Toy node tree, resolver, and encoder used by the engine's unit tests.
//! Output grammar is deliberately tiny: `<tag>`/`</tag>` plus the default
//! sentinel comments.

use crate::error::EngineError;
use crate::resolve::{Encoder, NodeFuture, Resolved, Resolver};
use crate::scope::{Ambient, ScopeId};
use futures::channel::oneshot;
use serde_json::Value;

pub(crate) enum TestNode {
    Text(String),
    Elem {
        tag: &'static str,
        children: Vec<TestNode>,
    },
    Group(Vec<TestNode>),
    Provide {
        scope: ScopeId,
        value: Value,
        children: Vec<TestNode>,
    },
    /// Emits the ambient value of a scope as text.
    ReadScope(ScopeId),
    Bound {
        children: Vec<TestNode>,
        fallback: Vec<TestNode>,
    },
    Pending(NodeFuture<TestNode>),
    Broken(String),
    Nothing,
}

pub(crate) fn text(value: &str) -> TestNode {
    TestNode::Text(value.to_owned())
}

pub(crate) fn elem(tag: &'static str, children: Vec<TestNode>) -> TestNode {
    TestNode::Elem { tag, children }
}

pub(crate) fn bound(children: Vec<TestNode>, fallback: Vec<TestNode>) -> TestNode {
    TestNode::Bound { children, fallback }
}

/// A pending node plus the sender that resolves it.
pub(crate) fn pending() -> (oneshot::Sender<TestNode>, TestNode) {
    let (sender, receiver) = oneshot::channel();
    let future: NodeFuture<TestNode> = Box::pin(async move {
        receiver
            .await
            .map_err(|_| anyhow::anyhow!("pending value abandoned"))
    });
    (sender, TestNode::Pending(future))
}

/// A pending node that resolves immediately when awaited.
pub(crate) fn ready(node: TestNode) -> TestNode {
    TestNode::Pending(Box::pin(async move { Ok(node) }))
}

/// A pending node whose external value fails.
pub(crate) fn failing(message: &str) -> TestNode {
    let message = message.to_owned();
    TestNode::Pending(Box::pin(async move { Err(anyhow::anyhow!(message)) }))
}

pub(crate) struct TestResolver;

impl Resolver<TestNode> for TestResolver {
    fn resolve(
        &self,
        node: TestNode,
        ambient: &Ambient<'_>,
    ) -> Result<Resolved<TestNode>, EngineError> {
        match node {
            TestNode::Text(value) => Ok(Resolved::Text(value)),
            TestNode::Elem { tag, children } => Ok(Resolved::Markup {
                element: TestNode::Elem {
                    tag,
                    children: Vec::new(),
                },
                children,
                ambient: None,
            }),
            TestNode::Group(children) => Ok(Resolved::Children(children)),
            TestNode::Provide {
                scope,
                value,
                children,
            } => Ok(Resolved::Provider {
                scope,
                value,
                children,
            }),
            TestNode::ReadScope(scope) => {
                let value = ambient.get(scope)?;
                let rendered = match value {
                    Value::String(inner) => inner.clone(),
                    other => other.to_string(),
                };
                Ok(Resolved::Text(rendered))
            }
            TestNode::Bound { children, fallback } => {
                Ok(Resolved::Boundary { children, fallback })
            }
            TestNode::Pending(future) => Ok(Resolved::Pending(future)),
            TestNode::Broken(message) => Err(EngineError::Resolution(message)),
            TestNode::Nothing => Ok(Resolved::Empty),
        }
    }
}

pub(crate) struct TestEncoder;

impl Encoder<TestNode> for TestEncoder {
    fn open_markup(&self, element: &TestNode, _ambient: &Ambient<'_>, _is_root: bool) -> String {
        match element {
            TestNode::Elem { tag, .. } => format!("<{tag}>"),
            _ => String::new(),
        }
    }

    fn close_markup(&self, element: &TestNode) -> String {
        match element {
            TestNode::Elem { tag, .. } => format!("</{tag}>"),
            _ => String::new(),
        }
    }

    fn escape_text(&self, text: &str) -> String {
        text.to_owned()
    }
}
