//! HTML collaborators for the `stream` serialization engine.
//!
//! Provides a concrete node tree plus the [`HtmlResolver`] / [`HtmlEncoder`]
//! pair consumed by the engine's readers: tag validation, fragment and
//! component expansion, form-control normalization, and HTML escaping. The
//! traversal itself, scope bookkeeping, and suspension handling all live in
//! the `stream` crate; this crate only decides what one node means and what
//! its markup looks like.

mod encoder;
mod escape;
mod node;
mod resolver;

pub use encoder::HtmlEncoder;
pub use escape::{escape_attr, escape_text};
pub use node::{Attrs, Element, Node};
pub use resolver::{HtmlResolver, collaborators};
