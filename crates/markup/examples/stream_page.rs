//! Streams a small page whose main section resolves asynchronously. The
//! boundary around it lets the shell go out immediately; the section's
//! markup follows once the backend answers.
//!
//! Run with `RUST_LOG=info cargo run --example stream_page`.

use markup::{Element, Node, collaborators};
use std::time::Duration;
use stream::{AsyncReader, SharedContext};

fn slow_section() -> Node {
    Node::Pending(Box::pin(async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        Ok(Element::new("section")
            .child(Node::text("fresh from the backend"))
            .into())
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let context = SharedContext::new();
    let (resolver, encoder) = collaborators(&context);

    let page = Element::new("html")
        .child(
            Element::new("body")
                .child(Element::new("h1").child(Node::text("Orders")).into())
                .child(Node::boundary(
                    vec![slow_section()],
                    vec![Node::text("loading orders")],
                ))
                .into(),
        )
        .into();

    let mut reader = AsyncReader::new(page, resolver, encoder, context);
    while let Some(chunk) = reader.read(256).await? {
        log::info!("chunk ({} bytes): {chunk}", chunk.len());
    }
    Ok(())
}
