use anyhow::Result;
use futures::{Stream, TryStreamExt};

use crate::events::OutputEvent;

/// Suffix a renderer may show after text that is still arriving
pub const TYPING_MARKER: &str = "▌";

/// Receives the growing post each time it changes
pub trait Renderer {
    fn render(&mut self, text: &str, in_progress: bool);
}

impl<F> Renderer for F
where
    F: FnMut(&str, bool),
{
    fn render(&mut self, text: &str, in_progress: bool) {
        self(text, in_progress)
    }
}

/// `text` as a renderer shows it, with the typing marker while in progress
pub fn display_text(text: &str, in_progress: bool) -> String {
    if in_progress {
        format!("{}{}", text, TYPING_MARKER)
    } else {
        text.to_string()
    }
}

/// Folds a stream of events into the final post, rendering as it grows
pub struct StreamConsumer<R: Renderer> {
    renderer: R,
}

impl<R: Renderer> StreamConsumer<R> {
    pub fn new(renderer: R) -> Self {
        Self { renderer }
    }

    /// Pull every event, appending content in order. Returns the complete text
    /// once the stream is exhausted; an error ends consumption immediately.
    pub async fn consume<S>(&mut self, mut events: S) -> Result<String>
    where
        S: Stream<Item = Result<OutputEvent>> + Unpin,
    {
        let mut buffer = String::new();

        while let Some(event) = events.try_next().await? {
            match event {
                OutputEvent::Delimiter(kind) => {
                    tracing::debug!(?kind, "delimiter");
                }
                OutputEvent::ContentChunk(text) => {
                    buffer.push_str(&text);
                    self.renderer.render(&buffer, true);
                }
                OutputEvent::ToolInvocation { name, .. } => {
                    tracing::debug!(tool = %name, "tool invoked");
                }
                OutputEvent::ToolResult { name, text, .. } => {
                    tracing::debug!(tool = %name, chars = text.len(), "tool returned");
                }
            }
        }

        self.renderer.render(&buffer, false);
        Ok(buffer)
    }
}
