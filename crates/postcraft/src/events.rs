use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which edge of a model turn a delimiter marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelimiterKind {
    Start,
    End,
}

/// One unit of a streamed role invocation, in the order it happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum OutputEvent {
    Delimiter(DelimiterKind),
    ContentChunk(String),
    ToolInvocation { id: String, name: String, args: Value },
    ToolResult { id: String, name: String, text: String },
}

impl OutputEvent {
    pub fn content<S: Into<String>>(text: S) -> Self {
        OutputEvent::ContentChunk(text.into())
    }
}
