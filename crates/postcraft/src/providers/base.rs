use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// One increment of a streamed completion. A well-formed stream is zero or more
/// deltas followed by exactly one `Complete` carrying the assembled message.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderChunk {
    Delta(String),
    Complete(Message, Usage),
}

pub type ChunkStream = BoxStream<'static, Result<ProviderChunk>>;

/// Base trait for generation backends (OpenAI and compatible hosts)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate the next message using the specified model
    async fn complete(
        &self,
        model: &str,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)>;

    /// Generate the next message incrementally. Providers without native
    /// streaming deliver the whole completion as a single delta.
    async fn stream(
        &self,
        model: &str,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<ChunkStream> {
        let (message, usage) = self.complete(model, system, messages, tools).await?;

        let mut chunks = Vec::new();
        let text = message.text();
        if !text.is_empty() {
            chunks.push(Ok(ProviderChunk::Delta(text)));
        }
        chunks.push(Ok(ProviderChunk::Complete(message, usage)));
        Ok(Box::pin(stream::iter(chunks)))
    }
}
