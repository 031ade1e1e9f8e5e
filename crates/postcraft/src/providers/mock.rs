use anyhow::Result;
use async_trait::async_trait;
use futures::stream;
use std::sync::{Arc, Mutex};

use super::base::{ChunkStream, Provider, ProviderChunk, Usage};
use crate::models::message::Message;
use crate::models::tool::Tool;

/// What the mock saw on each call, for asserting on stage inputs
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
}

enum Scripted {
    Message(Message),
    Chunks(Vec<String>),
    Failure(String),
}

/// A mock provider that returns pre-configured responses for testing
#[derive(Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Scripted>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(
                responses.into_iter().map(Scripted::Message).collect(),
            )),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a response that streams as the given chunks
    pub fn then_stream(self, chunks: &[&str]) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push(Scripted::Chunks(chunks.iter().map(|c| c.to_string()).collect()));
        self
    }

    /// Queue a response that fails the backend call
    pub fn then_fail(self, reason: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push(Scripted::Failure(reason.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next(&self, model: &str, system: &str, messages: &[Message], tools: &[Tool]) -> Scripted {
        self.calls.lock().unwrap().push(RecordedCall {
            model: model.to_string(),
            system: system.to_string(),
            messages: messages.to_vec(),
            tools: tools.iter().map(|t| t.name.clone()).collect(),
        });

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Return empty response if no more pre-configured responses
            Scripted::Message(Message::assistant().with_text(""))
        } else {
            responses.remove(0)
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        match self.next(model, system, messages, tools) {
            Scripted::Message(message) => Ok((message, Usage::default())),
            Scripted::Chunks(chunks) => Ok((
                Message::assistant().with_text(chunks.concat()),
                Usage::default(),
            )),
            Scripted::Failure(reason) => Err(anyhow::anyhow!(reason)),
        }
    }

    async fn stream(
        &self,
        model: &str,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<ChunkStream> {
        let chunks = match self.next(model, system, messages, tools) {
            Scripted::Message(message) => {
                let text = message.text();
                let mut chunks = Vec::new();
                if !text.is_empty() {
                    chunks.push(ProviderChunk::Delta(text));
                }
                chunks.push(ProviderChunk::Complete(message, Usage::default()));
                chunks
            }
            Scripted::Chunks(chunks) => {
                let message = Message::assistant().with_text(chunks.concat());
                chunks
                    .into_iter()
                    .map(ProviderChunk::Delta)
                    .chain(std::iter::once(ProviderChunk::Complete(
                        message,
                        Usage::default(),
                    )))
                    .collect()
            }
            Scripted::Failure(reason) => return Err(anyhow::anyhow!(reason)),
        };
        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }
}
