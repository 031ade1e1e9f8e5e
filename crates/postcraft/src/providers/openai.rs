use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Map, Value};

use super::base::{ChunkStream, Provider, ProviderChunk, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, messages_to_openai_spec, openai_response_to_message,
    tools_to_openai_spec,
};
use crate::models::message::Message;
use crate::models::tool::Tool;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        // No request timeout: a stage waits as long as the backend takes
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    fn parse_usage(usage: &Value) -> Usage {
        let input_tokens = usage
            .get("prompt_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let output_tokens = usage
            .get("completion_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let total_tokens = usage
            .get("total_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32)
            .or_else(|| match (input_tokens, output_tokens) {
                (Some(input), Some(output)) => Some(input + output),
                _ => None,
            });

        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    fn get_usage(data: &Value) -> Result<Usage> {
        let usage = data
            .get("usage")
            .ok_or_else(|| anyhow!("No usage data in response"))?;
        Ok(Self::parse_usage(usage))
    }

    fn build_payload(
        &self,
        model: &str,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<Map<String, Value>> {
        // create messages array with system message first
        let mut messages_array = vec![json!({
            "role": "system",
            "content": system
        })];
        messages_array.extend(messages_to_openai_spec(messages));

        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(model));
        payload.insert("messages".to_string(), json!(messages_array));

        if !tools.is_empty() {
            payload.insert("tools".to_string(), json!(tools_to_openai_spec(tools)?));
        }
        if let Some(temp) = self.config.temperature {
            payload.insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = self.config.max_tokens {
            payload.insert("max_tokens".to_string(), json!(tokens));
        }
        Ok(payload)
    }

    async fn send(&self, payload: &Value) -> Result<Response> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!("Request failed: {}\nResponse: {}", status, body))
            }
        }
    }
}

fn check_error(data: &Value) -> Result<()> {
    if let Some(error) = data.get("error") {
        // Raise specific error if context length is exceeded
        if let Some(err) = check_openai_context_length_error(error) {
            return Err(err.into());
        }
        return Err(anyhow!("OpenAI API error: {}", error));
    }
    Ok(())
}

// Upper bound on tool call slots a single streamed turn may open
const MAX_STREAMED_TOOL_CALLS: u64 = 128;

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds the `data:` payloads of a streamed completion back into one message
#[derive(Debug, Default)]
struct StreamAccumulator {
    content: String,
    tool_calls: Vec<PartialToolCall>,
    usage: Option<Usage>,
}

impl StreamAccumulator {
    /// Merge one payload, returning the content text it added, if any
    fn push(&mut self, data: &Value) -> Result<Option<String>> {
        check_error(data)?;

        if let Some(usage) = data.get("usage").filter(|usage| usage.is_object()) {
            self.usage = Some(OpenAiProvider::parse_usage(usage));
        }

        let Some(delta) = data
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("delta"))
        else {
            return Ok(None);
        };

        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                let index = call.get("index").and_then(Value::as_u64).unwrap_or(0);
                if index >= MAX_STREAMED_TOOL_CALLS {
                    return Err(anyhow!("Streamed tool call index out of range: {}", index));
                }
                let index = index as usize;
                if self.tool_calls.len() <= index {
                    self.tool_calls.resize_with(index + 1, PartialToolCall::default);
                }
                let partial = &mut self.tool_calls[index];
                if let Some(id) = call.get("id").and_then(Value::as_str) {
                    partial.id.push_str(id);
                }
                if let Some(name) = call["function"].get("name").and_then(Value::as_str) {
                    partial.name.push_str(name);
                }
                if let Some(arguments) = call["function"].get("arguments").and_then(Value::as_str) {
                    partial.arguments.push_str(arguments);
                }
            }
        }

        match delta.get("content").and_then(Value::as_str) {
            Some(text) if !text.is_empty() => {
                self.content.push_str(text);
                Ok(Some(text.to_string()))
            }
            _ => Ok(None),
        }
    }

    fn finish(self) -> Result<(Message, Usage)> {
        let tool_calls: Vec<Value> = self
            .tool_calls
            .into_iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {"name": call.name, "arguments": call.arguments}
                })
            })
            .collect();

        let content = if self.content.is_empty() {
            Value::Null
        } else {
            json!(self.content)
        };
        let response = json!({
            "choices": [{
                "message": {"role": "assistant", "content": content, "tool_calls": tool_calls}
            }]
        });

        let message = openai_response_to_message(&response)?;
        Ok((message, self.usage.unwrap_or_default()))
    }
}

/// Parse a server-sent events body into provider chunks, line by line
fn sse_to_chunks(response: Response) -> ChunkStream {
    Box::pin(async_stream::try_stream! {
        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut accumulator = StreamAccumulator::default();
        let mut done = false;

        while let Some(bytes) = body.next().await {
            buffer.extend_from_slice(&bytes?);

            while let Some(position) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=position).collect();
                let line = String::from_utf8_lossy(&line);
                let Some(data) = line.trim().strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    done = true;
                    break;
                }
                let payload: Value = serde_json::from_str(data)?;
                if let Some(text) = accumulator.push(&payload)? {
                    yield ProviderChunk::Delta(text);
                }
            }

            if done {
                break;
            }
        }

        let (message, usage) = accumulator.finish()?;
        yield ProviderChunk::Complete(message, usage);
    })
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        let payload = Value::Object(self.build_payload(model, system, messages, tools)?);

        let response: Value = self.send(&payload).await?.json().await?;
        check_error(&response)?;

        let message = openai_response_to_message(&response)?;
        let usage = Self::get_usage(&response).unwrap_or_default();
        Ok((message, usage))
    }

    async fn stream(
        &self,
        model: &str,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<ChunkStream> {
        let mut payload = self.build_payload(model, system, messages, tools)?;
        payload.insert("stream".to_string(), json!(true));
        payload.insert(
            "stream_options".to_string(),
            json!({"include_usage": true}),
        );

        let response = self.send(&Value::Object(payload)).await?;
        Ok(sse_to_chunks(response))
    }
}
