use anyhow::{anyhow, Result};
use futures::stream::BoxStream;
use futures::TryStreamExt;

use crate::agent::Agent;
use crate::errors::{AgentError, AgentResult, PipelineError};
use crate::events::{DelimiterKind, OutputEvent};
use crate::models::content::Content;
use crate::models::message::{Message, ToolRequest};
use crate::providers::base::{Provider, ProviderChunk};

pub const DEFAULT_MAX_TURNS: usize = 10;

/// Runs roles against a single generation backend, looping through tool calls
/// until the model answers without requesting any
pub struct Runner {
    provider: Box<dyn Provider>,
    max_turns: usize,
}

impl Runner {
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self {
            provider,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Dispatch a single tool call to the system that owns it
    async fn dispatch_tool_call(
        &self,
        agent: &Agent,
        request: &ToolRequest,
    ) -> AgentResult<Vec<Content>> {
        let call = request.tool_call.clone()?;
        let system = agent
            .system_for_tool(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        tracing::debug!(
            role = agent.name(),
            system = system.name(),
            tool = %call.name,
            "dispatching tool call"
        );
        system.call(call).await
    }

    /// Run every requested tool in parallel, collecting the responses into one message
    async fn respond_to_tools(&self, agent: &Agent, requests: &[&ToolRequest]) -> Message {
        let futures: Vec<_> = requests
            .iter()
            .map(|request| self.dispatch_tool_call(agent, request))
            .collect();

        let outputs = futures::future::join_all(futures).await;

        let mut message_tool_response = Message::user();
        for (request, output) in requests.iter().zip(outputs.into_iter()) {
            if let Err(e) = &output {
                tracing::warn!(role = agent.name(), id = %request.id, error = %e, "tool call failed");
            }
            message_tool_response = message_tool_response.with_tool_response(request.id.clone(), output);
        }
        message_tool_response
    }

    fn turn_limit(&self, agent: &Agent) -> anyhow::Error {
        PipelineError::TurnLimitExceeded {
            role: agent.name().to_string(),
            max_turns: self.max_turns,
        }
        .into()
    }

    /// Invoke a role and return the conversation including every message it
    /// produced. The last message is the role's answer.
    pub async fn run(&self, agent: &Agent, messages: Vec<Message>) -> Result<Vec<Message>> {
        let mut messages = messages;
        let tools = agent.tools();
        let system_prompt = agent.system_prompt();

        for _ in 0..self.max_turns {
            let (response, usage) = self
                .provider
                .complete(agent.model(), &system_prompt, &messages, &tools)
                .await?;
            tracing::debug!(role = agent.name(), ?usage, "model turn complete");

            let tool_requests: Vec<&ToolRequest> = response.tool_requests();
            if tool_requests.is_empty() {
                messages.push(response);
                return Ok(messages);
            }

            let message_tool_response = self.respond_to_tools(agent, &tool_requests).await;
            messages.push(response.clone());
            messages.push(message_tool_response);
        }

        Err(self.turn_limit(agent))
    }

    /// Invoke a role in streaming mode. Each model turn is framed by a start and
    /// end delimiter; tool activity within the turn appears between them.
    pub async fn run_stream<'a>(
        &'a self,
        agent: &'a Agent,
        messages: Vec<Message>,
    ) -> Result<BoxStream<'a, Result<OutputEvent>>> {
        let mut messages = messages;
        let tools = agent.tools();
        let system_prompt = agent.system_prompt();

        Ok(Box::pin(async_stream::try_stream! {
            let mut turns = 0;
            loop {
                if turns == self.max_turns {
                    Err::<(), _>(self.turn_limit(agent))?;
                }
                turns += 1;

                yield OutputEvent::Delimiter(DelimiterKind::Start);

                let mut chunks = self
                    .provider
                    .stream(agent.model(), &system_prompt, &messages, &tools)
                    .await?;

                let mut response = None;
                while let Some(chunk) = chunks.try_next().await? {
                    match chunk {
                        ProviderChunk::Delta(text) => {
                            if !text.is_empty() {
                                yield OutputEvent::ContentChunk(text);
                            }
                        }
                        ProviderChunk::Complete(message, _) => response = Some(message),
                    }
                }
                let response = response
                    .ok_or_else(|| anyhow!("Stream ended before the completion for {}", agent.name()))?;

                let tool_requests: Vec<&ToolRequest> = response.tool_requests();
                if tool_requests.is_empty() {
                    yield OutputEvent::Delimiter(DelimiterKind::End);
                    break;
                }

                for request in &tool_requests {
                    if let Ok(call) = &request.tool_call {
                        yield OutputEvent::ToolInvocation {
                            id: request.id.clone(),
                            name: call.name.clone(),
                            args: call.arguments.clone(),
                        };
                    }
                }

                let message_tool_response = self.respond_to_tools(agent, &tool_requests).await;
                for (request, content) in tool_requests.iter().zip(message_tool_response.content.iter()) {
                    let name = match &request.tool_call {
                        Ok(call) => call.name.clone(),
                        Err(_) => "unknown".to_string(),
                    };
                    yield OutputEvent::ToolResult {
                        id: request.id.clone(),
                        name,
                        text: content.as_tool_response_text().unwrap_or_default(),
                    };
                }

                yield OutputEvent::Delimiter(DelimiterKind::End);

                messages.push(response.clone());
                messages.push(message_tool_response);
            }
        }))
    }
}

/// The answer of a finished conversation
pub fn final_text(role: &str, messages: &[Message]) -> Result<String> {
    let last = messages.last().ok_or_else(|| PipelineError::EmptyConversation {
        role: role.to_string(),
    })?;
    Ok(last.text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::MockSystem;
    use crate::models::message::MessageContent;
    use crate::models::tool::ToolCall;
    use crate::providers::mock::MockProvider;
    use crate::providers::utils::messages_to_openai_spec;
    use serde_json::json;

    fn echo_agent() -> Agent {
        Agent::new("tester", "Be brief.", "gpt-4o").with_system(Box::new(MockSystem::new("test")))
    }

    async fn collect(stream: BoxStream<'_, Result<OutputEvent>>) -> Result<Vec<OutputEvent>> {
        stream.try_collect().await
    }

    #[tokio::test]
    async fn test_simple_response() -> Result<()> {
        let response = Message::assistant().with_text("Hello!");
        let provider = MockProvider::new(vec![response.clone()]);
        let runner = Runner::new(Box::new(provider.clone()));
        let agent = Agent::new("writer", "Write.", "gpt-4o-mini");

        let messages = runner
            .run(&agent, vec![Message::user().with_text("Hi")])
            .await?;

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1], response);

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "gpt-4o-mini");
        assert_eq!(calls[0].system, "Write.");
        assert!(calls[0].tools.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_tool_call() -> Result<()> {
        let provider = MockProvider::new(vec![
            Message::assistant()
                .with_tool_request("1", Ok(ToolCall::new("echo", json!({"message": "test"})))),
            Message::assistant().with_text("Done!"),
        ]);
        let runner = Runner::new(Box::new(provider.clone()));

        let messages = runner
            .run(&echo_agent(), vec![Message::user().with_text("Echo test")])
            .await?;

        // user prompt, tool request, tool response, final text
        assert_eq!(messages.len(), 4);
        assert!(messages[1].has_tool_requests());
        assert_eq!(
            messages[2].content[0].as_tool_response_text(),
            Some("test".to_string())
        );
        assert_eq!(final_text("tester", &messages)?, "Done!");

        // The second turn sees the tool exchange
        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].messages.len(), 3);
        assert_eq!(calls[0].tools, vec!["echo", "fail"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_tool_is_reported_to_model() -> Result<()> {
        let provider = MockProvider::new(vec![
            Message::assistant()
                .with_tool_request("1", Ok(ToolCall::new("invalid_tool", json!({}))))
                .with_tool_request("2", Ok(ToolCall::new("fail", json!({})))),
            Message::assistant().with_text("Error occurred"),
        ]);
        let runner = Runner::new(Box::new(provider));

        let messages = runner
            .run(&echo_agent(), vec![Message::user().with_text("Invalid tool")])
            .await?;

        assert_eq!(messages.len(), 4);
        match &messages[2].content[..] {
            [MessageContent::ToolResponse(first), MessageContent::ToolResponse(second)] => {
                assert_eq!(
                    first.tool_result,
                    Err(AgentError::ToolNotFound("invalid_tool".to_string()))
                );
                assert_eq!(
                    second.tool_result,
                    Err(AgentError::ExecutionError("boom".to_string()))
                );
            }
            other => panic!("Expected two tool responses, got {:?}", other),
        }
        assert_eq!(messages[3].text(), "Error occurred");
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_tool_request_is_answered() -> Result<()> {
        let provider = MockProvider::new(vec![
            Message::assistant().with_tool_request(
                "call_1",
                Err(AgentError::InvalidParameters("bad json".to_string())),
            ),
            Message::assistant().with_text("Recovered"),
        ]);
        let runner = Runner::new(Box::new(provider.clone()));

        let messages = runner
            .run(&echo_agent(), vec![Message::user().with_text("Echo test")])
            .await?;

        assert_eq!(final_text("tester", &messages)?, "Recovered");
        assert_eq!(
            messages[2].content[0].as_tool_response_text(),
            Some("Error: Invalid parameters: bad json".to_string())
        );

        // The retry turn must still be a well-formed tool exchange for the backend
        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        let spec = messages_to_openai_spec(&calls[1].messages);
        assert_eq!(spec.len(), 3);
        assert_eq!(spec[1]["role"], "assistant");
        assert_eq!(spec[1]["tool_calls"][0]["id"], "call_1");
        assert_eq!(spec[2]["role"], "tool");
        assert_eq!(spec[2]["tool_call_id"], "call_1");
        Ok(())
    }

    #[tokio::test]
    async fn test_turn_limit() {
        let looping = Message::assistant()
            .with_tool_request("1", Ok(ToolCall::new("echo", json!({"message": "again"}))));
        let provider = MockProvider::new(vec![looping.clone(), looping.clone(), looping]);
        let runner = Runner::new(Box::new(provider)).with_max_turns(2);

        let err = runner
            .run(&echo_agent(), vec![Message::user().with_text("Loop")])
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::TurnLimitExceeded { max_turns: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let provider = MockProvider::new(vec![]).then_fail("Server error: 503");
        let runner = Runner::new(Box::new(provider));

        let err = runner
            .run(&echo_agent(), vec![Message::user().with_text("Hi")])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Server error: 503");
    }

    #[tokio::test]
    async fn test_stream_content_between_delimiters() -> Result<()> {
        let provider = MockProvider::new(vec![]).then_stream(&["EV growth is", " accelerating."]);
        let runner = Runner::new(Box::new(provider));
        let agent = Agent::new("writer", "Write.", "gpt-4o");

        let stream = runner
            .run_stream(&agent, vec![Message::user().with_text("Trend")])
            .await?;
        let events = collect(stream).await?;

        assert_eq!(
            events,
            vec![
                OutputEvent::Delimiter(DelimiterKind::Start),
                OutputEvent::content("EV growth is"),
                OutputEvent::content(" accelerating."),
                OutputEvent::Delimiter(DelimiterKind::End),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_reports_tool_activity() -> Result<()> {
        let provider = MockProvider::new(vec![Message::assistant()
            .with_text("Checking.")
            .with_tool_request("call_1", Ok(ToolCall::new("echo", json!({"message": "ping"}))))])
        .then_stream(&["pong"]);
        let runner = Runner::new(Box::new(provider));
        let agent = echo_agent();

        let stream = runner
            .run_stream(&agent, vec![Message::user().with_text("Ping")])
            .await?;
        let events = collect(stream).await?;

        assert_eq!(
            events,
            vec![
                OutputEvent::Delimiter(DelimiterKind::Start),
                OutputEvent::content("Checking."),
                OutputEvent::ToolInvocation {
                    id: "call_1".to_string(),
                    name: "echo".to_string(),
                    args: json!({"message": "ping"}),
                },
                OutputEvent::ToolResult {
                    id: "call_1".to_string(),
                    name: "echo".to_string(),
                    text: "ping".to_string(),
                },
                OutputEvent::Delimiter(DelimiterKind::End),
                OutputEvent::Delimiter(DelimiterKind::Start),
                OutputEvent::content("pong"),
                OutputEvent::Delimiter(DelimiterKind::End),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_reports_malformed_tool_request() -> Result<()> {
        let provider = MockProvider::new(vec![Message::assistant().with_tool_request(
            "call_1",
            Err(AgentError::ToolNotFound("search web".to_string())),
        )])
        .then_stream(&["Fixed"]);
        let runner = Runner::new(Box::new(provider));
        let agent = echo_agent();

        let stream = runner
            .run_stream(&agent, vec![Message::user().with_text("Ping")])
            .await?;
        let events = collect(stream).await?;

        assert_eq!(
            events,
            vec![
                OutputEvent::Delimiter(DelimiterKind::Start),
                OutputEvent::ToolResult {
                    id: "call_1".to_string(),
                    name: "unknown".to_string(),
                    text: "Error: Tool not found: search web".to_string(),
                },
                OutputEvent::Delimiter(DelimiterKind::End),
                OutputEvent::Delimiter(DelimiterKind::Start),
                OutputEvent::content("Fixed"),
                OutputEvent::Delimiter(DelimiterKind::End),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_is_lazy() -> Result<()> {
        let provider = MockProvider::new(vec![]).then_stream(&["late"]);
        let runner = Runner::new(Box::new(provider.clone()));
        let agent = Agent::new("writer", "Write.", "gpt-4o");

        let mut stream = runner
            .run_stream(&agent, vec![Message::user().with_text("Trend")])
            .await?;
        assert!(provider.calls().is_empty());

        assert_eq!(
            stream.try_next().await?,
            Some(OutputEvent::Delimiter(DelimiterKind::Start))
        );
        assert_eq!(stream.try_next().await?, Some(OutputEvent::content("late")));
        assert_eq!(provider.calls().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_failure_is_an_item() -> Result<()> {
        let provider = MockProvider::new(vec![]).then_fail("Server error: 500");
        let runner = Runner::new(Box::new(provider));
        let agent = Agent::new("writer", "Write.", "gpt-4o");

        let mut stream = runner
            .run_stream(&agent, vec![Message::user().with_text("Trend")])
            .await?;
        assert_eq!(
            stream.try_next().await?,
            Some(OutputEvent::Delimiter(DelimiterKind::Start))
        );
        assert!(stream.try_next().await.is_err());
        Ok(())
    }

    #[test]
    fn test_final_text() {
        assert!(final_text("research", &[]).is_err());
        let messages = vec![
            Message::user().with_text("Q"),
            Message::assistant().with_text("A"),
        ];
        assert_eq!(final_text("research", &messages).unwrap(), "A");
    }
}
