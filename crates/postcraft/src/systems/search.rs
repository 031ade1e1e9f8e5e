use async_trait::async_trait;
use indoc::indoc;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::system::System;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::search::SearchClient;

pub const SEARCH_TOOL: &str = "search_web";

/// Exposes the search client to the research role as its only tool
pub struct SearchSystem {
    client: SearchClient,
    tools: Vec<Tool>,
    instructions: String,
    degraded: Arc<AtomicUsize>,
}

impl SearchSystem {
    pub fn new(client: SearchClient) -> Self {
        let search_tool = Tool::new(
            SEARCH_TOOL,
            indoc! {"
                Search the web for the latest developments on a topic. Returns an answer
                followed by a list of sources, one per line as `- title: url`.
            "},
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The topic to research"
                    }
                }
            }),
        );

        Self {
            client,
            tools: vec![search_tool],
            instructions: "Call search_web before answering; cite the sources it returns."
                .to_string(),
            degraded: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter of searches that came back as error text; shared with whoever
    /// wants to know whether a run's research was degraded
    pub fn degraded_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.degraded)
    }
}

#[async_trait]
impl System for SearchSystem {
    fn name(&self) -> &str {
        "research"
    }

    fn instructions(&self) -> &str {
        &self.instructions
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        if tool_call.name != SEARCH_TOOL {
            return Err(AgentError::ToolNotFound(tool_call.name));
        }

        let query = tool_call
            .arguments
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| {
                AgentError::InvalidParameters("The query string is required".to_string())
            })?;

        let outcome = self.client.search_outcome(query).await;
        if outcome.degraded {
            self.degraded.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(query, "search degraded to an error text");
        }
        Ok(vec![Content::text(outcome.text)])
    }
}
