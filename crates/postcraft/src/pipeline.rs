use anyhow::Result;
use futures::stream::BoxStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::agent::Agent;
use crate::errors::PipelineError;
use crate::events::OutputEvent;
use crate::models::message::Message;
use crate::providers::configs::ProviderConfig;
use crate::providers::factory::get_provider;
use crate::roles;
use crate::runner::{final_text, Runner};
use crate::search::{SearchClient, SearchConfig};
use crate::systems::SearchSystem;

/// Research, then strategy, then writing. Each stage gets the previous stage's
/// answer as its only message; the writer's output is handed back as a stream.
pub struct Pipeline {
    runner: Runner,
    research: Agent,
    strategist: Agent,
    writer: Agent,
    degraded_searches: Option<Arc<AtomicUsize>>,
}

impl Pipeline {
    pub fn new(runner: Runner, research: Agent, strategist: Agent, writer: Agent) -> Self {
        Self {
            runner,
            research,
            strategist,
            writer,
            degraded_searches: None,
        }
    }

    /// Build the standard three roles on one backend, all using `model`
    pub fn from_configs(
        provider: ProviderConfig,
        search: SearchConfig,
        model: &str,
    ) -> Result<Self> {
        let runner = Runner::new(get_provider(provider)?);
        let search = SearchSystem::new(SearchClient::new(search)?);
        let counter = search.degraded_counter();

        Ok(Self::new(
            runner,
            roles::research_specialist(model, search)?,
            roles::content_strategist(model)?,
            roles::post_writer(model)?,
        )
        .with_search_counter(counter))
    }

    /// Track degraded searches made during a run, see [`Pipeline::degraded_searches`]
    pub fn with_search_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.degraded_searches = Some(counter);
        self
    }

    /// How many searches in the latest run came back as error text instead of
    /// research. The run itself continues regardless.
    pub fn degraded_searches(&self) -> usize {
        self.degraded_searches
            .as_ref()
            .map(|counter| counter.load(Ordering::SeqCst))
            .unwrap_or_default()
    }

    async fn stage(&self, agent: &Agent, input: String) -> Result<String> {
        tracing::info!(role = agent.name(), "stage started");
        let messages = self
            .runner
            .run(agent, vec![Message::user().with_text(input)])
            .await?;
        let output = final_text(agent.name(), &messages)?;
        tracing::info!(role = agent.name(), chars = output.len(), "stage finished");
        Ok(output)
    }

    /// Turn a topic into a post. Research and strategy complete before this
    /// returns; the writer's events are produced as the stream is pulled.
    pub async fn run(&self, topic: &str) -> Result<BoxStream<'_, Result<OutputEvent>>> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(PipelineError::EmptyTopic.into());
        }
        if let Some(counter) = &self.degraded_searches {
            counter.store(0, Ordering::SeqCst);
        }

        tracing::info!(topic, "starting post generation");
        let raw_research = self
            .stage(
                &self.research,
                format!("Research this topic thoroughly: {}", topic),
            )
            .await?;
        if self.degraded_searches() > 0 {
            tracing::warn!(
                degraded = self.degraded_searches(),
                "research continued with failed searches"
            );
        }

        let structured_content = self.stage(&self.strategist, raw_research).await?;

        tracing::info!(role = self.writer.name(), "streaming stage started");
        self.runner
            .run_stream(
                &self.writer,
                vec![Message::user().with_text(structured_content)],
            )
            .await
    }
}
