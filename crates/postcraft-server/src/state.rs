use anyhow::Result;
use postcraft::pipeline::Pipeline;
use postcraft::providers::configs::ProviderConfig;
use postcraft::search::SearchConfig;

/// Shared application state. Each request builds its own pipeline from it, so
/// concurrent runs never share a conversation.
#[derive(Clone)]
pub struct AppState {
    pub provider_config: ProviderConfig,
    pub search_config: SearchConfig,
    pub model: String,
}

impl AppState {
    pub fn pipeline(&self) -> Result<Pipeline> {
        Pipeline::from_configs(
            self.provider_config.clone(),
            self.search_config.clone(),
            &self.model,
        )
    }
}
