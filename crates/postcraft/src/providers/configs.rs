// Unified enum to wrap different provider configurations
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    OpenAi(OpenAiProviderConfig),
}

/// Any OpenAI-compatible chat completions host. The model is chosen per role.
#[derive(Debug, Clone)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

pub const OPENAI_HOST: &str = "https://api.openai.com";

impl OpenAiProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            host: OPENAI_HOST.to_string(),
            api_key: api_key.into(),
            temperature: None,
            max_tokens: None,
        }
    }
}
