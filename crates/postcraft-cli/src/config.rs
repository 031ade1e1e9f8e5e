use anyhow::{Context, Result};
use postcraft::providers::configs::{OpenAiProviderConfig, ProviderConfig, OPENAI_HOST};
use postcraft::search::SearchConfig;
use std::env;

/// A flag value, falling back to the environment
fn flag_or_env(flag: Option<&str>, env_var: &str) -> Option<String> {
    flag.map(str::to_string)
        .or_else(|| env::var(env_var).ok())
        .filter(|value| !value.trim().is_empty())
}

pub fn provider_config(api_key: Option<&str>, host: Option<&str>) -> Result<ProviderConfig> {
    let api_key = flag_or_env(api_key, "OPENAI_API_KEY")
        .context("API key must be provided via --api-key or OPENAI_API_KEY environment variable")?;
    let host = flag_or_env(host, "OPENAI_HOST").unwrap_or_else(|| OPENAI_HOST.to_string());

    let mut config = OpenAiProviderConfig::new(api_key);
    config.host = host;
    Ok(ProviderConfig::OpenAi(config))
}

pub fn search_config(api_key: Option<&str>) -> Result<SearchConfig> {
    let api_key = flag_or_env(api_key, "PERPLEXITY_API_KEY").context(
        "Search API key must be provided via --search-api-key or PERPLEXITY_API_KEY environment variable",
    )?;
    Ok(SearchConfig::new(api_key))
}
