//! Client for the external answer service the research role searches with.
//!
//! A search never fails from the caller's point of view: transport, status and
//! parse failures are folded into an `Error during research: ...` text that the
//! research role receives in place of an answer.

use anyhow::{anyhow, Result};
use chrono::{Datelike, Utc};
use indoc::formatdoc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const SEARCH_HOST: &str = "https://api.perplexity.ai";
pub const SEARCH_MODEL: &str = "llama-3.1-sonar-small-128k-online";
pub const SEARCH_RECENCY: &str = "day";

const TEMPERATURE: f64 = 0.2;
const TOP_P: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub recency_filter: String,
}

impl SearchConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            host: SEARCH_HOST.to_string(),
            api_key: api_key.into(),
            model: SEARCH_MODEL.to_string(),
            recency_filter: SEARCH_RECENCY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CitationRepr")]
pub struct Citation {
    pub title: String,
    pub url: String,
}

// The service has returned citations both as objects and as bare URLs
#[derive(Deserialize)]
#[serde(untagged)]
enum CitationRepr {
    Full { title: String, url: String },
    Url(String),
}

impl From<CitationRepr> for Citation {
    fn from(repr: CitationRepr) -> Self {
        match repr {
            CitationRepr::Full { title, url } => Citation { title, url },
            CitationRepr::Url(url) => Citation {
                title: url.clone(),
                url,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResponse {
    pub content: String,
    pub citations: Vec<Citation>,
}

impl SearchResponse {
    pub fn from_value(value: &Value) -> Result<Self> {
        let content = value
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice["message"]["content"].as_str())
            .ok_or_else(|| anyhow!("Response did not contain an answer"))?
            .to_string();

        let citations = match value.get("citations") {
            Some(citations) if !citations.is_null() => {
                serde_json::from_value::<Vec<Citation>>(citations.clone())?
            }
            _ => Vec::new(),
        };

        Ok(Self { content, citations })
    }
}

/// The answer followed by its sources, in the order the service returned them
pub fn format_search_response(response: &SearchResponse) -> String {
    let mut formatted = format!("{}\n\nSources:\n", response.content);
    for citation in &response.citations {
        formatted.push_str(&format!("- {}: {}\n", citation.title, citation.url));
    }
    formatted
}

/// Result of one search along with whether it fell back to an error text
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub text: String,
    pub degraded: bool,
}

pub struct SearchClient {
    client: Client,
    config: SearchConfig,
}

impl SearchClient {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    pub fn enhanced_query(topic: &str) -> String {
        format!("{} {} latest developments", topic, Utc::now().year())
    }

    fn system_prompt() -> String {
        let year = Utc::now().year();
        formatdoc! {"
            You are a professional research assistant focused on {year} developments.
            Prioritize information from {year}, and if not available, only use very recent sources.
            Ensure all insights and trends are current, verifiable and relevant to {year}.",
            year = year
        }
    }

    fn build_payload(&self, topic: &str) -> Value {
        json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": Self::system_prompt()},
                {"role": "user", "content": Self::enhanced_query(topic)}
            ],
            "temperature": TEMPERATURE,
            "top_p": TOP_P,
            "return_citations": true,
            "search_domain_filter": [],
            "return_images": false,
            "return_related_questions": false,
            "search_recency_filter": self.config.recency_filter,
            "stream": false
        })
    }

    async fn fetch(&self, topic: &str) -> Result<SearchResponse> {
        let url = format!("{}/chat/completions", self.config.host.trim_end_matches('/'));

        tracing::info!("Gathering information from reliable sources");
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&self.build_payload(topic))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Search request failed: {}", status));
        }

        let body: Value = response.json().await?;
        tracing::info!("Successfully gathered information");
        SearchResponse::from_value(&body)
    }

    /// Search for a topic, reporting whether the result is a degraded error text
    pub async fn search_outcome(&self, topic: &str) -> SearchOutcome {
        tracing::info!(topic, "Starting research");
        match self.fetch(topic).await {
            Ok(response) => {
                tracing::info!(
                    citations = response.citations.len(),
                    "Research compilation complete"
                );
                SearchOutcome {
                    text: format_search_response(&response),
                    degraded: false,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Research gathering error");
                SearchOutcome {
                    text: format!("Error during research: {}", e),
                    degraded: true,
                }
            }
        }
    }

    pub async fn search(&self, topic: &str) -> String {
        self.search_outcome(topic).await.text
    }
}
