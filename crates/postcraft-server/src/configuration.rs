use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use postcraft::providers::configs::{OpenAiProviderConfig, ProviderConfig, OPENAI_HOST};
use postcraft::roles::DEFAULT_MODEL;
use postcraft::search::{SearchConfig, SEARCH_HOST, SEARCH_MODEL, SEARCH_RECENCY};
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

/// The OpenAI-compatible backend every role runs on
#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_openai_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

impl ProviderSettings {
    pub fn into_config(self) -> Result<ProviderConfig, ConfigError> {
        Ok(ProviderConfig::OpenAi(OpenAiProviderConfig {
            host: self.host,
            api_key: required("provider.api_key", self.api_key)?,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }))
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_search_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_search_model")]
    pub model: String,
}

impl SearchSettings {
    pub fn into_config(self) -> Result<SearchConfig, ConfigError> {
        Ok(SearchConfig {
            host: self.host,
            api_key: required("search.api_key", self.api_key)?,
            model: self.model,
            recency_filter: SEARCH_RECENCY.to_string(),
        })
    }
}

fn required(key: &str, value: Option<String>) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar {
            env_var: to_env_var(key),
        })
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    pub search: SearchSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Backend defaults
            .set_default("provider.host", default_openai_host())?
            .set_default("provider.model", default_model())?
            .set_default("search.host", default_search_host())?
            .set_default("search.model", default_search_model())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("POSTCRAFT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // "missing field `api_key`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_openai_host() -> String {
    OPENAI_HOST.to_string()
}

fn default_search_host() -> String {
    SEARCH_HOST.to_string()
}

fn default_search_model() -> String {
    SEARCH_MODEL.to_string()
}
