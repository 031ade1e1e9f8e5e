use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// The environment variable that sets a dotted configuration key,
/// e.g. `provider.api_key` -> `POSTCRAFT_PROVIDER__API_KEY`
pub fn to_env_var(field: &str) -> String {
    format!("POSTCRAFT_{}", field.replace('.', "__").to_uppercase())
}
