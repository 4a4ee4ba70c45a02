use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Invalid value for {env_var}: {reason}")]
    InvalidValue { env_var: String, reason: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a dotted settings key such as `provider.api_key` to `STOCKBOT_PROVIDER__API_KEY`
pub fn to_env_var(field_path: &str) -> String {
    format!(
        "STOCKBOT_{}",
        field_path.replace('.', "__").to_uppercase()
    )
}
