use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use stockbot::{
    agent::{AgentConfig, DEFAULT_MAX_CYCLES},
    executor::ToolFailurePolicy,
    models::tool::Tool,
    prompt_template::load_prompt_file,
    providers::{
        configs::{
            GoogleProviderConfig, OpenAiProviderConfig, ProviderConfig, GOOGLE_HOST, GOOGLE_MODEL,
            OPENAI_HOST, OPENAI_MODEL,
        },
        factory::ProviderType,
    },
    tools::search::{SearchConfig, TAVILY_HOST},
};

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        #[serde(default)]
        api_key: String,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    Google {
        #[serde(default = "default_google_host")]
        host: String,
        #[serde(default)]
        api_key: String,
        #[serde(default = "default_google_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderSettings::OpenAi { .. } => ProviderType::OpenAi,
            ProviderSettings::Google { .. } => ProviderType::Google,
        }
    }

    fn api_key(&self) -> &str {
        match self {
            ProviderSettings::OpenAi { api_key, .. } | ProviderSettings::Google { api_key, .. } => {
                api_key
            }
        }
    }

    // Convert to the stockbot ProviderConfig
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::Google {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Google(GoogleProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_search_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_include_answer")]
    pub include_answer: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            host: default_search_host(),
            api_key: String::new(),
            max_results: default_max_results(),
            include_answer: default_include_answer(),
        }
    }
}

impl SearchSettings {
    pub fn into_config(self) -> SearchConfig {
        SearchConfig {
            host: self.host,
            api_key: self.api_key,
            max_results: self.max_results,
            include_answer: self.include_answer,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_cycles")]
    pub max_cycles: usize,
    #[serde(default)]
    pub tool_failure_policy: ToolFailurePolicy,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Tera template rendered with the registered `tools`
    #[serde(default)]
    pub system_prompt_file: Option<PathBuf>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
            tool_failure_policy: ToolFailurePolicy::default(),
            system_prompt: None,
            system_prompt_file: None,
        }
    }
}

impl AgentSettings {
    /// Build the agent config. An inline prompt wins over a prompt file.
    pub fn into_config(self, tools: &[Tool]) -> anyhow::Result<AgentConfig> {
        let system_prompt = match (self.system_prompt, self.system_prompt_file) {
            (Some(prompt), _) => Some(prompt),
            (None, Some(path)) => {
                let mut context = HashMap::new();
                context.insert("tools", tools);
                Some(load_prompt_file(path, &context)?.trim().to_string())
            }
            (None, None) => None,
        };

        Ok(AgentConfig {
            system_prompt,
            max_cycles: self.max_cycles,
            tool_failure_policy: self.tool_failure_policy,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub agent: AgentSettings,
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
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("STOCKBOT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = match config.try_deserialize() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                if let Some(field) = missing_field(&err.to_string()) {
                    return Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(&field),
                    });
                }
                if let config::ConfigError::NotFound(field) = &err {
                    return Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    });
                }
                return Err(ConfigError::Other(err));
            }
        };

        // Keys default to empty so the error can name the exact variable
        if settings.provider.api_key().is_empty() {
            return Err(ConfigError::MissingEnvVar {
                env_var: to_env_var("provider.api_key"),
            });
        }
        if settings.search.api_key.is_empty() {
            return Err(ConfigError::MissingEnvVar {
                env_var: to_env_var("search.api_key"),
            });
        }
        if settings.agent.max_cycles == 0 {
            return Err(ConfigError::InvalidValue {
                env_var: to_env_var("agent.max_cycles"),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(settings)
    }
}

/// Extract the settings path from "missing field `type`" or
/// "missing field `type` for key `provider`"
fn missing_field(message: &str) -> Option<String> {
    let rest = message.strip_prefix("missing field `")?;
    let (field, rest) = rest.split_once('`')?;
    let field = match rest
        .strip_prefix(" for key `")
        .and_then(|key| key.split_once('`'))
    {
        Some((key, _)) => format!("{}.{}", key, field),
        None => field.to_string(),
    };

    // Without a provider section the first thing to set is its type
    if field == "provider" {
        Some("provider.type".to_string())
    } else {
        Some(field)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_openai_host() -> String {
    OPENAI_HOST.to_string()
}

fn default_openai_model() -> String {
    OPENAI_MODEL.to_string()
}

fn default_google_host() -> String {
    GOOGLE_HOST.to_string()
}

fn default_google_model() -> String {
    GOOGLE_MODEL.to_string()
}

fn default_search_host() -> String {
    TAVILY_HOST.to_string()
}

fn default_max_results() -> u32 {
    3
}

fn default_include_answer() -> bool {
    true
}

fn default_max_cycles() -> usize {
    DEFAULT_MAX_CYCLES
}
