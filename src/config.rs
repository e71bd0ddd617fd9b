//! Runtime configuration read from the environment.
//!
//! Variables (a `.env` file in the working directory is loaded first):
//! - `OPENAI_API_KEY` - required
//! - `AGENT_MODEL` - chat model, defaults to `gpt-4o-mini`
//! - `OPENAI_BASE_URL` - optional API base for OpenAI-compatible servers

use anyhow::{Result, bail};
use async_openai::config::OpenAIConfig;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Clone)]
pub struct AgentConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: Option<String>,
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let Some(api_key) = non_empty("OPENAI_API_KEY") else {
            bail!("Missing OPENAI_API_KEY. Copy .env.example to .env and set it.");
        };

        Ok(Self {
            api_key,
            model: non_empty("AGENT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base: non_empty("OPENAI_BASE_URL"),
        })
    }

    pub fn openai_config(&self) -> OpenAIConfig {
        let config = OpenAIConfig::new().with_api_key(&self.api_key);
        match &self.api_base {
            Some(base) => config.with_api_base(base),
            None => config,
        }
    }
}
