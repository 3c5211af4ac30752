use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Chat-completion providers usable for text analysis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Openai,
    Grok,
    Gemini,
}

pub struct ProviderConfig {
    pub api_url: &'static str,
    pub model: &'static str,
    pub env_var: &'static str,
}

impl Provider {
    pub fn config(&self) -> ProviderConfig {
        match self {
            Provider::Openai => ProviderConfig {
                api_url: "https://api.openai.com/v1/chat/completions",
                model: "gpt-3.5-turbo",
                env_var: "OPENAI_API_KEY",
            },
            Provider::Grok => ProviderConfig {
                api_url: "https://api.x.ai/v1/chat/completions",
                model: "grok-4-fast",
                env_var: "XAI_API_KEY",
            },
            Provider::Gemini => ProviderConfig {
                api_url: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
                model: "gemini-2.5-flash",
                env_var: "GEMINI_API_KEY",
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Openai => "OpenAI",
            Provider::Grok => "Grok",
            Provider::Gemini => "Gemini",
        }
    }

    /// Read the API key for this provider from the environment
    pub fn api_key_from_env(&self) -> Option<String> {
        std::env::var(self.config().env_var)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// Ensure a key is present, naming the env var that should hold it
    pub fn require_api_key(&self, key: Option<&str>) -> Result<String, AnalysisError> {
        key.filter(|k| !k.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| AnalysisError::MissingApiKey {
                env_var: self.config().env_var.to_string(),
            })
    }
}

impl std::str::FromStr for Provider {
    type Err = crate::error::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::Openai),
            "grok" | "xai" => Ok(Provider::Grok),
            "gemini" => Ok(Provider::Gemini),
            other => Err(crate::error::ConfigError::UnknownPreset {
                kind: "provider",
                name: other.to_string(),
            }),
        }
    }
}
