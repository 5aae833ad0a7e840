//! LLM provider settings and resolution.
//!
//! Three providers are supported; each resolves to a single effective
//! `{base_url, api_key, model_override}` so the wire call is shared.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::LlmError;

/// Default OpenRouter endpoint when no override is configured.
pub const OPENROUTER_DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Which provider is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Openrouter,
    Runpod,
    Custom,
}

impl Default for LlmProvider {
    fn default() -> Self {
        Self::Openrouter
    }
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openrouter => "openrouter",
            Self::Runpod => "runpod",
            Self::Custom => "custom",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openrouter" => Some(Self::Openrouter),
            "runpod" => Some(Self::Runpod),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Raw provider settings (mirrors the env keys).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub openrouter_base_url: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub runpod_api_key: Option<String>,
    pub runpod_endpoint_id: Option<String>,
    pub runpod_model_name: Option<String>,
    pub custom_llm_base_url: Option<String>,
    pub custom_llm_api_key: Option<String>,
    pub custom_llm_model_name: Option<String>,
}

/// One effective configuration for the wire call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLlm {
    pub base_url: String,
    pub api_key: String,
    /// When set, overrides the caller-supplied model
    pub model_override: Option<String>,
}

impl LlmSettings {
    /// Build settings from an env map (deployment `.env` or process env).
    pub fn from_env_map(env: &HashMap<String, String>) -> Self {
        let get = |key: &str| env.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            provider: get("LLM_PROVIDER")
                .and_then(|p| LlmProvider::parse_str(&p))
                .unwrap_or_default(),
            openrouter_base_url: get("OPENROUTER_BASE_URL"),
            openrouter_api_key: get("OPENROUTER_API_KEY"),
            runpod_api_key: get("RUNPOD_API_KEY"),
            runpod_endpoint_id: get("RUNPOD_ENDPOINT_ID"),
            runpod_model_name: get("RUNPOD_MODEL_NAME"),
            custom_llm_base_url: get("CUSTOM_LLM_BASE_URL"),
            custom_llm_api_key: get("CUSTOM_LLM_API_KEY"),
            custom_llm_model_name: get("CUSTOM_LLM_MODEL_NAME"),
        }
    }

    /// Env keys to persist when switching to the current provider.
    pub fn env_updates(&self) -> HashMap<String, String> {
        let mut updates =
            HashMap::from([("LLM_PROVIDER".to_string(), self.provider.as_str().to_string())]);
        let mut put = |key: &str, value: &Option<String>| {
            if let Some(value) = value {
                updates.insert(key.to_string(), value.clone());
            }
        };
        put("OPENROUTER_BASE_URL", &self.openrouter_base_url);
        put("OPENROUTER_API_KEY", &self.openrouter_api_key);
        put("RUNPOD_API_KEY", &self.runpod_api_key);
        put("RUNPOD_ENDPOINT_ID", &self.runpod_endpoint_id);
        put("RUNPOD_MODEL_NAME", &self.runpod_model_name);
        put("CUSTOM_LLM_BASE_URL", &self.custom_llm_base_url);
        put("CUSTOM_LLM_API_KEY", &self.custom_llm_api_key);
        put("CUSTOM_LLM_MODEL_NAME", &self.custom_llm_model_name);
        updates
    }

    /// Whether every required field for the active provider is present.
    pub fn is_configured(&self) -> bool {
        self.resolve().is_ok()
    }

    /// Resolve the active provider to one effective configuration.
    pub fn resolve(&self) -> Result<ResolvedLlm, LlmError> {
        let require = |value: &Option<String>, key: &'static str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| LlmError::NotConfigured(key.to_string()))
        };

        match self.provider {
            LlmProvider::Openrouter => Ok(ResolvedLlm {
                base_url: self
                    .openrouter_base_url
                    .clone()
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| OPENROUTER_DEFAULT_BASE_URL.to_string()),
                api_key: require(&self.openrouter_api_key, "OPENROUTER_API_KEY")?,
                model_override: None,
            }),
            LlmProvider::Runpod => {
                let endpoint_id = require(&self.runpod_endpoint_id, "RUNPOD_ENDPOINT_ID")?;
                Ok(ResolvedLlm {
                    base_url: format!("https://api.runpod.ai/v2/{endpoint_id}/openai/v1"),
                    api_key: require(&self.runpod_api_key, "RUNPOD_API_KEY")?,
                    // One model per endpoint; the caller's choice is ignored.
                    model_override: Some(require(&self.runpod_model_name, "RUNPOD_MODEL_NAME")?),
                })
            }
            LlmProvider::Custom => Ok(ResolvedLlm {
                base_url: require(&self.custom_llm_base_url, "CUSTOM_LLM_BASE_URL")?,
                api_key: require(&self.custom_llm_api_key, "CUSTOM_LLM_API_KEY")?,
                model_override: Some(require(
                    &self.custom_llm_model_name,
                    "CUSTOM_LLM_MODEL_NAME",
                )?),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openrouter_resolution() {
        let settings = LlmSettings {
            provider: LlmProvider::Openrouter,
            openrouter_api_key: Some("sk-or-1".to_string()),
            ..Default::default()
        };
        let resolved = settings.resolve().unwrap();
        assert_eq!(resolved.base_url, OPENROUTER_DEFAULT_BASE_URL);
        assert_eq!(resolved.api_key, "sk-or-1");
        // Caller-supplied model passes through
        assert_eq!(resolved.model_override, None);
    }

    #[test]
    fn test_openrouter_missing_key() {
        let settings =
            LlmSettings { provider: LlmProvider::Openrouter, ..Default::default() };
        let err = settings.resolve().unwrap_err();
        assert!(err.to_string().contains("OPENROUTER_API_KEY"));
        assert!(!settings.is_configured());
    }

    #[test]
    fn test_runpod_resolution_builds_url_and_override() {
        let settings = LlmSettings {
            provider: LlmProvider::Runpod,
            runpod_api_key: Some("rp-key".to_string()),
            runpod_endpoint_id: Some("ep123".to_string()),
            runpod_model_name: Some("llama-70b".to_string()),
            ..Default::default()
        };
        let resolved = settings.resolve().unwrap();
        assert_eq!(resolved.base_url, "https://api.runpod.ai/v2/ep123/openai/v1");
        assert_eq!(resolved.model_override.as_deref(), Some("llama-70b"));
    }

    #[test]
    fn test_runpod_requires_all_three() {
        let settings = LlmSettings {
            provider: LlmProvider::Runpod,
            runpod_api_key: Some("rp-key".to_string()),
            runpod_endpoint_id: Some("ep123".to_string()),
            ..Default::default()
        };
        assert!(settings.resolve().is_err());
    }

    #[test]
    fn test_custom_resolution() {
        let settings = LlmSettings {
            provider: LlmProvider::Custom,
            custom_llm_base_url: Some("http://localhost:8000/v1".to_string()),
            custom_llm_api_key: Some("local".to_string()),
            custom_llm_model_name: Some("qwen".to_string()),
            ..Default::default()
        };
        let resolved = settings.resolve().unwrap();
        assert_eq!(resolved.base_url, "http://localhost:8000/v1");
        assert_eq!(resolved.model_override.as_deref(), Some("qwen"));
    }

    #[test]
    fn test_from_env_map() {
        let env = HashMap::from([
            ("LLM_PROVIDER".to_string(), "runpod".to_string()),
            ("RUNPOD_API_KEY".to_string(), "k".to_string()),
            ("RUNPOD_ENDPOINT_ID".to_string(), "e".to_string()),
            ("RUNPOD_MODEL_NAME".to_string(), "m".to_string()),
            ("OPENROUTER_API_KEY".to_string(), String::new()),
        ]);
        let settings = LlmSettings::from_env_map(&env);
        assert_eq!(settings.provider, LlmProvider::Runpod);
        // Empty values are treated as unset
        assert_eq!(settings.openrouter_api_key, None);
        assert!(settings.is_configured());
    }

    #[test]
    fn test_env_updates_roundtrip() {
        let settings = LlmSettings {
            provider: LlmProvider::Custom,
            custom_llm_base_url: Some("http://h/v1".to_string()),
            custom_llm_api_key: Some("k".to_string()),
            custom_llm_model_name: Some("m".to_string()),
            ..Default::default()
        };
        let updates = settings.env_updates();
        assert_eq!(updates.get("LLM_PROVIDER").map(String::as_str), Some("custom"));
        let rebuilt = LlmSettings::from_env_map(&updates);
        assert!(rebuilt.is_configured());
        assert_eq!(rebuilt.resolve().unwrap(), settings.resolve().unwrap());
    }
}
