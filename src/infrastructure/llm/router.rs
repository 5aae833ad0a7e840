//! Provider-agnostic LLM chat client.
//!
//! POSTs to `{base_url}/chat/completions` with Bearer auth; the active
//! provider's `model_override` wins over the caller's model. Provider
//! switches rebuild the resolved configuration in memory and rewrite the
//! matching `.env` keys on disk, without a process restart.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::error::LlmError;
use crate::infrastructure::deploy::env_file;

use super::settings::{LlmProvider, LlmSettings};

/// Default wall-clock budget for one chat call.
pub const DEFAULT_CHAT_TIMEOUT: Duration = Duration::from_secs(180);

/// One chat turn sent to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Result of `test_connection`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTest {
    pub ok: bool,
    pub models: Vec<String>,
    pub error: Option<String>,
}

pub struct LlmRouter {
    settings: RwLock<LlmSettings>,
    http: reqwest::Client,
    /// `.env` file provider switches persist into
    env_path: Option<PathBuf>,
}

impl LlmRouter {
    pub fn new(settings: LlmSettings, env_path: Option<PathBuf>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_CHAT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { settings: RwLock::new(settings), http, env_path }
    }

    /// Snapshot of the current settings.
    pub async fn settings(&self) -> LlmSettings {
        self.settings.read().await.clone()
    }

    /// Whether the active provider has every required field.
    pub async fn is_configured(&self) -> bool {
        self.settings.read().await.is_configured()
    }

    /// Chat completion returning the assistant's text.
    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
        timeout: Option<Duration>,
    ) -> Result<String, LlmError> {
        let resolved = self.settings.read().await.resolve()?;
        let effective_model = resolved.model_override.as_deref().unwrap_or(model);

        let body = json!({
            "model": effective_model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        debug!(model = effective_model, base = %resolved.base_url, "llm chat request");
        let response = self
            .http
            .post(format!("{}/chat/completions", resolved.base_url))
            .bearer_auth(&resolved.api_key)
            .timeout(timeout.unwrap_or(DEFAULT_CHAT_TIMEOUT))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status: status.as_u16(), message });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| LlmError::InvalidResponse("no assistant content".to_string()))?;

        if content.trim().is_empty() {
            return Err(LlmError::InvalidResponse("empty assistant content".to_string()));
        }
        Ok(content)
    }

    /// Chat completion parsed as JSON; retries once with a stricter prefix
    /// when the first output does not parse.
    pub async fn chat_json(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
        timeout: Option<Duration>,
    ) -> Result<Value, LlmError> {
        let text = self.chat(model, messages, temperature, max_tokens, timeout).await?;
        match parse_json_output(&text) {
            Ok(value) => Ok(value),
            Err(first_err) => {
                warn!(error = %first_err, "llm output not JSON, retrying with strict prefix");
                let mut strict: Vec<ChatMessage> = vec![ChatMessage::system(
                    "Output JSON only. No prose, no markdown fences, no explanations.",
                )];
                strict.extend_from_slice(messages);
                let retry =
                    self.chat(model, &strict, temperature, max_tokens, timeout).await?;
                parse_json_output(&retry).map_err(|e| LlmError::JsonParse(e.to_string()))
            }
        }
    }

    /// Probe the provider by listing its models.
    pub async fn test_connection(&self) -> ConnectionTest {
        let resolved = match self.settings.read().await.resolve() {
            Ok(resolved) => resolved,
            Err(e) => {
                return ConnectionTest { ok: false, models: Vec::new(), error: Some(e.to_string()) }
            }
        };

        let response = self
            .http
            .get(format!("{}/models", resolved.base_url))
            .bearer_auth(&resolved.api_key)
            .timeout(Duration::from_secs(15))
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                let payload: Value = response.json().await.unwrap_or(Value::Null);
                let models = payload
                    .get("data")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|m| m.get("id").and_then(Value::as_str))
                            .map(ToString::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                ConnectionTest { ok: true, models, error: None }
            }
            Ok(response) => ConnectionTest {
                ok: false,
                models: Vec::new(),
                error: Some(format!("HTTP {}", response.status())),
            },
            Err(e) => {
                ConnectionTest { ok: false, models: Vec::new(), error: Some(e.to_string()) }
            }
        }
    }

    /// Switch the active provider, updating fields in memory and rewriting
    /// the matching `.env` keys on disk. Takes effect on the next call.
    pub async fn switch_provider(
        &self,
        provider: LlmProvider,
        fields: HashMap<String, String>,
    ) -> Result<(), LlmError> {
        let updated = {
            let mut settings = self.settings.write().await;
            settings.provider = provider;
            apply_fields(&mut settings, &fields);
            settings.clone()
        };

        if let Some(env_path) = &self.env_path {
            let content = tokio::fs::read_to_string(env_path).await.unwrap_or_default();
            let rewritten = env_file::apply_updates(&content, &updated.env_updates());
            tokio::fs::write(env_path, rewritten)
                .await
                .map_err(|e| LlmError::RequestFailed(format!("persisting provider: {e}")))?;
        }
        Ok(())
    }
}

fn apply_fields(settings: &mut LlmSettings, fields: &HashMap<String, String>) {
    for (key, value) in fields {
        let value = Some(value.clone()).filter(|v| !v.is_empty());
        match key.as_str() {
            "OPENROUTER_BASE_URL" => settings.openrouter_base_url = value,
            "OPENROUTER_API_KEY" => settings.openrouter_api_key = value,
            "RUNPOD_API_KEY" => settings.runpod_api_key = value,
            "RUNPOD_ENDPOINT_ID" => settings.runpod_endpoint_id = value,
            "RUNPOD_MODEL_NAME" => settings.runpod_model_name = value,
            "CUSTOM_LLM_BASE_URL" => settings.custom_llm_base_url = value,
            "CUSTOM_LLM_API_KEY" => settings.custom_llm_api_key = value,
            "CUSTOM_LLM_MODEL_NAME" => settings.custom_llm_model_name = value,
            other => warn!(key = other, "ignoring unknown provider field"),
        }
    }
}

/// Strip markdown code fences and parse the remainder as JSON.
pub fn parse_json_output(text: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(&extract_json(text))
}

/// Extract the JSON payload from LLM output: drops ``` fences and trims to
/// the outermost braces/brackets when prose surrounds the object.
pub fn extract_json(text: &str) -> String {
    let mut cleaned = text.trim();

    if cleaned.starts_with("```") {
        // Drop the opening fence line and the closing fence.
        cleaned = cleaned
            .trim_start_matches("```json")
            .trim_start_matches("```JSON")
            .trim_start_matches("```");
        if let Some(end) = cleaned.rfind("```") {
            cleaned = &cleaned[..end];
        }
        cleaned = cleaned.trim();
    }

    if cleaned.starts_with('{') || cleaned.starts_with('[') {
        return cleaned.to_string();
    }

    // Prose around the object: take the outermost braces.
    let (open, close) = if cleaned.contains('{') { ('{', '}') } else { ('[', ']') };
    match (cleaned.find(open), cleaned.rfind(close)) {
        (Some(start), Some(end)) if end > start => cleaned[start..=end].to_string(),
        _ => cleaned.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json(r#"{"a": 1}"#), r#"{"a": 1}"#);
    }

    #[test]
    fn test_extract_json_fenced() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(text), r#"{"a": 1}"#);
    }

    #[test]
    fn test_extract_json_with_prose() {
        let text = "Here is the plan:\n{\"a\": 1}\nDone.";
        assert_eq!(extract_json(text), r#"{"a": 1}"#);
    }

    #[test]
    fn test_parse_json_output() {
        assert!(parse_json_output("```json\n[1,2]\n```").is_ok());
        assert!(parse_json_output("not json at all").is_err());
    }

    #[tokio::test]
    async fn test_chat_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"4"}}]}"#,
            )
            .create_async()
            .await;

        let settings = LlmSettings {
            provider: LlmProvider::Custom,
            custom_llm_base_url: Some(server.url()),
            custom_llm_api_key: Some("test-key".to_string()),
            custom_llm_model_name: Some("mock-model".to_string()),
            ..Default::default()
        };
        let router = LlmRouter::new(settings, None);

        let reply = router
            .chat("ignored-model", &[ChatMessage::user("2+2?")], 0.2, 256, None)
            .await
            .unwrap();
        assert_eq!(reply, "4");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_chat_surfaces_api_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("bad key")
            .create_async()
            .await;

        let settings = LlmSettings {
            provider: LlmProvider::Custom,
            custom_llm_base_url: Some(server.url()),
            custom_llm_api_key: Some("wrong".to_string()),
            custom_llm_model_name: Some("m".to_string()),
            ..Default::default()
        };
        let router = LlmRouter::new(settings, None);

        let err = router
            .chat("m", &[ChatMessage::user("hi")], 0.2, 64, None)
            .await
            .unwrap_err();
        match err {
            LlmError::ApiError { status, .. } => assert_eq!(status, 401),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_test_connection_lists_models() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/models")
            .with_status(200)
            .with_body(r#"{"data":[{"id":"model-a"},{"id":"model-b"}]}"#)
            .create_async()
            .await;

        let settings = LlmSettings {
            provider: LlmProvider::Custom,
            custom_llm_base_url: Some(server.url()),
            custom_llm_api_key: Some("k".to_string()),
            custom_llm_model_name: Some("m".to_string()),
            ..Default::default()
        };
        let router = LlmRouter::new(settings, None);

        let probe = router.test_connection().await;
        assert!(probe.ok);
        assert_eq!(probe.models, vec!["model-a", "model-b"]);
    }

    #[tokio::test]
    async fn test_switch_provider_rewrites_env() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join(".env");
        std::fs::write(&env_path, "# providers\nPORT=10001\nOPENROUTER_API_KEY=old\n").unwrap();

        let router = LlmRouter::new(LlmSettings::default(), Some(env_path.clone()));
        router
            .switch_provider(
                LlmProvider::Openrouter,
                HashMap::from([("OPENROUTER_API_KEY".to_string(), "new-key".to_string())]),
            )
            .await
            .unwrap();

        let content = std::fs::read_to_string(&env_path).unwrap();
        // Comment and unrelated keys preserved; matching key rewritten in place.
        assert!(content.starts_with("# providers\nPORT=10001\nOPENROUTER_API_KEY=new-key\n"));
        assert!(content.contains("LLM_PROVIDER=openrouter"));

        assert!(router.is_configured().await);
        assert_eq!(
            router.settings().await.openrouter_api_key.as_deref(),
            Some("new-key")
        );
    }
}
