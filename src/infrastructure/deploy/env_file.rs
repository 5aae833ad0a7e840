//! `.env` file handling for deployments.
//!
//! The on-disk `.env` is the source of truth for a deployment's port, token
//! and name. Updates rewrite matching `KEY=VALUE` lines in place, preserving
//! comments, blank lines and ordering; new keys are appended at the end.

use std::collections::HashMap;
use std::path::Path;

use crate::domain::error::DeployError;

/// Parse `KEY=VALUE` lines into a map. Comments and blank lines are skipped;
/// values keep everything after the first `=`.
pub fn parse_env(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = trimmed.split_once('=') {
            map.insert(key.trim().to_string(), value.to_string());
        }
    }
    map
}

/// Apply updates to env file content, preserving untouched lines exactly.
///
/// Existing `KEY=...` lines are replaced in place; keys not present are
/// appended at the end. The result always ends with a single newline.
pub fn apply_updates(content: &str, updates: &HashMap<String, String>) -> String {
    let mut remaining: HashMap<&str, &str> =
        updates.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

    let mut lines: Vec<String> = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            if let Some((key, _)) = trimmed.split_once('=') {
                let key = key.trim();
                if let Some(value) = remaining.remove(key) {
                    lines.push(format!("{key}={value}"));
                    continue;
                }
            }
        }
        lines.push(line.to_string());
    }

    // Append new keys in a stable order.
    let mut new_keys: Vec<(&str, &str)> = remaining.into_iter().collect();
    new_keys.sort_unstable();
    for (key, value) in new_keys {
        lines.push(format!("{key}={value}"));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Serialize a fresh env map as `KEY=VALUE` lines. The well-known keys come
/// first so operators find them where they expect.
pub fn render_env(env: &HashMap<String, String>) -> String {
    const LEADING: &[&str] = &["PORT", "OPENCLAW_GATEWAY_TOKEN", "DEPLOY_NAME"];

    let mut lines = Vec::with_capacity(env.len());
    for key in LEADING {
        if let Some(value) = env.get(*key) {
            lines.push(format!("{key}={value}"));
        }
    }
    let mut rest: Vec<(&String, &String)> = env
        .iter()
        .filter(|(k, _)| !LEADING.contains(&k.as_str()))
        .collect();
    rest.sort_unstable();
    for (key, value) in rest {
        lines.push(format!("{key}={value}"));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Read and parse a deployment's `.env`.
pub async fn read_env(path: &Path) -> Result<HashMap<String, String>, DeployError> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(parse_env(&content))
}

/// Whether a key holds a secret worth masking.
pub fn is_sensitive_key(key: &str) -> bool {
    let upper = key.to_uppercase();
    upper.contains("KEY") || upper.contains("TOKEN") || upper.contains("SECRET")
}

/// Mask a secret value: values longer than 12 chars show first-8 + "…" +
/// last-4; shorter values are returned unchanged.
pub fn mask_value(value: &str) -> String {
    if value.chars().count() > 12 {
        let chars: Vec<char> = value.chars().collect();
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}…{tail}")
    } else {
        value.to_string()
    }
}

/// Produce the masked view of an env map.
pub fn mask_env(env: &HashMap<String, String>) -> HashMap<String, String> {
    env.iter()
        .map(|(k, v)| {
            let masked = if is_sensitive_key(k) { mask_value(v) } else { v.clone() };
            (k.clone(), masked)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_skips_comments() {
        let env = parse_env("# comment\nPORT=12345\n\nOPENROUTER_API_KEY=k1\n");
        assert_eq!(env.len(), 2);
        assert_eq!(env.get("PORT").map(String::as_str), Some("12345"));
        assert_eq!(env.get("OPENROUTER_API_KEY").map(String::as_str), Some("k1"));
    }

    #[test]
    fn test_parse_env_keeps_equals_in_value() {
        let env = parse_env("CUSTOM_LLM_BASE_URL=http://host/v1?a=b\n");
        assert_eq!(
            env.get("CUSTOM_LLM_BASE_URL").map(String::as_str),
            Some("http://host/v1?a=b")
        );
    }

    #[test]
    fn test_apply_updates_preserves_comments_and_order() {
        let content = "# comment\nPORT=12345\nOPENROUTER_API_KEY=k1\n";
        let updates = HashMap::from([("OPENROUTER_API_KEY".to_string(), "k2".to_string())]);
        let updated = apply_updates(content, &updates);
        assert_eq!(updated, "# comment\nPORT=12345\nOPENROUTER_API_KEY=k2\n");
    }

    #[test]
    fn test_apply_updates_appends_new_keys() {
        let content = "PORT=12345\n";
        let updates = HashMap::from([
            ("ANTHROPIC_API_KEY".to_string(), "sk-x".to_string()),
            ("TELEGRAM_BOT_TOKEN".to_string(), "t".to_string()),
        ]);
        let updated = apply_updates(content, &updates);
        assert_eq!(
            updated,
            "PORT=12345\nANTHROPIC_API_KEY=sk-x\nTELEGRAM_BOT_TOKEN=t\n"
        );
    }

    #[test]
    fn test_apply_then_parse_roundtrip() {
        let content = "# generated\nPORT=10001\nDEPLOY_NAME=brave-falcon\n";
        let updates = HashMap::from([("DEPLOY_NAME".to_string(), "calm-otter".to_string())]);
        let updated = apply_updates(content, &updates);
        let env = parse_env(&updated);
        assert_eq!(env.get("DEPLOY_NAME").map(String::as_str), Some("calm-otter"));
        assert_eq!(env.get("PORT").map(String::as_str), Some("10001"));
    }

    #[test]
    fn test_mask_value_boundaries() {
        // 12 chars or fewer: untouched
        assert_eq!(mask_value("shortvalue12"), "shortvalue12");
        // 13 chars: masked
        assert_eq!(mask_value("0123456789abc"), "01234567…9abc");
        let long = "sk-or-v1-0123456789abcdef0123456789abcdef";
        let masked = mask_value(long);
        assert!(masked.starts_with("sk-or-v1"));
        assert!(masked.ends_with("cdef"));
        assert!(masked.contains('…'));
    }

    #[test]
    fn test_mask_is_deterministic() {
        let v = "0123456789abcdef0123456789abcdef";
        assert_eq!(mask_value(v), mask_value(v));
    }

    #[test]
    fn test_mask_env_only_touches_sensitive_keys() {
        let env = HashMap::from([
            ("PORT".to_string(), "123456789012345".to_string()),
            ("OPENCLAW_GATEWAY_TOKEN".to_string(), "0123456789abcdef0123456789abcdef".to_string()),
        ]);
        let masked = mask_env(&env);
        // PORT is long but not sensitive
        assert_eq!(masked.get("PORT").map(String::as_str), Some("123456789012345"));
        assert!(masked.get("OPENCLAW_GATEWAY_TOKEN").unwrap().contains('…'));
    }

    #[test]
    fn test_render_env_leading_keys_first() {
        let env = HashMap::from([
            ("OPENROUTER_API_KEY".to_string(), "k".to_string()),
            ("DEPLOY_NAME".to_string(), "calm-otter".to_string()),
            ("PORT".to_string(), "10001".to_string()),
            ("OPENCLAW_GATEWAY_TOKEN".to_string(), "tok".to_string()),
        ]);
        let rendered = render_env(&env);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "PORT=10001");
        assert_eq!(lines[1], "OPENCLAW_GATEWAY_TOKEN=tok");
        assert_eq!(lines[2], "DEPLOY_NAME=calm-otter");
        assert_eq!(lines[3], "OPENROUTER_API_KEY=k");
    }
}
