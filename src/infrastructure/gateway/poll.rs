//! Poll-for-response over chat history.
//!
//! `chat.send` is asynchronous on the gateway: the immediate response is
//! just `{runId, status: "started"}`. This module is the single place the
//! async-response semantics live. Callers snapshot a baseline history
//! index, send, then poll history until a real assistant turn shows up
//! after the baseline.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::domain::error::GatewayError;

use super::client::GatewayClient;

/// Poll cadence.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Wall-clock cap for the whole poll.
pub const POLL_TOTAL: Duration = Duration::from_secs(180);
/// Consecutive no-activity polls before giving up early.
pub const QUIET_POLL_LIMIT: u32 = 20;

/// Extract the message list from a `chat.history` payload. The gateway
/// returns either a bare array or `{messages: [...]}`.
pub fn messages_of(history: &Value) -> Vec<Value> {
    match history {
        Value::Array(items) => items.clone(),
        Value::Object(_) => history
            .get("messages")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Flatten a message's text content. Content is either a plain string or a
/// list of blocks where text blocks carry `{type: "text", text}`.
pub fn message_text(message: &Value) -> String {
    match message.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// A message counts as a real LLM reply only if both `model` is set and the
/// text content is non-empty. Tool outputs (role=assistant with `model`
/// unset and JSON content) and empty thinking turns are skipped.
pub fn is_real_reply(message: &Value) -> bool {
    let has_model = message
        .get("model")
        .and_then(Value::as_str)
        .is_some_and(|m| !m.is_empty());
    has_model && !message_text(message).trim().is_empty()
}

/// Whether a reply carries `stopReason = "error"`; returns the error text.
pub fn reply_error(message: &Value) -> Option<String> {
    if message.get("stopReason").and_then(Value::as_str) == Some("error") {
        let text = message
            .get("errorMessage")
            .and_then(Value::as_str)
            .map_or_else(|| message_text(message), ToString::to_string);
        Some(text)
    } else {
        None
    }
}

/// Scan messages at `baseline` and beyond for the first real reply.
///
/// Returns `Err` immediately when the reply's stop reason is an error.
pub fn scan_for_reply(messages: &[Value], baseline: usize) -> Result<Option<Value>, GatewayError> {
    for message in messages.iter().skip(baseline) {
        if is_real_reply(message) {
            if let Some(error) = reply_error(message) {
                return Err(GatewayError::Remote { code: "error".to_string(), message: error });
            }
            return Ok(Some(message.clone()));
        }
    }
    Ok(None)
}

/// Latest assistant message with non-empty text at or after `baseline`,
/// model set or not. Used as the quiet-window fallback.
pub fn latest_assistant_text(messages: &[Value], baseline: usize) -> Option<Value> {
    messages
        .iter()
        .skip(baseline)
        .rev()
        .find(|m| {
            m.get("role").and_then(Value::as_str) == Some("assistant")
                && !message_text(m).trim().is_empty()
        })
        .cloned()
}

/// Current history length for a session; the baseline snapshot.
pub async fn baseline_index(
    client: &GatewayClient,
    session_key: &str,
) -> Result<usize, GatewayError> {
    let history = client.chat_history(session_key).await?;
    Ok(messages_of(&history).len())
}

/// Send `content` and poll history for the assistant's reply.
pub async fn send_and_poll(
    client: &GatewayClient,
    session_key: &str,
    content: &str,
) -> Result<Value, GatewayError> {
    let baseline = baseline_index(client, session_key).await.unwrap_or(0);
    client.chat_send(content, session_key, None).await?;
    poll_history(client, session_key, baseline).await
}

/// Poll history from a known baseline until a reply, quiet window, or the
/// 180 s cap.
pub async fn poll_history(
    client: &GatewayClient,
    session_key: &str,
    baseline: usize,
) -> Result<Value, GatewayError> {
    let deadline = tokio::time::Instant::now() + POLL_TOTAL;
    let mut quiet_polls: u32 = 0;
    let mut last_len = baseline;

    loop {
        if tokio::time::Instant::now() >= deadline {
            return Err(GatewayError::Timeout(POLL_TOTAL.as_secs()));
        }
        tokio::time::sleep(POLL_INTERVAL).await;

        let history = client.chat_history(session_key).await?;
        let messages = messages_of(&history);

        if let Some(reply) = scan_for_reply(&messages, baseline)? {
            return Ok(reply);
        }

        if messages.len() > last_len {
            quiet_polls = 0;
            last_len = messages.len();
        } else {
            quiet_polls += 1;
        }

        if quiet_polls >= QUIET_POLL_LIMIT {
            debug!(quiet_polls, "quiet window reached, taking latest assistant text");
            return latest_assistant_text(&messages, baseline)
                .ok_or(GatewayError::Timeout(POLL_TOTAL.as_secs()));
        }
    }
}
