//! Domain error types for the clawdeck control plane.
//!
//! This module defines all error types using thiserror for structured error
//! handling. Each error enum represents errors from a specific domain or
//! infrastructure component.

use thiserror::Error;

/// Errors surfaced by the gateway RPC client.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No live socket to the gateway
    #[error("Gateway not connected")]
    NotConnected,

    /// RPC call or response poll exceeded its budget
    #[error("Gateway request timed out after {0} seconds")]
    Timeout(u64),

    /// Gateway answered with ok=false
    #[error("Gateway error {code}: {message}")]
    Remote { code: String, message: String },

    /// Challenge/connect handshake failed
    #[error("Gateway handshake failed: {0}")]
    Handshake(String),

    /// Cloudflare Access intercepted the connection
    #[error("Cloudflare Access blocked the connection: {0}. Check CF-Access credentials or the CF_Authorization cookie")]
    CloudflareAccessBlocked(String),

    /// WebSocket transport failure
    #[error("Gateway transport error: {0}")]
    Transport(String),

    /// Frame could not be encoded or decoded
    #[error("Gateway protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Returns true if this error is transient and the call may succeed on a
    /// fresh connection.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::Timeout(_) | Self::Transport(_)
        )
    }

    /// Returns true if this error is permanent (reconnecting will not help).
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::CloudflareAccessBlocked(_))
    }
}

/// Errors from compose subprocess invocations.
#[derive(Error, Debug)]
pub enum ComposeError {
    /// Neither `docker compose` nor `docker-compose` is available
    #[error("No compose CLI found: {0}. Install the docker-compose-v2 plugin (apt-get install docker-compose-v2) or docker-compose")]
    NotAvailable(String),

    /// Subprocess exited non-zero
    #[error("compose {subcommand} failed (rc={rc}): {stderr}")]
    CommandFailed {
        subcommand: String,
        rc: i32,
        stderr: String,
    },

    /// rc=0 but stderr contained an error marker
    #[error("compose {subcommand} reported an error despite rc=0: {stderr}")]
    ErrorInStderr { subcommand: String, stderr: String },

    /// Subprocess could not be spawned or timed out
    #[error("compose {subcommand} did not complete: {reason}")]
    Spawn { subcommand: String, reason: String },
}

/// Errors from the deployment manager.
#[derive(Error, Debug)]
pub enum DeployError {
    /// Unknown deployment id
    #[error("Deployment not found: {0}")]
    NotFound(String),

    /// Port allocation exhausted its retry budget
    #[error("Could not allocate a free port in {0} attempts")]
    PortExhausted(u32),

    /// The deployment directory or .env is missing/invalid
    #[error("Deployment directory invalid: {0}")]
    InvalidDirectory(String),

    /// Compose invocation failed
    #[error(transparent)]
    Compose(#[from] ComposeError),

    /// Filesystem operation failed
    #[error("Deployment I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the LLM router.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Active provider is missing required settings
    #[error("LLM provider not configured: {0}")]
    NotConfigured(String),

    /// HTTP request failed
    #[error("LLM request failed: {0}")]
    RequestFailed(String),

    /// Provider returned a non-success status
    #[error("LLM API error {status}: {message}")]
    ApiError { status: u16, message: String },

    /// Response body had no usable assistant content
    #[error("LLM response invalid: {0}")]
    InvalidResponse(String),

    /// Response could not be parsed as JSON after retry
    #[error("LLM output is not valid JSON: {0}")]
    JsonParse(String),
}

impl LlmError {
    /// Returns true if this error is transient and should be retried.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(_) => true,
            Self::ApiError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Errors from the mission/agent store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Record not found
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Illegal state machine transition; this is a caller bug
    #[error("Invalid {kind} status transition from {from} to {to}")]
    InvariantViolation {
        kind: &'static str,
        from: String,
        to: String,
    },

    /// Structural invariant broken (cycles, duplicate master, orphan sub)
    #[error("Store invariant violated: {0}")]
    Integrity(String),

    /// Underlying query failed
    #[error("Store query failed: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored value could not be decoded
    #[error("Store parse error: {0}")]
    Parse(String),
}

/// Errors from the planner.
#[derive(Error, Debug)]
pub enum PlanError {
    /// Planner output did not parse; callers fall back to a single subtask
    #[error("Plan output did not parse: {0}")]
    ParseFailed(String),

    /// The LLM call itself failed
    #[error(transparent)]
    Llm(#[from] LlmError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::Remote {
            code: "INVALID_REQUEST".to_string(),
            message: "at /client/id: must be equal to constant".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Gateway error INVALID_REQUEST: at /client/id: must be equal to constant"
        );

        let err = GatewayError::Timeout(30);
        assert_eq!(err.to_string(), "Gateway request timed out after 30 seconds");
    }

    #[test]
    fn test_gateway_error_classification() {
        assert!(GatewayError::NotConnected.is_transient());
        assert!(GatewayError::Timeout(30).is_transient());
        assert!(GatewayError::Transport("reset".to_string()).is_transient());
        assert!(!GatewayError::Handshake("bad nonce".to_string()).is_transient());

        assert!(GatewayError::CloudflareAccessBlocked("redirect".to_string()).is_permanent());
        assert!(!GatewayError::Timeout(30).is_permanent());
    }

    #[test]
    fn test_compose_error_display() {
        let err = ComposeError::ErrorInStderr {
            subcommand: "up".to_string(),
            stderr: "Error: container name already in use".to_string(),
        };
        assert!(err.to_string().contains("despite rc=0"));
    }

    #[test]
    fn test_llm_error_transience() {
        assert!(LlmError::RequestFailed("conn refused".to_string()).is_transient());
        assert!(LlmError::ApiError { status: 503, message: "overloaded".to_string() }.is_transient());
        assert!(LlmError::ApiError { status: 429, message: "slow down".to_string() }.is_transient());
        assert!(!LlmError::ApiError { status: 401, message: "bad key".to_string() }.is_transient());
        assert!(!LlmError::NotConfigured("OPENROUTER_API_KEY".to_string()).is_transient());
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::NotFound { kind: "mission", id: "ab12cd34".to_string() };
        assert_eq!(err.to_string(), "mission not found: ab12cd34");

        let err = StoreError::InvariantViolation {
            kind: "mission",
            from: "completed".to_string(),
            to: "active".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid mission status transition from completed to active"
        );
    }
}
