//! Gateway RPC client.
//!
//! Maintains a single authenticated framed WebSocket to one gateway
//! endpoint, exposes typed RPC methods, and surfaces the event stream to a
//! registered handler through a bounded queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backoff::ExponentialBackoff;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::error::GatewayError;

use super::event_queue::{
    EventQueue, GatewayEvent, SeqObservation, SeqTracker, GAP_ERROR_THRESHOLD,
};
use super::frame::Frame;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type PendingSender = oneshot::Sender<Result<Value, GatewayError>>;
type EventHandler = Arc<dyn Fn(GatewayEvent) + Send + Sync>;

/// Default timeout for RPC calls.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for `chat.send` (the gateway acks asynchronously but slowly under load).
pub const CHAT_SEND_TIMEOUT: Duration = Duration::from_secs(120);
/// Wait budget for the `connect.challenge` frame.
const CHALLENGE_TIMEOUT: Duration = Duration::from_secs(15);
/// Wait budget for the connect response.
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);
/// Reconnect attempt cap.
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Which `client.id` the gateway expects.
///
/// Control-plane-managed local containers accept only `"cli"`; external
/// gateways accept only `"gateway-client"`. Other values are rejected with
/// `INVALID_REQUEST: at /client/id: must be equal to constant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIdent {
    /// Local container managed by this control plane
    Cli,
    /// External gateway
    GatewayClient,
}

impl ClientIdent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::GatewayClient => "gateway-client",
        }
    }
}

/// Connection settings for one gateway.
#[derive(Debug, Clone)]
pub struct GatewayClientConfig {
    /// `ws://` or `wss://` endpoint
    pub url: String,
    /// Gateway auth token (from the deployment `.env`)
    pub token: String,
    /// `client.id` value to present
    pub ident: ClientIdent,
    /// Cloudflare Access service token id
    pub cf_access_client_id: Option<String>,
    /// Cloudflare Access service token secret (also sent as the
    /// `CF_Authorization` cookie fallback)
    pub cf_access_client_secret: Option<String>,
    /// Default RPC timeout
    pub default_timeout: Duration,
}

impl GatewayClientConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            ident: ClientIdent::Cli,
            cf_access_client_id: None,
            cf_access_client_secret: None,
            default_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_ident(mut self, ident: ClientIdent) -> Self {
        self.ident = ident;
        self
    }

    pub fn with_cf_access(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.cf_access_client_id = Some(client_id.into());
        self.cf_access_client_secret = Some(client_secret.into());
        self
    }
}

struct ClientInner {
    config: GatewayClientConfig,
    pending: Mutex<HashMap<String, PendingSender>>,
    queue: EventQueue,
    seq: SeqTracker,
    connected: AtomicBool,
    closing: AtomicBool,
    writer: tokio::sync::Mutex<Option<WsSink>>,
    handler: Mutex<Option<EventHandler>>,
    hello: Mutex<Option<Value>>,
}

/// The gateway RPC client. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient").finish_non_exhaustive()
    }
}

impl GatewayClient {
    /// Connect and complete the challenge/connect handshake.
    pub async fn connect(config: GatewayClientConfig) -> Result<Self, GatewayError> {
        let inner = Arc::new(ClientInner {
            config,
            pending: Mutex::new(HashMap::new()),
            queue: EventQueue::default(),
            seq: SeqTracker::new(),
            connected: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            writer: tokio::sync::Mutex::new(None),
            handler: Mutex::new(None),
            hello: Mutex::new(None),
        });

        let (sink, source, hello) = open_socket(&inner.config).await?;
        *inner.writer.lock().await = Some(sink);
        *inner.hello.lock().expect("hello lock") = Some(hello);
        inner.connected.store(true, Ordering::SeqCst);

        let client = Self { inner };
        client.spawn_read_loop(source);
        client.spawn_event_worker();
        Ok(client)
    }

    /// Register the handler the event worker dispatches to.
    pub fn set_event_handler(&self, handler: impl Fn(GatewayEvent) + Send + Sync + 'static) {
        *self.inner.handler.lock().expect("handler lock") = Some(Arc::new(handler));
    }

    /// Whether a live socket exists right now.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// The hello payload from the last successful handshake.
    pub fn hello(&self) -> Option<Value> {
        self.inner.hello.lock().expect("hello lock").clone()
    }

    /// Events evicted from the queue because the handler fell behind.
    pub fn dropped_events(&self) -> u64 {
        self.inner.queue.dropped_events()
    }

    /// Last observed event sequence number (−1 after connect/reconnect).
    pub fn last_seq(&self) -> i64 {
        self.inner.seq.last_seq()
    }

    /// Close the connection deliberately; no reconnect follows.
    pub async fn close(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        self.inner.connected.store(false, Ordering::SeqCst);
        if let Some(mut sink) = self.inner.writer.lock().await.take() {
            let _ = sink.send(Message::Close(None)).await;
        }
        self.inner.fail_pending("connection closed");
    }

    /// Issue one RPC and await its correlated response.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::NotConnected);
        }

        let id = Uuid::new_v4().to_string();
        let frame = Frame::req(id.clone(), method, params);
        let text = frame.encode().map_err(|e| GatewayError::Protocol(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().expect("pending lock").insert(id.clone(), tx);

        {
            let mut writer = self.inner.writer.lock().await;
            let Some(sink) = writer.as_mut() else {
                self.inner.pending.lock().expect("pending lock").remove(&id);
                return Err(GatewayError::NotConnected);
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                self.inner.pending.lock().expect("pending lock").remove(&id);
                return Err(GatewayError::Transport(e.to_string()));
            }
        }

        let budget = timeout.unwrap_or(self.inner.config.default_timeout);
        match tokio::time::timeout(budget, rx).await {
            // Entry stays in the pending map; a late response is discarded
            // when it finally routes to the dropped receiver.
            Err(_) => Err(GatewayError::Timeout(budget.as_secs())),
            Ok(Err(_)) => Err(GatewayError::Transport("connection lost".to_string())),
            Ok(Ok(result)) => result,
        }
    }

    fn spawn_read_loop(&self, source: WsSource) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            read_loop(inner, source).await;
        });
    }

    fn spawn_event_worker(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                let event = inner.queue.pop().await;
                let handler = inner.handler.lock().expect("handler lock").clone();
                if let Some(handler) = handler {
                    handler(event);
                }
            }
        });
    }

    // ---- convenience RPCs ----

    pub async fn status(&self) -> Result<Value, GatewayError> {
        self.call("status", json!({}), None).await
    }

    pub async fn health(&self) -> Result<Value, GatewayError> {
        self.call("health", json!({}), None).await
    }

    /// Fetch config; payload is `{raw, parsed, hash, valid, issues}`.
    pub async fn get_config(&self) -> Result<Value, GatewayError> {
        self.call("config.get", json!({}), None).await
    }

    /// Replace config; `base_hash` is optimistic concurrency and the server
    /// rejects on mismatch.
    pub async fn set_config(&self, raw: &str, base_hash: &str) -> Result<Value, GatewayError> {
        self.call("config.set", json!({"raw": raw, "baseHash": base_hash}), None).await
    }

    pub async fn patch_config(
        &self,
        raw: &str,
        base_hash: &str,
        restart_delay_ms: u64,
    ) -> Result<Value, GatewayError> {
        self.call(
            "config.patch",
            json!({"raw": raw, "baseHash": base_hash, "restartDelayMs": restart_delay_ms}),
            None,
        )
        .await
    }

    pub async fn get_agents(&self) -> Result<Value, GatewayError> {
        self.call("agents.list", json!({}), None).await
    }

    pub async fn get_sessions(&self) -> Result<Value, GatewayError> {
        self.call("sessions.list", json!({}), None).await
    }

    pub async fn get_models(&self) -> Result<Value, GatewayError> {
        self.call("models.list", json!({}), None).await
    }

    pub async fn get_agent_files(&self, agent_id: &str) -> Result<Value, GatewayError> {
        self.call("agents.files.list", json!({"agentId": agent_id}), None).await
    }

    pub async fn get_agent_file(&self, agent_id: &str, name: &str) -> Result<Value, GatewayError> {
        self.call("agents.files.get", json!({"agentId": agent_id, "name": name}), None).await
    }

    pub async fn set_agent_file(
        &self,
        agent_id: &str,
        name: &str,
        content: &str,
    ) -> Result<Value, GatewayError> {
        self.call(
            "agents.files.set",
            json!({"agentId": agent_id, "name": name, "content": content}),
            None,
        )
        .await
    }

    /// Send a chat message. Asynchronous on the gateway side: the immediate
    /// payload is `{runId, status: "started"}` and callers must poll
    /// `chat_history` for the actual assistant turn.
    pub async fn chat_send(
        &self,
        content: &str,
        session_key: &str,
        idempotency_key: Option<String>,
    ) -> Result<Value, GatewayError> {
        let idempotency_key = idempotency_key.unwrap_or_else(|| Uuid::new_v4().to_string());
        // `kind` must not be set; the gateway rejects it.
        self.call(
            "chat.send",
            json!({
                "sessionKey": session_key,
                "idempotencyKey": idempotency_key,
                "content": content,
            }),
            Some(CHAT_SEND_TIMEOUT),
        )
        .await
    }

    pub async fn chat_history(&self, session_key: &str) -> Result<Value, GatewayError> {
        self.call("chat.history", json!({"sessionKey": session_key}), None).await
    }

    pub async fn chat_abort(&self, session_key: &str) -> Result<Value, GatewayError> {
        self.call("chat.abort", json!({"sessionKey": session_key}), None).await
    }

    pub async fn read_file(&self, path: &str) -> Result<Value, GatewayError> {
        self.call("files.read", json!({"path": path}), None).await
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<Value, GatewayError> {
        self.call("files.write", json!({"path": path, "content": content}), None).await
    }
}

impl ClientInner {
    /// Fail every pending request with a connection-lost error.
    fn fail_pending(&self, reason: &str) {
        let mut pending = self.pending.lock().expect("pending lock");
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(GatewayError::Transport(reason.to_string())));
        }
    }

    fn handle_text(&self, text: &str) {
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "undecodable gateway frame");
                return;
            }
        };

        match frame {
            Frame::Res { id, ok, payload, error } => {
                let sender = self.pending.lock().expect("pending lock").remove(&id);
                match sender {
                    Some(tx) => {
                        let result = if ok {
                            Ok(payload.unwrap_or(Value::Null))
                        } else {
                            let (code, message) = error_body(error);
                            Err(GatewayError::Remote { code, message })
                        };
                        // A dropped receiver means the caller timed out; the
                        // late response is discarded here.
                        let _ = tx.send(result);
                    }
                    None => {
                        debug!(id = %id, "response for unknown request id dropped");
                    }
                }
            }
            Frame::Event { event, payload, seq } => {
                let seq = seq.unwrap_or(-1);
                if seq >= 0 {
                    match self.seq.observe(seq) {
                        SeqObservation::Normal => {}
                        SeqObservation::Gap(gap) if gap < GAP_ERROR_THRESHOLD => {
                            info!(gap, seq, "event sequence gap; history poller will catch up");
                        }
                        SeqObservation::Gap(gap) => {
                            error!(gap, seq, "large event sequence gap");
                        }
                    }
                }
                self.queue.push(GatewayEvent { event, payload, seq });
            }
            Frame::Req { method, .. } => {
                warn!(method = %method, "unexpected req frame from server");
            }
        }
    }
}

fn error_body(error: Option<super::frame::RemoteErrorBody>) -> (String, String) {
    match error {
        Some(body) => (body.code, body.message),
        None => ("UNKNOWN".to_string(), "unspecified gateway error".to_string()),
    }
}

/// Whether an error string points at a Cloudflare Access interception.
fn is_cloudflare_blocked(text: &str) -> bool {
    text.contains("cloudflareaccess.com")
}

/// Open the socket and run the challenge/connect handshake.
async fn open_socket(
    config: &GatewayClientConfig,
) -> Result<(WsSink, WsSource, Value), GatewayError> {
    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| GatewayError::Handshake(format!("bad url: {e}")))?;

    if let (Some(id), Some(secret)) =
        (&config.cf_access_client_id, &config.cf_access_client_secret)
    {
        let headers = request.headers_mut();
        headers.insert(
            "CF-Access-Client-Id",
            id.parse().map_err(|_| GatewayError::Handshake("bad CF id header".to_string()))?,
        );
        headers.insert(
            "CF-Access-Client-Secret",
            secret
                .parse()
                .map_err(|_| GatewayError::Handshake("bad CF secret header".to_string()))?,
        );
        // Cookie fallback for edges that only honor CF_Authorization.
        headers.insert(
            "Cookie",
            format!("CF_Authorization={secret}")
                .parse()
                .map_err(|_| GatewayError::Handshake("bad cookie header".to_string()))?,
        );
    }

    let (ws, _response) = connect_async(request).await.map_err(|e| {
        let text = e.to_string();
        if is_cloudflare_blocked(&text) {
            GatewayError::CloudflareAccessBlocked(text)
        } else {
            GatewayError::Handshake(text)
        }
    })?;

    let (mut sink, mut source) = ws.split();

    // Step 1: the server opens with connect.challenge.
    let challenge = next_frame(&mut source, CHALLENGE_TIMEOUT).await?;
    let nonce = match challenge {
        Frame::Event { ref event, ref payload, .. } if event == "connect.challenge" => payload
            .as_ref()
            .and_then(|p| p.get("nonce"))
            .and_then(|n| n.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| GatewayError::Handshake("challenge without nonce".to_string()))?,
        other => {
            return Err(GatewayError::Handshake(format!(
                "expected connect.challenge, got {other:?}"
            )))
        }
    };
    debug!(nonce = %nonce, "received connect challenge");

    // Step 2: answer with the connect request.
    let connect_id = Uuid::new_v4().to_string();
    let params = json!({
        "minProtocol": 3,
        "maxProtocol": 3,
        "client": {
            "id": config.ident.as_str(),
            "version": env!("CARGO_PKG_VERSION"),
            "platform": std::env::consts::OS,
            "mode": "backend",
            "instanceId": Uuid::new_v4().to_string(),
        },
        "role": "operator",
        "scopes": ["operator.admin", "operator.approvals", "operator.pairing"],
        "auth": {"token": config.token},
        "userAgent": concat!("clawdeck/", env!("CARGO_PKG_VERSION")),
        "locale": "en",
    });
    let connect = Frame::req(connect_id.clone(), "connect", params);
    sink.send(Message::Text(
        connect.encode().map_err(|e| GatewayError::Protocol(e.to_string()))?,
    ))
    .await
    .map_err(|e| GatewayError::Handshake(e.to_string()))?;

    // Step 3: expect the hello response.
    let deadline = tokio::time::Instant::now() + HELLO_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(GatewayError::Handshake("no hello before timeout".to_string()));
        }
        match next_frame(&mut source, remaining).await? {
            Frame::Res { id, ok, payload, error } if id == connect_id => {
                if !ok {
                    let (code, message) = error_body(error);
                    return Err(GatewayError::Handshake(format!("{code}: {message}")));
                }
                let hello = payload.unwrap_or(Value::Null);
                info!(
                    server = %hello.pointer("/server/version").and_then(serde_json::Value::as_str).unwrap_or("?"),
                    "gateway handshake complete"
                );
                return Ok((sink, source, hello));
            }
            // Stray events during handshake are legal; drop them.
            Frame::Event { .. } => continue,
            other => {
                return Err(GatewayError::Handshake(format!("unexpected frame {other:?}")));
            }
        }
    }
}

async fn next_frame(source: &mut WsSource, budget: Duration) -> Result<Frame, GatewayError> {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(GatewayError::Handshake("timed out waiting for frame".to_string()));
        }
        let msg = tokio::time::timeout(remaining, source.next())
            .await
            .map_err(|_| GatewayError::Handshake("timed out waiting for frame".to_string()))?
            .ok_or_else(|| GatewayError::Handshake("socket closed during handshake".to_string()))?
            .map_err(|e| {
                let text = e.to_string();
                if is_cloudflare_blocked(&text) {
                    GatewayError::CloudflareAccessBlocked(text)
                } else {
                    GatewayError::Handshake(text)
                }
            })?;
        match msg {
            Message::Text(text) => {
                return Frame::decode(&text).map_err(|e| GatewayError::Protocol(e.to_string()))
            }
            Message::Close(frame) => {
                let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                if is_cloudflare_blocked(&reason) {
                    return Err(GatewayError::CloudflareAccessBlocked(reason));
                }
                return Err(GatewayError::Handshake(format!("closed during handshake: {reason}")));
            }
            _ => continue,
        }
    }
}

fn read_loop(
    inner: Arc<ClientInner>,
    source: WsSource,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(read_loop_impl(inner, source))
}

async fn read_loop_impl(inner: Arc<ClientInner>, mut source: WsSource) {
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => inner.handle_text(&text),
            Some(Ok(Message::Close(frame))) => {
                // 1008 "slow consumer" is treated like any unexpected close:
                // the reconnect path takes over.
                if let Some(frame) = frame {
                    if frame.code == CloseCode::Policy {
                        warn!(reason = %frame.reason, "gateway closed with policy violation");
                    } else {
                        info!(code = ?frame.code, reason = %frame.reason, "gateway closed connection");
                    }
                }
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!(error = %e, "gateway read error");
                break;
            }
            None => break,
        }
    }

    inner.connected.store(false, Ordering::SeqCst);
    inner.writer.lock().await.take();
    inner.fail_pending("connection lost");

    if !inner.closing.load(Ordering::SeqCst) {
        tokio::spawn(reconnect(inner));
    }
}

/// Reconnect with exponential backoff: base 1 s, cap 30 s, up to 10 tries.
async fn reconnect(inner: Arc<ClientInner>) {
    let attempts = AtomicU32::new(0);
    let policy = ExponentialBackoff {
        initial_interval: Duration::from_secs(1),
        max_interval: Duration::from_secs(30),
        multiplier: 2.0,
        randomization_factor: 0.0,
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    };

    let result = backoff::future::retry(policy, || async {
        if inner.closing.load(Ordering::SeqCst) {
            return Err(backoff::Error::permanent(GatewayError::NotConnected));
        }
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > MAX_RECONNECT_ATTEMPTS {
            return Err(backoff::Error::permanent(GatewayError::Transport(format!(
                "reconnect gave up after {MAX_RECONNECT_ATTEMPTS} attempts"
            ))));
        }
        debug!(attempt, "reconnecting to gateway");
        open_socket(&inner.config).await.map_err(|e| {
            if e.is_permanent() {
                backoff::Error::permanent(e)
            } else {
                backoff::Error::transient(e)
            }
        })
    })
    .await;

    match result {
        Ok((sink, source, hello)) => {
            *inner.writer.lock().await = Some(sink);
            *inner.hello.lock().expect("hello lock") = Some(hello);
            // The server restarts its event counter on a new connection.
            inner.seq.reset();
            inner.connected.store(true, Ordering::SeqCst);
            info!("gateway reconnected");
            tokio::spawn(read_loop(inner, source));
        }
        Err(e) => {
            error!(error = %e, "gateway reconnect failed permanently");
        }
    }
}
