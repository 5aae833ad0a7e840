//! Scripted in-process gateway speaking the framed protocol.
//!
//! Binds a loopback WebSocket, issues the connect challenge, answers the
//! connect request with a hello, then serves status/chat RPCs from scripted
//! state. One history is shared across connections, mimicking a single
//! gateway session.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;

#[derive(Default)]
pub struct SimOptions {
    /// Full event frames (with their own seq) pushed right after the hello.
    pub events_after_hello: Vec<Value>,
    /// Message batches appended to history, one batch per chat.send.
    pub reply_batches: Vec<Vec<Value>>,
}

pub struct SimGateway {
    pub port: u16,
    /// The session history served by chat.history.
    pub messages: Arc<Mutex<Vec<Value>>>,
}

impl SimGateway {
    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }
}

pub async fn spawn(options: SimOptions) -> SimGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind sim gateway");
    let port = listener.local_addr().expect("local addr").port();

    let messages: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let batches = Arc::new(Mutex::new(VecDeque::from(options.reply_batches)));
    let events = Arc::new(options.events_after_hello);

    let shared = messages.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { break };
            let messages = shared.clone();
            let batches = batches.clone();
            let events = events.clone();
            tokio::spawn(async move {
                let _ = serve_connection(stream, messages, batches, events).await;
            });
        }
    });

    SimGateway { port, messages }
}

async fn serve_connection(
    stream: TcpStream,
    messages: Arc<Mutex<Vec<Value>>>,
    batches: Arc<Mutex<VecDeque<Vec<Value>>>>,
    events: Arc<Vec<Value>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();

    sink.send(Message::Text(
        json!({
            "type": "event",
            "event": "connect.challenge",
            "payload": {"nonce": "00000000-0000-4000-8000-000000000000"}
        })
        .to_string(),
    ))
    .await?;

    while let Some(msg) = source.next().await {
        let msg = msg?;
        let Message::Text(text) = msg else { continue };
        let frame: Value = serde_json::from_str(&text)?;
        if frame["type"] != "req" {
            continue;
        }
        let id = frame["id"].as_str().unwrap_or_default().to_string();
        let method = frame["method"].as_str().unwrap_or_default().to_string();

        match method.as_str() {
            "connect" => {
                let client_id = frame
                    .pointer("/params/client/id")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if client_id != "cli" && client_id != "gateway-client" {
                    send_res(
                        &mut sink,
                        &id,
                        json!({
                            "ok": false,
                            "error": {
                                "code": "INVALID_REQUEST",
                                "message": "at /client/id: must be equal to constant"
                            }
                        }),
                    )
                    .await?;
                    continue;
                }
                send_res(
                    &mut sink,
                    &id,
                    json!({
                        "ok": true,
                        "payload": {
                            "server": {"version": "sim", "host": "localhost"},
                            "protocol": 3,
                            "features": []
                        }
                    }),
                )
                .await?;
                for event in events.iter() {
                    sink.send(Message::Text(event.to_string())).await?;
                }
            }
            "status" | "health" => {
                send_res(&mut sink, &id, json!({"ok": true, "payload": {"ok": true}})).await?;
            }
            "chat.history" => {
                let history = messages.lock().await.clone();
                send_res(&mut sink, &id, json!({"ok": true, "payload": {"messages": history}}))
                    .await?;
            }
            "chat.send" => {
                let content = frame
                    .pointer("/params/content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                {
                    let mut history = messages.lock().await;
                    history.push(json!({"role": "user", "content": content}));
                    if let Some(batch) = batches.lock().await.pop_front() {
                        history.extend(batch);
                    }
                }
                send_res(
                    &mut sink,
                    &id,
                    json!({"ok": true, "payload": {"runId": "run-1", "status": "started"}}),
                )
                .await?;
            }
            _ => {
                send_res(&mut sink, &id, json!({"ok": true, "payload": {}})).await?;
            }
        }
    }
    Ok(())
}

async fn send_res(
    sink: &mut (impl futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
              + Unpin),
    id: &str,
    body: Value,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let mut frame = json!({"type": "res", "id": id});
    if let (Value::Object(frame_map), Value::Object(body_map)) = (&mut frame, body) {
        frame_map.extend(body_map);
    }
    sink.send(Message::Text(frame.to_string())).await
}

/// A tool-output spawn marker message for the given role.
pub fn spawn_marker(role: &str) -> Value {
    json!({
        "role": "assistant",
        "content": format!(
            "{{\"status\":\"accepted\",\"childSessionKey\":\"agent:{role}:subagent:123e4567-e89b-12d3-a456-426614174000\",\"runId\":\"run-9\"}}"
        )
    })
}

/// A real assistant reply (model set, non-empty text).
pub fn assistant_reply(text: &str) -> Value {
    json!({"role": "assistant", "model": "sim-model", "content": text})
}
