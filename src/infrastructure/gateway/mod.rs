//! Gateway RPC: framed WebSocket client, event queue, poll helpers, pool.

pub mod client;
pub mod event_queue;
pub mod executor;
pub mod frame;
pub mod poll;
pub mod pool;

pub use client::{ClientIdent, GatewayClient, GatewayClientConfig};
pub use event_queue::{EventQueue, GatewayEvent, SeqTracker};
pub use executor::GatewayExecutor;
pub use frame::Frame;
pub use pool::GatewayClientPool;
