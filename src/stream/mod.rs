//! Stream module - live ledger feed
//!
//! - `decoder`: frame decoding and liquidity classification
//! - `backoff`: reconnect delays
//! - `transport`: WebSocket connection with keep-alive
//! - `monitor`: subscription lifecycle and dispatch

pub mod backoff;
pub mod decoder;
pub mod monitor;
pub mod transport;

pub use backoff::ReconnectBackoff;
pub use decoder::{classify_liquidity, decode_frame, LiquidityEvent, StreamFrame, TransactionEvent};
pub use monitor::{MonitorState, StreamMonitor, TransactionSink};
pub use transport::{StreamConnection, StreamConnector, WsConnector};
