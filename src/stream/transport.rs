//! Transport for the subscription feed
//!
//! The monitor talks to [`StreamConnector`]/[`StreamConnection`] so tests can
//! script a feed. [`WsConnector`] is the WebSocket implementation.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval, sleep_until, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::error::{Error, Result};

/// Opens connections to the feed
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn StreamConnection>>;
}

/// One open feed connection
#[async_trait]
pub trait StreamConnection: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next text frame. `Ok(None)` means the peer closed the connection.
    async fn next_text(&mut self) -> Result<Option<String>>;

    async fn close(&mut self);
}

/// WebSocket connector with protocol-level keep-alive
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    ping_interval: Duration,
    idle_timeout: Duration,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, config: &StreamConfig) -> Self {
        Self {
            url: url.into(),
            ping_interval: Duration::from_secs(config.ping_interval_secs),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        }
    }
}

#[async_trait]
impl StreamConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn StreamConnection>> {
        let url = url::Url::parse(&self.url)
            .map_err(|e| Error::Config(format!("Invalid WebSocket URL: {}", e)))?;

        info!("Connecting to {}", url);
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::StreamConnection(format!("WebSocket connect failed: {}", e)))?;

        let mut ping_timer = interval(self.ping_interval);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ping_timer.reset();

        Ok(Box::new(WsConnection {
            ws,
            ping_timer,
            idle_timeout: self.idle_timeout,
            last_rx: Instant::now(),
        }))
    }
}

struct WsConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ping_timer: Interval,
    idle_timeout: Duration,
    last_rx: Instant,
}

#[async_trait]
impl StreamConnection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.ws
            .send(Message::Text(text))
            .await
            .map_err(|e| Error::StreamConnection(format!("send failed: {}", e)))
    }

    async fn next_text(&mut self) -> Result<Option<String>> {
        loop {
            let idle_deadline = self.last_rx + self.idle_timeout;

            tokio::select! {
                _ = self.ping_timer.tick() => {
                    self.ws
                        .send(Message::Ping(Vec::new()))
                        .await
                        .map_err(|e| Error::StreamConnection(format!("ping failed: {}", e)))?;
                    debug!("Sent ping");
                }

                _ = sleep_until(idle_deadline) => {
                    warn!("No frames for {:?}, dropping connection", self.idle_timeout);
                    return Err(Error::StreamTimeout(self.idle_timeout.as_secs()));
                }

                msg = self.ws.next() => {
                    self.last_rx = Instant::now();
                    match msg {
                        Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                        Some(Ok(Message::Pong(_))) => debug!("Received pong"),
                        Some(Ok(Message::Close(frame))) => {
                            info!("WebSocket closed by server: {:?}", frame);
                            return Ok(None);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(Error::StreamConnection(format!("WebSocket error: {}", e)))
                        }
                        None => return Ok(None),
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            debug!("Error closing WebSocket: {}", e);
        }
    }
}
