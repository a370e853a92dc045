//! Stream monitor
//!
//! Owns the subscription lifecycle: connect, subscribe, receive, and
//! reconnect with backoff until stopped. Every validated liquidity offer is
//! handed to a [`TransactionSink`].

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::ReconnectBackoff;
use super::decoder::{
    classify_liquidity, decode_frame, subscribe_request, LiquidityEvent, StreamFrame,
    TransactionEvent, SUBSCRIBE_ID,
};
use super::transport::{StreamConnection, StreamConnector};
use crate::config::StreamConfig;
use crate::error::{Error, Result};

/// Monitor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Connecting,
    Subscribed,
    Receiving,
    Errored,
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MonitorState::Stopped => "stopped",
            MonitorState::Connecting => "connecting",
            MonitorState::Subscribed => "subscribed",
            MonitorState::Receiving => "receiving",
            MonitorState::Errored => "errored",
        };
        write!(f, "{}", s)
    }
}

/// Receives liquidity events from the monitor's receive loop.
///
/// Called inline, in feed order. Implementations must hand slow work off to
/// their own tasks.
#[async_trait]
pub trait TransactionSink: Send + Sync {
    async fn on_liquidity(&self, event: LiquidityEvent);
}

/// How a connection session ended
enum SessionEnd {
    Cancelled,
    Closed,
    Failed(Error),
}

struct MonitorTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct StreamMonitor {
    ctx: Arc<LoopContext>,
    running: Arc<AtomicBool>,
    task: Mutex<Option<MonitorTask>>,
}

/// State shared between the monitor handle and its receive loop
struct LoopContext {
    connector: Arc<dyn StreamConnector>,
    sink: Arc<dyn TransactionSink>,
    config: StreamConfig,
    state: watch::Sender<MonitorState>,
    last_ledger: AtomicU64,
}

impl StreamMonitor {
    pub fn new(
        connector: Arc<dyn StreamConnector>,
        sink: Arc<dyn TransactionSink>,
        config: StreamConfig,
    ) -> Self {
        let (state, _) = watch::channel(MonitorState::Stopped);
        Self {
            ctx: Arc::new(LoopContext {
                connector,
                sink,
                config,
                state,
                last_ledger: AtomicU64::new(0),
            }),
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Start the receive loop. Returns false if it was already running.
    pub async fn start(&self) -> bool {
        let mut task = self.task.lock().await;
        if let Some(existing) = task.as_ref() {
            if !existing.handle.is_finished() {
                warn!("Stream monitor already running");
                return false;
            }
        }

        self.running.store(true, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let ctx = self.ctx.clone();
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            ctx.run(loop_cancel).await;
        });

        *task = Some(MonitorTask { cancel, handle });
        info!("Stream monitor started");
        true
    }

    /// Stop the receive loop and wait for it to exit.
    ///
    /// No liquidity event is delivered to the sink after this returns.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let task = self.task.lock().await.take();

        if let Some(MonitorTask { cancel, handle }) = task {
            cancel.cancel();
            if let Err(e) = handle.await {
                error!("Stream monitor task failed: {}", e);
            }
            info!("Stream monitor stopped");
        }
        self.ctx.set_state(MonitorState::Stopped);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> MonitorState {
        *self.ctx.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<MonitorState> {
        self.ctx.state.subscribe()
    }

    /// Index of the last closed ledger seen on the feed (0 before the first)
    pub fn last_ledger_index(&self) -> u64 {
        self.ctx.last_ledger.load(Ordering::Relaxed)
    }
}

impl LoopContext {
    fn set_state(&self, state: MonitorState) {
        self.state.send_replace(state);
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut backoff =
            ReconnectBackoff::new(self.config.initial_backoff(), self.config.max_backoff());

        loop {
            self.set_state(MonitorState::Connecting);

            match self.session(&cancel, &mut backoff).await {
                SessionEnd::Cancelled => break,
                SessionEnd::Closed => warn!("Stream connection closed"),
                SessionEnd::Failed(e) => error!("Stream error: {}", e),
            }

            self.set_state(MonitorState::Errored);
            let delay = backoff.next_delay();
            warn!("Reconnecting in {:?}...", delay);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("Stream receive loop exited");
    }

    /// One connection: connect, subscribe, receive until it ends
    async fn session(&self, cancel: &CancellationToken, backoff: &mut ReconnectBackoff) -> SessionEnd {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            r = self.connector.connect() => r,
        };
        let mut conn = match connected {
            Ok(conn) => conn,
            Err(e) => return SessionEnd::Failed(e),
        };

        let end = self.subscribed_session(conn.as_mut(), cancel, backoff).await;
        conn.close().await;
        end
    }

    async fn subscribed_session(
        &self,
        conn: &mut dyn StreamConnection,
        cancel: &CancellationToken,
        backoff: &mut ReconnectBackoff,
    ) -> SessionEnd {
        if let Err(e) = conn.send_text(subscribe_request()).await {
            return SessionEnd::Failed(e);
        }

        let ack_timeout = Duration::from_secs(self.config.subscribe_timeout_secs);
        let acked = tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            r = tokio::time::timeout(ack_timeout, self.await_ack(conn)) => r,
        };
        match acked {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return SessionEnd::Failed(e),
            Err(_) => {
                return SessionEnd::Failed(Error::Subscription(format!(
                    "no acknowledgement within {:?}",
                    ack_timeout
                )))
            }
        }

        backoff.reset();
        self.set_state(MonitorState::Subscribed);
        info!("Subscribed to transactions and ledger streams");
        self.set_state(MonitorState::Receiving);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return SessionEnd::Cancelled,

                msg = conn.next_text() => match msg {
                    Ok(Some(text)) => self.handle_text(&text).await,
                    Ok(None) => return SessionEnd::Closed,
                    Err(e) => return SessionEnd::Failed(e),
                },
            }
        }
    }

    /// Read frames until the subscribe reply arrives
    async fn await_ack(&self, conn: &mut dyn StreamConnection) -> Result<()> {
        loop {
            let text = conn.next_text().await?.ok_or(Error::StreamDisconnected)?;
            match decode_frame(&text) {
                Ok(StreamFrame::Response {
                    id: Some(SUBSCRIBE_ID),
                    success,
                    error,
                    ledger_index,
                }) => {
                    if !success {
                        return Err(Error::Subscription(
                            error.unwrap_or_else(|| "unknown error".to_string()),
                        ));
                    }
                    if let Some(index) = ledger_index {
                        self.last_ledger.store(index, Ordering::Relaxed);
                    }
                    return Ok(());
                }
                Ok(_) => self.handle_text(&text).await,
                Err(e) => warn!("Skipping frame before subscribe ack: {}", e),
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        let frame = match decode_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Skipping malformed frame: {}", e);
                return;
            }
        };

        match frame {
            StreamFrame::Transaction(tx) => {
                if !tx.validated {
                    return;
                }
                match &tx.event {
                    TransactionEvent::OfferCreate { .. } => {
                        if let Some(event) = classify_liquidity(&tx) {
                            info!(
                                "Liquidity offer for {}.{} from {}",
                                event.currency, event.issuer, event.source_account
                            );
                            self.sink.on_liquidity(event).await;
                        }
                    }
                    TransactionEvent::TrustSet { account, limit_amount } => {
                        debug!(
                            "TrustSet by {} for {}.{}",
                            account, limit_amount.currency, limit_amount.issuer
                        );
                    }
                    TransactionEvent::Other(_) => {}
                }
            }
            StreamFrame::LedgerClosed { ledger_index } => {
                self.last_ledger.store(ledger_index, Ordering::Relaxed);
                debug!("Ledger {} closed", ledger_index);
            }
            StreamFrame::Response { id, success, error, .. } => {
                debug!("Response id={:?} success={} error={:?}", id, success, error);
            }
            StreamFrame::Other(kind) => debug!("Ignoring {} frame", kind),
        }
    }
}
