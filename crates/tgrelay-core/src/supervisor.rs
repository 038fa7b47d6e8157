//! Long-running receive loop with reconnect/backoff.
//!
//! ```text
//! Running --network error--------> Backoff(network_delay) --> Running
//! Running --rate limited (w)-----> Backoff(w + padding)   --> Running
//! Running --other / handler panic-> Backoff(error_delay)  --> Running
//! Running | Backoff --shutdown---> Stopped
//! ```

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    sync::{mpsc, watch},
    task::{JoinError, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    errors::{TransportError, TransportResult},
    messaging::{port::EventSource, types::InboundMessage},
    Result,
};

/// Consumer of inbound messages (the routing layer in production).
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, message: InboundMessage) -> Result<()>;
}

/// Injected clock so backoff can be observed without real waiting.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Backoff durations as data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub network_delay: Duration,
    pub error_delay: Duration,
    pub rate_limit_padding: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            network_delay: Duration::from_secs(5),
            error_delay: Duration::from_secs(5),
            rate_limit_padding: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            network_delay: cfg.reconnect_delay,
            error_delay: cfg.error_delay,
            rate_limit_padding: cfg.rate_limit_padding,
        }
    }

    pub fn delay_for(&self, err: &TransportError) -> Duration {
        match err {
            TransportError::RateLimited { wait_secs } => {
                Duration::from_secs(*wait_secs) + self.rate_limit_padding
            }
            TransportError::Network(_) => self.network_delay,
            TransportError::Other(_) => self.error_delay,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    Running,
    Backoff(Duration),
    Stopped,
}

/// One chat's queue and the number of its messages not yet fully handled.
struct Lane {
    tx: mpsc::UnboundedSender<InboundMessage>,
    in_flight: Arc<AtomicUsize>,
}

impl Lane {
    /// Nothing queued or running, so dropping the sender cannot lose a message.
    fn is_idle(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) == 0
    }
}

/// Per-chat worker queues: one chat's messages are handled strictly in
/// receipt order while different chats proceed concurrently.
///
/// Idle lanes are released on the next dispatch, so only chats with work in
/// progress hold a task.
struct Lanes {
    handler: Arc<dyn EventHandler>,
    lanes: HashMap<i64, Lane>,
    workers: JoinSet<()>,
}

impl Lanes {
    fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self {
            handler,
            lanes: HashMap::new(),
            workers: JoinSet::new(),
        }
    }

    fn dispatch(&mut self, message: InboundMessage) {
        let chat_id = message.chat_id.0;
        self.lanes
            .retain(|id, lane| *id == chat_id || !(lane.is_idle() || lane.tx.is_closed()));

        let message = match self.lanes.get(&chat_id) {
            Some(lane) => {
                lane.in_flight.fetch_add(1, Ordering::SeqCst);
                match lane.tx.send(message) {
                    Ok(()) => return,
                    // The lane's worker died (handler panic); start a fresh one.
                    Err(mpsc::error::SendError(message)) => message,
                }
            }
            None => message,
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<InboundMessage>();
        let in_flight = Arc::new(AtomicUsize::new(1));
        let handler = self.handler.clone();
        let counter = in_flight.clone();
        self.workers.spawn(async move {
            while let Some(message) = rx.recv().await {
                let chat_id = message.chat_id.0;
                if let Err(e) = handler.handle(message).await {
                    error!(chat_id, error = %e, "handler failed");
                }
                counter.fetch_sub(1, Ordering::SeqCst);
            }
        });
        // A freshly created receiver is alive, so this cannot fail.
        let _ = tx.send(message);
        self.lanes.insert(chat_id, Lane { tx, in_flight });
    }

    /// Resolves when a lane worker exits; workers only exit by panicking or
    /// being aborted.
    async fn next_exit(&mut self) -> Option<std::result::Result<(), JoinError>> {
        if self.workers.is_empty() {
            return std::future::pending().await;
        }
        self.workers.join_next().await
    }
}

/// Drives the event source for the whole process lifetime.
///
/// Never returns on recoverable errors; only cancelling the shutdown token
/// moves it to [`SupervisorState::Stopped`].
pub struct Supervisor {
    source: Arc<dyn EventSource>,
    handler: Arc<dyn EventHandler>,
    policy: BackoffPolicy,
    sleeper: Arc<dyn Sleeper>,
    shutdown: CancellationToken,
    state: watch::Sender<SupervisorState>,
}

impl Supervisor {
    pub fn new(
        source: Arc<dyn EventSource>,
        handler: Arc<dyn EventHandler>,
        policy: BackoffPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(SupervisorState::Running);
        Self {
            source,
            handler,
            policy,
            sleeper: Arc::new(TokioSleeper),
            shutdown,
            state,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    pub async fn run(&self) {
        let mut lanes = Lanes::new(self.handler.clone());

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            self.state.send_replace(SupervisorState::Running);

            let outcome = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                res = self.run_connection(&mut lanes) => res,
            };
            let err = match outcome {
                Ok(()) => TransportError::Other("event stream ended".to_string()),
                Err(e) => e,
            };

            let delay = self.policy.delay_for(&err);
            match &err {
                TransportError::RateLimited { wait_secs } => {
                    warn!(wait_secs, delay_secs = delay.as_secs(), "flood wait, backing off")
                }
                TransportError::Network(e) => {
                    error!(error = %e, delay_secs = delay.as_secs(), "network problem, reconnecting")
                }
                TransportError::Other(e) => {
                    error!(error = %e, delay_secs = delay.as_secs(), "unexpected error, restarting")
                }
            }

            self.state.send_replace(SupervisorState::Backoff(delay));
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.sleeper.sleep(delay) => {}
            }
        }

        self.state.send_replace(SupervisorState::Stopped);
        info!("relay stopped");
        lanes.workers.shutdown().await;
    }

    async fn run_connection(&self, lanes: &mut Lanes) -> TransportResult<()> {
        let mut stream = self.source.connect().await?;
        info!("connected, dispatching events");

        loop {
            tokio::select! {
                exit = lanes.next_exit() => {
                    if let Some(Err(e)) = exit {
                        if e.is_panic() {
                            return Err(TransportError::Other(format!("handler panicked: {e}")));
                        }
                    }
                }
                next = stream.next_event() => match next? {
                    Some(message) => lanes.dispatch(message),
                    None => return Ok(()),
                },
            }
        }
    }
}
