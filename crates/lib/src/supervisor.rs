//! Lifecycle supervisor: owns connecting and reconnecting the messaging client.
//!
//! A retry sequence calls `initialize` up to `max_attempts` times with `retry_delay` between
//! failures. At most one sequence runs at a time; a call that arrives while one is in flight
//! returns `AlreadyRunning` without touching the client. Progress is published on a watch
//! channel so the HTTP surface and the process entry point can observe it.

use crate::client::MessagingClient;
use crate::config::{ExhaustedPolicy, SupervisorConfig};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(5000))
    }
}

impl From<&SupervisorConfig> for RetryPolicy {
    fn from(c: &SupervisorConfig) -> Self {
        Self::new(c.max_attempts, c.retry_delay())
    }
}

/// Connection state as seen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum ConnectionState {
    Idle,
    Connecting { attempt: u32 },
    Ready,
    Disconnected,
    /// The last retry sequence ran out of attempts.
    Failed,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting { .. } => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
        }
    }
}

/// Result of one `connect_with_retry` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected { attempts: u32 },
    Exhausted { attempts: u32 },
    /// Another sequence was already running; nothing was attempted.
    AlreadyRunning,
}

/// Holds the in-flight flag for the lifetime of one sequence, including cancellation.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Supervisor {
    client: Arc<dyn MessagingClient>,
    policy: RetryPolicy,
    on_exhausted: ExhaustedPolicy,
    in_flight: AtomicBool,
    /// A disconnect arrived while a sequence was in flight.
    reconnect_requested: AtomicBool,
    state_tx: watch::Sender<ConnectionState>,
    /// Set once any sequence runs out of attempts; never cleared.
    exhausted_tx: watch::Sender<bool>,
}

impl Supervisor {
    pub fn new(
        client: Arc<dyn MessagingClient>,
        policy: RetryPolicy,
        on_exhausted: ExhaustedPolicy,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (exhausted_tx, _) = watch::channel(false);
        Self {
            client,
            policy,
            on_exhausted,
            in_flight: AtomicBool::new(false),
            reconnect_requested: AtomicBool::new(false),
            state_tx,
            exhausted_tx,
        }
    }

    pub fn from_config(client: Arc<dyn MessagingClient>, config: &SupervisorConfig) -> Self {
        Self::new(client, RetryPolicy::from(config), config.on_exhausted)
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// The client reported readiness on its own (e.g. after a silent reconnect).
    pub fn mark_ready(&self) {
        self.state_tx.send_replace(ConnectionState::Ready);
    }

    /// The client reported a disconnect. A sequence already in flight keeps its own state but
    /// starts over instead of reporting ready.
    pub fn mark_disconnected(&self) {
        if self.in_flight.load(Ordering::Acquire) {
            self.reconnect_requested.store(true, Ordering::Release);
        } else {
            self.state_tx.send_replace(ConnectionState::Disconnected);
        }
    }

    /// Run one retry sequence.
    pub async fn connect_with_retry(&self) -> ConnectOutcome {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            log::debug!("supervisor: retry sequence already in flight, skipping");
            return ConnectOutcome::AlreadyRunning;
        };
        self.reconnect_requested.store(false, Ordering::Release);
        let max = self.policy.max_attempts;
        let mut attempt = 0;
        while attempt < max {
            attempt += 1;
            self.state_tx
                .send_replace(ConnectionState::Connecting { attempt });
            match self.client.initialize().await {
                Ok(()) if self.reconnect_requested.swap(false, Ordering::AcqRel) => {
                    log::warn!("client disconnected while connecting; starting over");
                    attempt = 0;
                }
                Ok(()) => {
                    log::info!("client initialized successfully");
                    self.state_tx.send_replace(ConnectionState::Ready);
                    return ConnectOutcome::Connected { attempts: attempt };
                }
                Err(e) => {
                    log::warn!(
                        "client initialization failed (attempt {}/{}): {}",
                        attempt,
                        max,
                        e
                    );
                    if attempt < max {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
            }
        }
        match self.on_exhausted {
            ExhaustedPolicy::KeepRunning => {
                log::error!("max retries reached; http server remains running")
            }
            ExhaustedPolicy::Exit => log::error!("max retries reached; shutting down"),
        }
        self.reconnect_requested.store(false, Ordering::Release);
        self.exhausted_tx.send_replace(true);
        self.state_tx.send_replace(ConnectionState::Failed);
        ConnectOutcome::Exhausted { attempts: attempt }
    }

    /// Run a retry sequence on its own task.
    pub fn spawn_connect(self: &Arc<Self>) -> JoinHandle<ConnectOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.connect_with_retry().await })
    }

    /// Resolves the next time the client is ready (immediately if it already is).
    pub async fn wait_ready(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|s| *s == ConnectionState::Ready).await;
    }

    /// True once any retry sequence has run out of attempts, even if a later one succeeded.
    pub fn has_exhausted(&self) -> bool {
        *self.exhausted_tx.borrow()
    }

    /// Resolves once a sequence is exhausted under `ExhaustedPolicy::Exit`; never resolves
    /// under `KeepRunning`. Exhaustion is latched, so a later sequence cannot hide it.
    pub async fn terminated(&self) {
        if self.on_exhausted != ExhaustedPolicy::Exit {
            return std::future::pending().await;
        }
        let mut rx = self.exhausted_tx.subscribe();
        if rx.wait_for(|exhausted| *exhausted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
