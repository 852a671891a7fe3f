//! Process wiring: one supervisor, one dispatcher, one HTTP surface around a single client.

use crate::client::{BridgeClient, ClientEvent, MessagingClient};
use crate::commands::CommandRouter;
use crate::config::{self, Config, HttpStartPolicy};
use crate::dispatcher::Dispatcher;
use crate::gateway::{self, ApiState};
use crate::supervisor::Supervisor;
use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

const EVENT_QUEUE: usize = 64;

/// Run the bot against the bridge sidecar until Ctrl+C / SIGTERM.
/// `config.http.port` is used as given; env overrides are resolved by the caller.
pub async fn run(config: Config) -> Result<()> {
    let bridge = Arc::new(BridgeClient::from_config(&config));
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
    let events_task = Arc::clone(&bridge).start_events(event_tx);
    let client: Arc<dyn MessagingClient> = bridge.clone();
    let result = run_with_client(config, client, event_rx, gateway::shutdown_signal()).await;
    bridge.stop();
    events_task.abort();
    result
}

/// Run with an arbitrary client and event stream until `shutdown` resolves.
///
/// Returns an error when the HTTP port cannot be bound, or when a retry sequence is exhausted
/// under `ExhaustedPolicy::Exit`.
pub async fn run_with_client<F>(
    config: Config,
    client: Arc<dyn MessagingClient>,
    events: mpsc::Receiver<ClientEvent>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown.await;
        let _ = stop_tx.send(true);
    });

    let supervisor = Arc::new(Supervisor::from_config(client.clone(), &config.supervisor));
    let router = Arc::new(CommandRouter::new(client.clone(), &config.commands));
    let dispatcher = Dispatcher::new(
        supervisor.clone(),
        router,
        config.supervisor.reconnect_on_disconnect,
    );

    let port = config.http.port;
    let app = gateway::routes(ApiState {
        client,
        supervisor: supervisor.clone(),
        port,
        token: config::resolve_http_token(&config),
    })
    .layer(DefaultBodyLimit::max(config.http.json_limit_bytes));

    // Immediate: a busy port fails the process before any connect attempt.
    let early_listener = match config.http.start {
        HttpStartPolicy::Immediate => Some(gateway::bind_listener(&config.http.bind, port).await?),
        HttpStartPolicy::AfterReady => None,
    };

    let dispatch_task = tokio::spawn(dispatcher.run(events));
    let connect_task = supervisor.spawn_connect();

    let result = serve_http(&config, port, app, early_listener, &supervisor, stop_rx).await;

    connect_task.abort();
    dispatch_task.abort();
    result
}

/// Serve until stopped; under `AfterReady` the listener is bound once the client is ready.
async fn serve_http(
    config: &Config,
    port: u16,
    app: axum::Router,
    early_listener: Option<TcpListener>,
    supervisor: &Supervisor,
    stop_rx: watch::Receiver<bool>,
) -> Result<()> {
    let listener = match early_listener {
        Some(l) => l,
        None => {
            log::info!("waiting for the messaging client before starting the http server");
            tokio::select! {
                _ = supervisor.wait_ready() => {}
                _ = supervisor.terminated() => return Err(exhausted(supervisor)),
                _ = stopped(stop_rx.clone()) => return Ok(()),
            }
            gateway::bind_listener(&config.http.bind, port).await?
        }
    };
    tokio::select! {
        res = gateway::serve(listener, app, stopped(stop_rx)) => res,
        _ = supervisor.terminated() => Err(exhausted(supervisor)),
    }
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|s| *s).await;
}

fn exhausted(supervisor: &Supervisor) -> anyhow::Error {
    anyhow::anyhow!(
        "messaging client could not be initialized after {} attempt(s)",
        supervisor.policy().max_attempts
    )
}
