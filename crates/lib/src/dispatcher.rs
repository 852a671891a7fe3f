//! Single consumer of client events. Lifecycle signals drive the supervisor; chat messages are
//! routed on their own task so a slow or panicking handler never blocks the event stream.

use crate::client::ClientEvent;
use crate::commands::CommandRouter;
use crate::supervisor::Supervisor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct Dispatcher {
    supervisor: Arc<Supervisor>,
    router: Arc<CommandRouter>,
    reconnect_on_disconnect: bool,
}

impl Dispatcher {
    pub fn new(
        supervisor: Arc<Supervisor>,
        router: Arc<CommandRouter>,
        reconnect_on_disconnect: bool,
    ) -> Self {
        Self {
            supervisor,
            router,
            reconnect_on_disconnect,
        }
    }

    /// Drain `events` until every sender is gone.
    pub async fn run(self, mut events: mpsc::Receiver<ClientEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(event);
        }
        log::debug!("dispatcher: event channel closed");
    }

    /// Handle one event. Returns the task spawned for it, if any.
    pub fn dispatch(&self, event: ClientEvent) -> Option<JoinHandle<()>> {
        match event {
            ClientEvent::Qr(code) => {
                log::info!("scan the QR code to link the account");
                print_qr(&code);
                None
            }
            ClientEvent::Loading { percent, message } => {
                log::info!("loading: {}% - {}", percent, message);
                None
            }
            ClientEvent::Authenticated => {
                log::info!("client authenticated");
                None
            }
            ClientEvent::AuthFailure(reason) => {
                log::error!("authentication failure: {}", reason);
                None
            }
            ClientEvent::Ready => {
                self.supervisor.mark_ready();
                log::info!("messaging client is ready");
                None
            }
            ClientEvent::Disconnected(reason) => {
                log::warn!("client disconnected: {}", reason);
                self.supervisor.mark_disconnected();
                if self.reconnect_on_disconnect {
                    Some(self.reconnect())
                } else {
                    None
                }
            }
            ClientEvent::Error(message) => {
                log::error!("client error: {}", message);
                Some(self.reconnect())
            }
            ClientEvent::Message(message) => {
                let router = Arc::clone(&self.router);
                Some(tokio::spawn(async move {
                    router.route(&message).await;
                }))
            }
        }
    }

    fn reconnect(&self) -> JoinHandle<()> {
        let supervisor = Arc::clone(&self.supervisor);
        tokio::spawn(async move {
            supervisor.connect_with_retry().await;
        })
    }
}

/// Render a pairing QR payload in the terminal; falls back to the raw payload.
fn print_qr(code: &str) {
    match qrcode::QrCode::new(code.as_bytes()) {
        Ok(qr) => {
            let rendered = qr
                .render::<char>()
                .quiet_zone(false)
                .module_dimensions(2, 1)
                .build();
            println!("{}", rendered);
        }
        Err(e) => {
            log::warn!("failed to render QR code: {}", e);
            println!("{}", code);
        }
    }
}
