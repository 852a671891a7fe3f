//! In-process client with scripted failures. Records every call so tests can assert on
//! exactly what the bot did.

use crate::client::{ClientError, IncomingMessage, MessagingClient};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// A message the bot sent (plain send or reply).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: String,
    pub text: String,
    /// Id of the quoted message when this was a reply.
    pub quoted: Option<String>,
}

#[derive(Default)]
pub struct MemoryClient {
    init_failures: AtomicU32,
    init_delay: Duration,
    init_calls: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
    reject_sends: AtomicBool,
    messages: Mutex<HashMap<String, IncomingMessage>>,
    sent: Mutex<Vec<SentMessage>>,
    deleted: Mutex<Vec<(String, bool)>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first `n` initialize calls fail.
    pub fn failing_initialize(self, n: u32) -> Self {
        self.init_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Every initialize call takes `delay` before resolving.
    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    /// Make send/reply fail until switched back.
    pub fn reject_sends(&self, reject: bool) {
        self.reject_sends.store(reject, Ordering::SeqCst);
    }

    /// Make a message available to `get_message_by_id`.
    pub async fn insert_message(&self, message: IncomingMessage) {
        self.messages
            .lock()
            .await
            .insert(message.id.clone(), message);
    }

    pub fn initialize_calls(&self) -> u32 {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Highest number of initialize calls that were running at the same time.
    pub fn max_concurrent_initialize(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    /// Deleted ids with their for-everyone flag.
    pub async fn deleted(&self) -> Vec<(String, bool)> {
        self.deleted.lock().await.clone()
    }

    async fn record_send(
        &self,
        chat_id: &str,
        text: &str,
        quoted: Option<&str>,
    ) -> Result<(), ClientError> {
        if self.reject_sends.load(Ordering::SeqCst) {
            return Err(ClientError::Api("send rejected".to_string()));
        }
        self.sent.lock().await.push(SentMessage {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            quoted: quoted.map(str::to_string),
        });
        Ok(())
    }
}

#[async_trait]
impl MessagingClient for MemoryClient {
    async fn initialize(&self) -> Result<(), ClientError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let call = self.init_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.init_delay.is_zero() {
            tokio::time::sleep(self.init_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let failed = self
            .init_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(ClientError::Api(format!("initialize call {} refused", call)))
        } else {
            Ok(())
        }
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ClientError> {
        self.record_send(chat_id, text, None).await
    }

    async fn reply(&self, message: &IncomingMessage, text: &str) -> Result<(), ClientError> {
        self.record_send(&message.from, text, Some(&message.id)).await
    }

    async fn get_message_by_id(&self, id: &str) -> Result<IncomingMessage, ClientError> {
        self.messages
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(id.to_string()))
    }

    async fn delete_message(&self, id: &str, for_everyone: bool) -> Result<(), ClientError> {
        if self.messages.lock().await.remove(id).is_none() {
            return Err(ClientError::NotFound(id.to_string()));
        }
        self.deleted
            .lock()
            .await
            .push((id.to_string(), for_everyone));
        Ok(())
    }
}
