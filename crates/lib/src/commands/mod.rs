//! Chat commands: parse an incoming message body and run the matching handler.
//!
//! Matching is exact (or prefix for `!deleteMessage,`), case-sensitive and untrimmed. Text that
//! matches nothing is ignored without a reply.

pub mod handlers;

use crate::client::{IncomingMessage, MessagingClient};
use crate::config::CommandsConfig;
use crate::exec::ScriptCommand;
use std::path::PathBuf;
use std::sync::Arc;

pub const PING: &str = "!ping";
pub const LOGS: &str = "!logs";
pub const DELETE_MESSAGE_PREFIX: &str = "!deleteMessage,";
pub const SCHEDULE: &str = "!jadwaldeo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Ping,
    Logs,
    /// `id` is everything after the prefix.
    DeleteMessage { id: &'a str },
    Schedule,
}

impl<'a> Command<'a> {
    /// First match wins, in the order ping, logs, delete, schedule.
    pub fn parse(body: &'a str) -> Option<Self> {
        if body == PING {
            Some(Command::Ping)
        } else if body == LOGS {
            Some(Command::Logs)
        } else if let Some(id) = body.strip_prefix(DELETE_MESSAGE_PREFIX) {
            Some(Command::DeleteMessage { id })
        } else if body == SCHEDULE {
            Some(Command::Schedule)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => PING,
            Command::Logs => LOGS,
            Command::DeleteMessage { .. } => "!deleteMessage",
            Command::Schedule => SCHEDULE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Handled,
    Ignored,
}

/// Routes messages to handlers. Handler errors are logged and swallowed here so one bad
/// command cannot take the bot down.
pub struct CommandRouter {
    client: Arc<dyn MessagingClient>,
    status_log: PathBuf,
    tail_lines: usize,
    schedule: ScriptCommand,
}

impl CommandRouter {
    pub fn new(client: Arc<dyn MessagingClient>, config: &CommandsConfig) -> Self {
        Self {
            client,
            status_log: config.status_log.clone(),
            tail_lines: config.tail_lines,
            schedule: ScriptCommand::from_config(&config.schedule),
        }
    }

    pub async fn route(&self, message: &IncomingMessage) -> Routed {
        let Some(command) = Command::parse(&message.body) else {
            return Routed::Ignored;
        };
        let client = self.client.as_ref();
        let result = match command {
            Command::Ping => handlers::ping(client, message).await,
            Command::Logs => {
                handlers::logs(client, message, &self.status_log, self.tail_lines).await
            }
            Command::DeleteMessage { id } => handlers::delete_message(client, message, id).await,
            Command::Schedule => handlers::schedule(client, message, &self.schedule).await,
        };
        if let Err(e) = result {
            log::warn!("{} from {} failed: {}", command.name(), message.from, e);
        }
        Routed::Handled
    }
}
