//! One function per command. Each replies through the client on success; expected failures
//! (lookup miss, unreadable log, failing script) end quietly with no reply.

use crate::client::{ClientError, IncomingMessage, MessagingClient};
use crate::exec::ScriptCommand;
use crate::logging;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// `!ping` → "pong".
pub async fn ping(
    client: &dyn MessagingClient,
    message: &IncomingMessage,
) -> Result<(), HandlerError> {
    client.reply(message, "pong").await?;
    log::info!("{}: pinged!", message.from);
    Ok(())
}

/// `!logs` → last `lines` lines of the status log. An unreadable or empty log sends nothing.
pub async fn logs(
    client: &dyn MessagingClient,
    message: &IncomingMessage,
    status_log: &Path,
    lines: usize,
) -> Result<(), HandlerError> {
    let Ok(tail) = logging::read_tail(status_log, lines).await else {
        return Ok(());
    };
    if tail.is_empty() {
        return Ok(());
    }
    client.reply(message, &tail).await?;
    log::info!("{}: !logs", message.from);
    Ok(())
}

/// `!deleteMessage,<id>` → revoke the message for everyone, but only if the bot sent it.
pub async fn delete_message(
    client: &dyn MessagingClient,
    message: &IncomingMessage,
    id: &str,
) -> Result<(), HandlerError> {
    if id.is_empty() {
        log::warn!("{}: !deleteMessage without a message id", message.from);
        return Ok(());
    }
    let target = match client.get_message_by_id(id).await {
        Ok(m) => m,
        Err(e) => {
            log::warn!("error getting message: {}", e);
            return Ok(());
        }
    };
    if !target.from_me {
        log::debug!("{}: refusing to delete {} (not sent by us)", message.from, id);
        return Ok(());
    }
    client.delete_message(&target.id, true).await?;
    let confirmation = format!("Message with ID {} has been deleted!", id);
    client.reply(message, &confirmation).await?;
    log::info!("{}", confirmation);
    Ok(())
}

/// `!jadwaldeo` → stdout of the schedule script. Script failures are logged, not replied.
pub async fn schedule(
    client: &dyn MessagingClient,
    message: &IncomingMessage,
    script: &ScriptCommand,
) -> Result<(), HandlerError> {
    let output = match script.run().await {
        Ok(o) => o,
        Err(e) => {
            log::warn!("error getting schedule: {}", e);
            return Ok(());
        }
    };
    if output.stdout.is_empty() {
        log::warn!("schedule script {} printed nothing", script.program());
        return Ok(());
    }
    client.reply(message, &output.stdout).await?;
    log::info!("sending schedule to {}", message.from);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MemoryClient, SentMessage};
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;

    fn incoming(body: &str) -> IncomingMessage {
        IncomingMessage {
            id: "cmd-1".to_string(),
            from: "6281234@c.us".to_string(),
            body: body.to_string(),
            from_me: false,
        }
    }

    fn temp_file(contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wabot-handlers-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("status.log");
        std::fs::File::create(&path)
            .and_then(|mut f| f.write_all(contents.as_bytes()))
            .unwrap();
        path
    }

    fn sh(script: &str) -> ScriptCommand {
        ScriptCommand::new(
            "sh",
            vec!["-c".to_string(), script.to_string()],
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn ping_replies_pong_exactly_once() {
        let client = MemoryClient::new();
        ping(&client, &incoming("!ping")).await.unwrap();
        assert_eq!(
            client.sent().await,
            vec![SentMessage {
                chat_id: "6281234@c.us".to_string(),
                text: "pong".to_string(),
                quoted: Some("cmd-1".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn ping_send_failure_is_returned() {
        let client = MemoryClient::new();
        client.reject_sends(true);
        assert!(ping(&client, &incoming("!ping")).await.is_err());
    }

    #[tokio::test]
    async fn logs_short_file_replies_all_lines_trimmed() {
        let path = temp_file("\n[t] one\n[t] two\n[t] three\n\n");
        let client = MemoryClient::new();
        logs(&client, &incoming("!logs"), &path, 10).await.unwrap();
        let sent = client.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "[t] one\n[t] two\n[t] three");
    }

    #[tokio::test]
    async fn logs_long_file_replies_last_ten_in_order() {
        let contents: String = (1..=25).map(|i| format!("line {}\n", i)).collect();
        let path = temp_file(&contents);
        let client = MemoryClient::new();
        logs(&client, &incoming("!logs"), &path, 10).await.unwrap();
        let sent = client.sent().await;
        let expected: Vec<String> = (16..=25).map(|i| format!("line {}", i)).collect();
        assert_eq!(sent[0].text, expected.join("\n"));
    }

    #[tokio::test]
    async fn logs_missing_file_is_silent() {
        let client = MemoryClient::new();
        let path = std::env::temp_dir()
            .join(format!("wabot-missing-{}", uuid::Uuid::new_v4()))
            .join("status.log");
        logs(&client, &incoming("!logs"), &path, 10).await.unwrap();
        assert!(client.sent().await.is_empty());
    }

    #[tokio::test]
    async fn delete_foreign_message_does_nothing() {
        let client = MemoryClient::new();
        client
            .insert_message(IncomingMessage {
                id: "abc123".to_string(),
                from: "other@c.us".to_string(),
                body: "hi".to_string(),
                from_me: false,
            })
            .await;
        delete_message(&client, &incoming("!deleteMessage,abc123"), "abc123")
            .await
            .unwrap();
        assert!(client.sent().await.is_empty());
        assert!(client.deleted().await.is_empty());
    }

    #[tokio::test]
    async fn delete_own_message_revokes_and_confirms() {
        let client = MemoryClient::new();
        client
            .insert_message(IncomingMessage {
                id: "abc123".to_string(),
                from: "6281234@c.us".to_string(),
                body: "oops".to_string(),
                from_me: true,
            })
            .await;
        delete_message(&client, &incoming("!deleteMessage,abc123"), "abc123")
            .await
            .unwrap();
        assert_eq!(client.deleted().await, vec![("abc123".to_string(), true)]);
        let sent = client.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("abc123"));
    }

    #[tokio::test]
    async fn delete_unknown_message_is_logged_not_replied() {
        let client = MemoryClient::new();
        delete_message(&client, &incoming("!deleteMessage,nope"), "nope")
            .await
            .unwrap();
        assert!(client.sent().await.is_empty());
    }

    #[tokio::test]
    async fn delete_empty_id_is_ignored() {
        let client = MemoryClient::new();
        delete_message(&client, &incoming("!deleteMessage,"), "")
            .await
            .unwrap();
        assert!(client.sent().await.is_empty());
    }

    #[tokio::test]
    async fn schedule_replies_with_stdout_verbatim() {
        let client = MemoryClient::new();
        schedule(&client, &incoming("!jadwaldeo"), &sh("printf 'Mon: 08:00\\nTue: off\\n'"))
            .await
            .unwrap();
        let sent = client.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "Mon: 08:00\nTue: off\n");
    }

    #[tokio::test]
    async fn schedule_failure_sends_nothing() {
        let client = MemoryClient::new();
        schedule(&client, &incoming("!jadwaldeo"), &sh("echo broken >&2; exit 1"))
            .await
            .unwrap();
        assert!(client.sent().await.is_empty());
    }
}
