//! Integration test: run the bot with an in-memory client on a free port and drive it over HTTP
//! and through client events. Does not require the bridge sidecar.

use lib::bot;
use lib::client::{ClientEvent, IncomingMessage, MemoryClient, MessagingClient};
use lib::config::{Config, ExhaustedPolicy, HttpStartPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

fn test_config(port: u16) -> Config {
    let mut config = Config::default();
    config.http.port = port;
    config.http.bind = "127.0.0.1".to_string();
    config.supervisor.retry_delay_ms = 10;
    config.commands.status_log = std::env::temp_dir()
        .join(format!("wabot-gateway-test-{}", uuid::Uuid::new_v4()))
        .join("status.log");
    config
}

struct Running {
    base: String,
    events: mpsc::Sender<ClientEvent>,
    stop: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<anyhow::Result<()>>,
}

fn start(config: Config, client: Arc<MemoryClient>) -> Running {
    let base = format!("http://127.0.0.1:{}", config.http.port);
    let (events, event_rx) = mpsc::channel(16);
    let (stop, stop_rx) = oneshot::channel::<()>();
    let client: Arc<dyn MessagingClient> = client;
    let task = tokio::spawn(bot::run_with_client(config, client, event_rx, async move {
        let _ = stop_rx.await;
    }));
    Running {
        base,
        events,
        stop,
        task,
    }
}

/// Poll GET / until the health JSON reports `client` == `want`.
async fn wait_for_client_state(base: &str, want: &str) -> serde_json::Value {
    let http = reqwest::Client::new();
    let mut last = None;
    for _ in 0..100 {
        match http.get(format!("{}/", base)).send().await {
            Ok(resp) if resp.status().is_success() => {
                let json: serde_json::Value = resp.json().await.expect("parse JSON");
                if json.get("client").and_then(|v| v.as_str()) == Some(want) {
                    return json;
                }
                last = Some(json.to_string());
            }
            Ok(resp) => last = Some(resp.status().to_string()),
            Err(e) => last = Some(e.to_string()),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("client never reached {:?}; last seen: {:?}", want, last);
}

#[tokio::test]
async fn health_reports_running_and_ready() {
    let port = free_port();
    let client = Arc::new(MemoryClient::new().failing_initialize(1));
    let running = start(test_config(port), client.clone());

    let json = wait_for_client_state(&running.base, "ready").await;
    assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
    assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));
    assert_eq!(client.initialize_calls(), 2);

    let _ = running.stop.send(());
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn send_accepts_json_form_and_text_bodies() {
    let port = free_port();
    let client = Arc::new(MemoryClient::new());
    let running = start(test_config(port), client.clone());
    wait_for_client_state(&running.base, "ready").await;
    let http = reqwest::Client::new();
    let url = format!("{}/send", running.base);

    let resp = http
        .post(&url)
        .json(&serde_json::json!({ "to": "111@c.us", "message": "from json" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = http
        .post(&url)
        .header("content-type", "application/x-www-form-urlencoded")
        .body("to=222%40c.us&message=from+form")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = http
        .post(format!("{}?to=333@c.us", url))
        .header("content-type", "text/plain")
        .body("from text")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let sent: Vec<(String, String)> = client
        .sent()
        .await
        .into_iter()
        .map(|m| (m.chat_id, m.text))
        .collect();
    assert_eq!(
        sent,
        vec![
            ("111@c.us".to_string(), "from json".to_string()),
            ("222@c.us".to_string(), "from form".to_string()),
            ("333@c.us".to_string(), "from text".to_string()),
        ]
    );

    let resp = http
        .post(&url)
        .header("content-type", "application/xml")
        .body("<to/>")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 415);

    let resp = http
        .post(&url)
        .header("content-type", "text/plain")
        .body("no recipient")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let _ = running.stop.send(());
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn send_body_over_limit_is_rejected_with_413() {
    let port = free_port();
    let mut config = test_config(port);
    config.http.json_limit_bytes = 256;
    let client = Arc::new(MemoryClient::new());
    let running = start(config, client.clone());
    wait_for_client_state(&running.base, "ready").await;
    let http = reqwest::Client::new();
    let url = format!("{}/send", running.base);

    let resp = http
        .post(&url)
        .json(&serde_json::json!({ "to": "1@c.us", "message": "x".repeat(4096) }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);

    let resp = http
        .post(&url)
        .json(&serde_json::json!({ "to": "1@c.us", "message": "short" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let sent = client.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, "short");

    let _ = running.stop.send(());
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn send_requires_configured_token() {
    let port = free_port();
    let mut config = test_config(port);
    config.http.token = Some("s3cret".to_string());
    let client = Arc::new(MemoryClient::new());
    let running = start(config, client.clone());
    wait_for_client_state(&running.base, "ready").await;
    let http = reqwest::Client::new();
    let url = format!("{}/send", running.base);
    let body = serde_json::json!({ "to": "1@c.us", "message": "hi" });

    let resp = http.post(&url).json(&body).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = http
        .post(&url)
        .bearer_auth("s3cret")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(client.sent().await.len(), 1);

    let _ = running.stop.send(());
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn keep_running_serves_http_with_unconnected_client() {
    let port = free_port();
    let client = Arc::new(MemoryClient::new().failing_initialize(100));
    let running = start(test_config(port), client.clone());

    wait_for_client_state(&running.base, "failed").await;
    assert_eq!(client.initialize_calls(), 3);

    let resp = reqwest::Client::new()
        .post(format!("{}/send", running.base))
        .json(&serde_json::json!({ "to": "1@c.us", "message": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
    assert!(client.sent().await.is_empty());

    let _ = running.stop.send(());
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn exit_policy_stops_the_bot_with_an_error() {
    let port = free_port();
    let mut config = test_config(port);
    config.supervisor.on_exhausted = ExhaustedPolicy::Exit;
    config.supervisor.max_attempts = 2;
    let client = Arc::new(MemoryClient::new().failing_initialize(100));
    let running = start(config, client.clone());

    let result = tokio::time::timeout(Duration::from_secs(5), running.task)
        .await
        .expect("bot should stop on its own")
        .unwrap();
    let err = result.unwrap_err();
    assert!(err.to_string().contains("2 attempt"), "{err:#}");
    assert_eq!(client.initialize_calls(), 2);
}

#[tokio::test]
async fn after_ready_policy_defers_listening() {
    let port = free_port();
    let mut config = test_config(port);
    config.http.start = HttpStartPolicy::AfterReady;
    let client = Arc::new(
        MemoryClient::new()
            .failing_initialize(1)
            .with_init_delay(Duration::from_millis(100)),
    );
    let running = start(config, client.clone());

    // first attempt is still in progress: nothing is listening yet
    assert!(reqwest::get(format!("{}/", running.base)).await.is_err());

    wait_for_client_state(&running.base, "ready").await;
    let _ = running.stop.send(());
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn chat_commands_flow_through_client_events() {
    let port = free_port();
    let client = Arc::new(MemoryClient::new());
    client
        .insert_message(IncomingMessage {
            id: "abc123".to_string(),
            from: "me@c.us".to_string(),
            body: "typo".to_string(),
            from_me: true,
        })
        .await;
    let running = start(test_config(port), client.clone());
    wait_for_client_state(&running.base, "ready").await;

    for (id, body) in [
        ("m1", "!ping"),
        ("m2", "good morning"),
        ("m3", "!deleteMessage,abc123"),
    ] {
        running
            .events
            .send(ClientEvent::Message(IncomingMessage {
                id: id.to_string(),
                from: "user@c.us".to_string(),
                body: body.to_string(),
                from_me: false,
            }))
            .await
            .unwrap();
    }

    let mut sent = Vec::new();
    for _ in 0..100 {
        sent = client.sent().await;
        if sent.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let mut texts: Vec<String> = sent.into_iter().map(|m| m.text).collect();
    texts.sort();
    assert_eq!(
        texts,
        vec![
            "Message with ID abc123 has been deleted!".to_string(),
            "pong".to_string(),
        ]
    );
    assert_eq!(client.deleted().await, vec![("abc123".to_string(), true)]);

    let _ = running.stop.send(());
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn busy_port_fails_startup() {
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = blocker.local_addr().unwrap().port();
    let client = Arc::new(MemoryClient::new());
    let running = start(test_config(port), client.clone());
    let err = running.task.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("already in use"), "{err:#}");
    assert_eq!(client.initialize_calls(), 0);
}
