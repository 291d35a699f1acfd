//! JSON-lines transport over stdio.
//!
//! Each stdin line is one inbound event:
//! `{"connection": "c1", "user": "u1", "name": "Ada", "event": "message", "data": {...}}`.
//! Each stdout line is one delivery: `{"connection": "c1", "event": "reply", ...}`.

use anyhow::Result;
use jaby_application::{ChannelTransport, Runtime};
use jaby_core::config::JabyConfig;
use jaby_core::protocol::OutboundEvent;
use jaby_core::user::UserProfile;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

#[derive(Debug, Deserialize)]
struct InboundLine {
    connection: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    name: Option<String>,
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Serialize)]
struct OutboundLine<'a> {
    connection: &'a str,
    #[serde(flatten)]
    event: &'a OutboundEvent,
}

pub async fn serve(
    config: &JabyConfig,
    default_user: Option<String>,
    default_name: Option<String>,
) -> Result<()> {
    let transport = Arc::new(ChannelTransport::new());
    let runtime = Runtime::from_config(config, transport.clone())?;

    let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_lines(out_rx));
    let mut opened = BTreeSet::new();

    tracing::info!("reading events from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let inbound: InboundLine = match serde_json::from_str(&line) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable input line");
                continue;
            }
        };

        let Some(user) = profile(&inbound, default_user.as_deref(), default_name.as_deref()) else {
            tracing::warn!(connection_id = %inbound.connection, "event without a user skipped");
            continue;
        };

        if !transport.is_open(&inbound.connection) {
            let inbox = transport.open(inbound.connection.clone());
            forward(inbound.connection.clone(), inbox, out_tx.clone());
            opened.insert(inbound.connection.clone());
        }

        runtime
            .router
            .handle_wire(&inbound.connection, &user, &inbound.event, inbound.data)
            .await;

        if inbound.event == "disconnect" {
            transport.close(&inbound.connection);
        }
    }

    let detached = runtime.router.disconnect_all().await;
    tracing::info!(detached, "input closed, shutting down");

    for connection_id in &opened {
        transport.close(connection_id);
    }
    drop(out_tx);
    writer.await??;
    Ok(())
}

fn profile(
    inbound: &InboundLine,
    default_user: Option<&str>,
    default_name: Option<&str>,
) -> Option<UserProfile> {
    match inbound.user.as_deref() {
        Some(user_id) => {
            let user = UserProfile::new(user_id);
            Some(match &inbound.name {
                Some(name) => user.with_name(name.clone()),
                None => user,
            })
        }
        None => {
            let user = UserProfile::new(default_user?);
            let name = inbound.name.as_deref().or(default_name);
            Some(match name {
                Some(name) => user.with_name(name),
                None => user,
            })
        }
    }
}

/// Serialises one connection's deliveries onto the shared stdout queue.
fn forward(
    connection_id: String,
    mut inbox: mpsc::UnboundedReceiver<OutboundEvent>,
    out: mpsc::UnboundedSender<String>,
) {
    tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            let line = OutboundLine {
                connection: &connection_id,
                event: &event,
            };
            match serde_json::to_string(&line) {
                Ok(line) => {
                    if out.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(connection_id = %connection_id, error = %e, "failed to encode delivery");
                }
            }
        }
    });
}

async fn write_lines(mut lines: mpsc::UnboundedReceiver<String>) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.recv().await {
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(json: &str) -> InboundLine {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_profile_prefers_line_user() {
        let inbound = line(r#"{"connection":"c1","user":"u1","name":"Ada","event":"start"}"#);
        let user = profile(&inbound, Some("fallback"), None).unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.display_name(), "Ada");
        assert_eq!(inbound.data, Value::Null);
    }

    #[test]
    fn test_profile_falls_back_to_default_user() {
        let inbound = line(r#"{"connection":"c1","event":"start"}"#);
        let user = profile(&inbound, Some("u9"), Some("Bo")).unwrap();
        assert_eq!(user.id, "u9");
        assert_eq!(user.display_name(), "Bo");
        assert!(profile(&inbound, None, None).is_none());
    }

    #[test]
    fn test_outbound_line_shape() {
        let event = OutboundEvent::reply("hi");
        let encoded = serde_json::to_value(OutboundLine {
            connection: "c1",
            event: &event,
        })
        .unwrap();
        assert_eq!(
            encoded,
            serde_json::json!({"connection": "c1", "event": "reply", "message": "hi"})
        );
    }
}
