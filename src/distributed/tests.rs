use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use serde_json::json;
use tokio::io::{AsyncWriteExt, BufReader};

use crate::error::{AppError, AppResult, DistributedError};
use crate::terminal::TerminalMessage;

use super::wire::{self, MAX_MESSAGE_BYTES};
use super::{
    Agent, AgentId, ChannelEndpoint, ChannelMessage, MessageEndpoint, ScenePayload,
    StatisticsReport, channels, format_timestamp, parse_timestamp,
};

fn statistics_message() -> ChannelMessage {
    let mut components = BTreeMap::new();
    components.insert("c1".to_owned(), json!({"requests": 3}));
    ChannelMessage {
        channel: channels::AGENT.to_owned(),
        scenario_id: "s1".to_owned(),
        version: 4,
        payload: ScenePayload::Statistics(StatisticsReport {
            scene_id: "s1".to_owned(),
            start_time: "20240102030405006".to_owned(),
            end_time: "20240102030415006".to_owned(),
            components,
            variables: BTreeMap::new(),
        }),
    }
}

#[test]
fn timestamps_use_millisecond_format() -> AppResult<()> {
    let time = Utc
        .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
        .single()
        .ok_or_else(|| AppError::distributed("Invalid test date"))?
        + chrono::Duration::milliseconds(6);
    let formatted = format_timestamp(time);
    if formatted != "20240102030405006" {
        return Err(AppError::distributed(format!(
            "Unexpected timestamp: {}",
            formatted
        )));
    }
    if parse_timestamp(&formatted)? != time {
        return Err(AppError::distributed("Timestamp did not parse back"));
    }
    if parse_timestamp("2024-01-02").is_ok() {
        return Err(AppError::distributed("Malformed timestamp accepted"));
    }
    Ok(())
}

#[test]
fn payload_is_tagged_by_type() -> AppResult<()> {
    let message = ChannelMessage {
        channel: channels::SCENE.to_owned(),
        scenario_id: "s1".to_owned(),
        version: 2,
        payload: ScenePayload::CancelComponents,
    };
    let encoded = serde_json::to_value(&message)?;
    if encoded.pointer("/payload/type") != Some(&json!("cancel_components")) {
        return Err(AppError::distributed(format!(
            "Unexpected encoding: {}",
            encoded
        )));
    }
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn wire_frames_messages_by_line() -> AppResult<()> {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (endpoint, writer) = wire::spawn_writer("test", client);
    endpoint.send_message(statistics_message())?;
    endpoint.send_message(ChannelMessage {
        channel: channels::COMPONENT_CONTEXT.to_owned(),
        scenario_id: "s1".to_owned(),
        version: 4,
        payload: ScenePayload::ComponentMessage {
            component_id: "c1".to_owned(),
            message: TerminalMessage::new().with("x", 1),
        },
    })?;
    drop(endpoint);
    writer.await?;

    let mut received = Vec::new();
    wire::forward_messages(server, |message| {
        received.push(message);
        Ok(())
    })
    .await?;

    if received.len() != 2 {
        return Err(AppError::distributed(format!(
            "Unexpected message count: {}",
            received.len()
        )));
    }
    if received.first() != Some(&statistics_message()) {
        return Err(AppError::distributed("First message did not survive the wire"));
    }
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn oversized_frames_are_rejected() -> AppResult<()> {
    let (mut client, server) = tokio::io::duplex(MAX_MESSAGE_BYTES + 1024);
    let oversized = vec![b'a'; MAX_MESSAGE_BYTES + 1];
    client
        .write_all(&oversized)
        .await
        .map_err(|err| AppError::distributed(format!("write failed: {}", err)))?;
    client
        .write_all(b"\n")
        .await
        .map_err(|err| AppError::distributed(format!("write failed: {}", err)))?;
    drop(client);

    let mut reader = BufReader::new(server);
    match wire::read_message(&mut reader).await {
        Err(AppError::Distributed(DistributedError::WireMessageTooLarge { .. })) => Ok(()),
        other => Err(AppError::distributed(format!(
            "Expected oversized error, got {:?}",
            other.map(|message| message.channel)
        ))),
    }
}

#[test]
fn detached_agent_cannot_send() -> AppResult<()> {
    let agent = Agent::new(AgentId::new("a1"), "Agent 1", None);
    match agent.send_message(statistics_message()) {
        Err(AppError::Distributed(DistributedError::AgentDetached { id })) if id == "a1" => {}
        other => {
            return Err(AppError::distributed(format!(
                "Expected detached error, got {:?}",
                other.is_ok()
            )));
        }
    }

    let (endpoint, mut receiver) = ChannelEndpoint::new("a1");
    agent.attach_endpoint(endpoint);
    agent.send_message(statistics_message())?;
    if receiver.try_recv().is_err() {
        return Err(AppError::distributed("Message did not reach the endpoint"));
    }
    Ok(())
}
