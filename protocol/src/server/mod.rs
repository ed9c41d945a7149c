
use crate::ParseError;
use crate::types::{Message, UserId};
use anyhow::Result;

/// Events the server pushes onto a live room socket.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A message was persisted and fanned out to the room. This is also the
    /// echo path for the local user's own sends and for finished uploads.
    NewMessage(Message),

    /// Another participant is typing.
    TypingPing { user_id: UserId, username: String },

    /// A participant opened the room; every message they could see is now
    /// read by them.
    ReadReceipt { reader_id: UserId },
}

/// Parse one websocket text frame into a structured event.
///
/// The envelope is a single JSON object discriminated by an optional `type`
/// field; a frame with no discriminant is an ordinary chat message.
pub fn parse_server_event(frame: &str) -> Result<ServerEvent> {
    let value: serde_json::Value =
        serde_json::from_str(frame).map_err(|e| ParseError::InvalidPayload(e.to_string()))?;

    match value.get("type").and_then(|t| t.as_str()) {
        Some("typing") => parse_typing(&value),
        Some("messages_read") => parse_read_receipt(&value),
        Some(other) => Err(ParseError::UnknownType(other.to_string()).into()),
        None => parse_message(value),
    }
}

fn parse_typing(value: &serde_json::Value) -> Result<ServerEvent> {
    let user_id = value
        .get("user_id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ParseError::MissingField("user_id".to_string()))?;

    let username = value
        .get("username")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ParseError::MissingField("username".to_string()))?;

    Ok(ServerEvent::TypingPing {
        user_id,
        username: username.to_string(),
    })
}

fn parse_read_receipt(value: &serde_json::Value) -> Result<ServerEvent> {
    let reader_id = value
        .get("reader_id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ParseError::MissingField("reader_id".to_string()))?;

    Ok(ServerEvent::ReadReceipt { reader_id })
}

fn parse_message(value: serde_json::Value) -> Result<ServerEvent> {
    let message: Message =
        serde_json::from_value(value).map_err(|e| ParseError::InvalidPayload(e.to_string()))?;

    Ok(ServerEvent::NewMessage(message))
}
