use thiserror::Error;

pub mod client;
pub mod server;
pub mod types;

pub use client::ClientEvent;
pub use server::{ServerEvent, parse_server_event};
pub use types::{ChatRoom, Member, Message, MessageKind, RoomId, UserId};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unknown event type: {0}")]
    UnknownType(String),
}
