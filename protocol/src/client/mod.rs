use serde_json::json;

/// Events the client can push onto a live room socket.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Post a text message to the room. The server echoes it back to every
    /// participant (including the sender) as a message event.
    PostMessage { content: String },

    /// Tell other participants this user is typing.
    TypingPing { username: String },

    /// Declare "I am viewing this room now"; the server fans out a
    /// `messages_read` event to the other participants.
    MarkRead,
}

impl ClientEvent {
    /// Serialize to the wire envelope: one JSON object per frame.
    ///
    /// Plain messages carry no `type` discriminant; the absence of the field
    /// is what marks them as chat content.
    pub fn to_wire_format(&self) -> String {
        match self {
            Self::PostMessage { content } => json!({ "message": content }).to_string(),
            Self::TypingPing { username } => {
                json!({ "type": "typing", "username": username }).to_string()
            }
            Self::MarkRead => json!({ "type": "mark_read" }).to_string(),
        }
    }
}
