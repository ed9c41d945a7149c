use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type RoomId = i64;

/// A chat participant as listed by the directory service.
///
/// Presence is polled over REST, not pushed over the room socket, so
/// `is_online` is only as fresh as the last directory refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub is_online: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Audio,
}

/// One entry in a room's message log.
///
/// Immutable after creation except for `read_by`, which only ever grows as
/// read receipts arrive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomId>,
    pub sender: Member,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub message_type: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, with = "read_by_ids")]
    pub read_by: Vec<UserId>,
}

impl Message {
    /// "Seen" check for a self-authored message: someone other than the
    /// sender has a read mark on it.
    pub fn seen_by_other(&self) -> bool {
        self.read_by.iter().any(|id| *id != self.sender.id)
    }
}

/// The wire shape of `read_by` is a list of `{"id": n}` user references;
/// the in-memory model only cares about the ids.
mod read_by_ids {
    use super::UserId;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Reader {
        id: UserId,
    }

    pub fn serialize<S: Serializer>(ids: &[UserId], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(ids.iter().map(|id| Reader { id: *id }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<UserId>, D::Error> {
        let readers = Vec::<Reader>::deserialize(deserializer)?;
        Ok(readers.into_iter().map(|r| r.id).collect())
    }
}

/// A conversation, private (2 members) or group (N members).
///
/// Created server-side; the client only reads it. `last_message` and
/// `unread_count` are refreshed by the room-list poll, not by this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: RoomId,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub last_message: Option<Message>,
    #[serde(default)]
    pub unread_count: u32,
}

impl ChatRoom {
    /// Header display name: group rooms use their group name, private rooms
    /// borrow the other member's username.
    pub fn display_name(&self, self_id: UserId) -> String {
        if self.is_group {
            return self
                .group_name
                .clone()
                .unwrap_or_else(|| format!("Group {}", self.id));
        }

        self.members
            .iter()
            .find(|m| m.id != self_id)
            .map(|m| m.username.clone())
            .unwrap_or_else(|| "Private Chat".to_string())
    }
}
