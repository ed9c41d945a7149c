use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use talkie_protocol::{ChatRoom, Member, Message, RoomId, UserId};
use tokio::sync::mpsc;

use crate::credentials::Credentials;

/// Default sidebar refresh interval for the room-list poller.
pub const ROOM_LIST_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Attachment payload kinds accepted by the upload endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Audio,
}

impl AttachmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
        }
    }
}

/// REST collaborator consumed by the session core.
///
/// Production code uses [`RestClient`]; tests stub this out.
#[async_trait]
pub trait Backend: Send + Sync {
    /// One-shot history fetch, called exactly once per room activation.
    async fn history(&self, room_id: RoomId) -> Result<Vec<Message>>;

    /// Create-or-look-up a 1:1 room with another user.
    async fn start_private_chat(&self, other_user_id: UserId) -> Result<ChatRoom>;

    async fn create_group(&self, name: &str, member_ids: &[UserId]) -> Result<ChatRoom>;

    /// Inbox listing with last-message snapshots and unread counts. Polled by
    /// callers on a fixed interval; the session core never calls this itself.
    async fn room_list(&self) -> Result<Vec<ChatRoom>>;

    /// Directory listing. Carries the polled `is_online` presence bit, which
    /// is not delivered over the room socket.
    async fn users(&self) -> Result<Vec<Member>>;

    /// Persist a binary attachment out-of-band. The resulting message comes
    /// back later through the room socket echo; the client never inserts it
    /// locally.
    async fn upload_attachment(
        &self,
        room_id: RoomId,
        bytes: Vec<u8>,
        kind: AttachmentKind,
        filename: &str,
    ) -> Result<()>;
}

/// `reqwest`-backed production collaborator. Every request carries the
/// current bearer token from the injected credential capability.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.credentials.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl Backend for RestClient {
    async fn history(&self, room_id: RoomId) -> Result<Vec<Message>> {
        let url = self.url(&format!("api/messages/{}/", room_id));
        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .context("History request failed")?;

        response
            .error_for_status()
            .context("History request rejected")?
            .json()
            .await
            .context("Invalid history payload")
    }

    async fn start_private_chat(&self, other_user_id: UserId) -> Result<ChatRoom> {
        let url = self.url("api/private-chat/");
        let response = self
            .authorize(self.http.post(url))
            .json(&serde_json::json!({ "user_id": other_user_id }))
            .send()
            .await
            .context("Private chat request failed")?;

        response
            .error_for_status()
            .context("Private chat request rejected")?
            .json()
            .await
            .context("Invalid chat room payload")
    }

    async fn create_group(&self, name: &str, member_ids: &[UserId]) -> Result<ChatRoom> {
        let url = self.url("api/groups/create/");
        let response = self
            .authorize(self.http.post(url))
            .json(&create_group_payload(name, member_ids))
            .send()
            .await
            .context("Group creation request failed")?;

        response
            .error_for_status()
            .context("Group creation rejected")?
            .json()
            .await
            .context("Invalid chat room payload")
    }

    async fn room_list(&self) -> Result<Vec<ChatRoom>> {
        let url = self.url("api/chats/");
        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .context("Room list request failed")?;

        response
            .error_for_status()
            .context("Room list request rejected")?
            .json()
            .await
            .context("Invalid room list payload")
    }

    async fn users(&self) -> Result<Vec<Member>> {
        let url = self.url("api/users/");
        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .context("User list request failed")?;

        response
            .error_for_status()
            .context("User list request rejected")?
            .json()
            .await
            .context("Invalid user list payload")
    }

    async fn upload_attachment(
        &self,
        room_id: RoomId,
        bytes: Vec<u8>,
        kind: AttachmentKind,
        filename: &str,
    ) -> Result<()> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("group_id", room_id.to_string())
            .text("message_type", kind.as_str().to_string());

        let url = self.url("api/upload-file/");
        let response = self
            .authorize(self.http.post(url))
            .multipart(form)
            .send()
            .await
            .context("Upload request failed")?;

        response.error_for_status().context("Upload rejected")?;
        Ok(())
    }
}

/// Group creation body. The backend expects `group_name`, not `name`.
fn create_group_payload(name: &str, member_ids: &[UserId]) -> serde_json::Value {
    serde_json::json!({ "group_name": name, "member_ids": member_ids })
}

/// Spawn a fixed-interval room-list snapshot task (the sidebar refresh
/// cycle). The session core never polls; this is a convenience for callers
/// that render the inbox. Dropping the receiver stops the task.
pub fn spawn_room_list_poller(
    backend: Arc<dyn Backend>,
    interval: Duration,
) -> mpsc::UnboundedReceiver<Vec<ChatRoom>> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match backend.room_list().await {
                Ok(rooms) => {
                    if tx.send(rooms).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Room list poll failed"),
            }
        }
    });

    rx
}
