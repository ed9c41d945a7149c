use talkie_protocol::ChatRoom;
use tokio::sync::mpsc;

use crate::rest::AttachmentKind;
use crate::session::Command;

/// Cloneable handle for driving a [`ChatSession`](crate::ChatSession).
///
/// This can be passed to handlers and cloned freely. Commands are applied by
/// the session loop, which is the single writer of all derived room state.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self { commands }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Session loop is gone; dropping command");
        }
    }

    /// Activate a room: close the previous socket, reload history, open a
    /// fresh one.
    pub fn switch_room(&self, room: ChatRoom) {
        self.send(Command::SwitchRoom(Box::new(room)));
    }

    /// Post a text message to the active room.
    ///
    /// Dropped with a log line if the transport is not open; there is no
    /// outbox or retry.
    pub fn post_message(&self, content: impl Into<String>) {
        self.send(Command::PostMessage(content.into()));
    }

    /// Report local keyboard activity to the other participants.
    pub fn notify_typing(&self) {
        self.send(Command::Typing);
    }

    /// Re-declare the active room as viewed.
    pub fn mark_read(&self) {
        self.send(Command::MarkRead);
    }

    /// Fire-and-forget attachment upload. The resulting message arrives later
    /// through the socket echo.
    pub fn upload_attachment(
        &self,
        bytes: Vec<u8>,
        kind: AttachmentKind,
        filename: impl Into<String>,
    ) {
        self.send(Command::Upload {
            bytes,
            kind,
            filename: filename.into(),
        });
    }

    /// Stop the session loop and close any open socket.
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }
}
