use async_trait::async_trait;
use talkie_protocol::{Message, RoomId, UserId};

use crate::session::SessionError;

/// Trait for handling session events.
///
/// All methods have default no-op implementations, so you only need to
/// implement the events you render.
///
/// # Example
///
/// ```ignore
/// struct MyView;
///
/// #[async_trait::async_trait]
/// impl SessionHandler for MyView {
///     async fn on_message(&mut self, message: &Message) {
///         println!("{}: {}", message.sender.username, message.content);
///     }
/// }
/// ```
#[async_trait]
pub trait SessionHandler: Send {
    /// A room finished activating: history is loaded and the socket is open.
    async fn on_room_active(&mut self, room_id: RoomId) {
        let _ = room_id;
    }

    /// A room failed to activate. Input should stay disabled; the failure is
    /// room-local and never fatal to the process.
    async fn on_room_error(&mut self, room_id: RoomId, error: &SessionError) {
        let _ = (room_id, error);
    }

    /// A message was appended to the active room's log (live event or echo).
    async fn on_message(&mut self, message: &Message) {
        let _ = message;
    }

    /// Another participant started (or kept) typing.
    async fn on_typing_started(&mut self, username: &str) {
        let _ = username;
    }

    /// The typing indicator expired or was cleared by a message arrival.
    async fn on_typing_stopped(&mut self) {}

    /// A participant's read receipt was merged into the log.
    async fn on_read_receipt(&mut self, reader_id: UserId) {
        let _ = reader_id;
    }

    /// The room socket closed unexpectedly; terminal for this activation.
    async fn on_disconnected(&mut self, room_id: RoomId) {
        let _ = room_id;
    }
}
