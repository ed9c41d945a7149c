mod connection;
mod credentials;
mod handle;
mod handler;
mod rest;
mod session;
mod store;
mod transport;
mod typing;

pub use talkie_protocol::{
    ChatRoom, ClientEvent, Member, Message, MessageKind, RoomId, ServerEvent, UserId,
};

pub use credentials::{CredentialProvider, Credentials, StaticToken};
pub use handle::SessionHandle;
pub use handler::SessionHandler;
pub use rest::{AttachmentKind, Backend, ROOM_LIST_POLL_INTERVAL, RestClient, spawn_room_list_poller};
pub use session::{ChatSession, SessionConfig, SessionError, SessionPhase};
pub use store::MessageStore;
pub use transport::{Transport, TransportState};
pub use typing::{QUIET_WINDOW, TypingTracker};
