use std::sync::Arc;
use std::time::Duration;

use talkie_protocol::{ChatRoom, ClientEvent, Member, RoomId, ServerEvent};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::credentials::Credentials;
use crate::handle::SessionHandle;
use crate::handler::SessionHandler;
use crate::rest::{AttachmentKind, Backend};
use crate::store::MessageStore;
use crate::transport::Transport;
use crate::typing::{QUIET_WINDOW, TypingTracker};

/// Room-local failures surfaced through the handler. None of these are fatal
/// to the process; the worst case is a room that never reaches Active.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to connect to room {room_id}: {reason}")]
    Connect { room_id: RoomId, reason: String },

    #[error("Failed to load history for room {room_id}: {reason}")]
    HistoryFetch { room_id: RoomId, reason: String },
}

/// Room activation phase as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    NoRoom,
    Loading,
    Active,
    /// Activation never completed or the socket dropped; input stays
    /// disabled until another room switch.
    Failed,
}

/// Session tunables. `ws_base` is the socket endpoint root, e.g.
/// `ws://127.0.0.1:8000`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ws_base: String,
    pub quiet_window: Duration,
    /// Optional cap on outbound typing pings. `None` preserves the observed
    /// ping-per-keystroke behavior; setting an interval is an explicit
    /// hardening deviation, not a silent change.
    pub typing_throttle: Option<Duration>,
}

impl SessionConfig {
    pub fn new(ws_base: impl Into<String>) -> Self {
        Self {
            ws_base: ws_base.into(),
            quiet_window: QUIET_WINDOW,
            typing_throttle: None,
        }
    }
}

pub(crate) enum Command {
    SwitchRoom(Box<ChatRoom>),
    PostMessage(String),
    Typing,
    MarkRead,
    Upload {
        bytes: Vec<u8>,
        kind: AttachmentKind,
        filename: String,
    },
    Shutdown,
}

/// The real-time chat session core: one active room at a time, one open
/// socket at a time.
///
/// The session loop is the only writer of the message log, typing state, and
/// phase; everything else talks to it through a [`SessionHandle`]. Room
/// switching tears the old socket down before the new one opens, and history
/// load plus socket open run concurrently — the room is Active once both
/// have resolved.
pub struct ChatSession<B: Backend> {
    backend: Arc<B>,
    credentials: Credentials,
    config: SessionConfig,
    self_user: Member,
    commands: mpsc::UnboundedReceiver<Command>,
    handle_tx: mpsc::UnboundedSender<Command>,
    phase: SessionPhase,
    active_room: Option<ChatRoom>,
    transport: Option<Transport>,
    store: MessageStore,
    typing: TypingTracker,
    last_typing_sent: Option<Instant>,
}

impl<B: Backend + 'static> ChatSession<B> {
    pub fn new(
        backend: Arc<B>,
        credentials: Credentials,
        self_user: Member,
        config: SessionConfig,
    ) -> (Self, SessionHandle) {
        let (handle_tx, commands) = mpsc::unbounded_channel();
        let handle = SessionHandle::new(handle_tx.clone());

        let session = Self {
            backend,
            credentials,
            typing: TypingTracker::new(config.quiet_window),
            config,
            self_user,
            commands,
            handle_tx,
            phase: SessionPhase::NoRoom,
            active_room: None,
            transport: None,
            store: MessageStore::new(),
            last_typing_sent: None,
        };

        (session, handle)
    }

    /// Another handle onto this session's command queue.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.handle_tx.clone())
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn active_room(&self) -> Option<&ChatRoom> {
        self.active_room.as_ref()
    }

    /// The participant whose typing indicator is currently shown, if any.
    pub fn typing_user(&self) -> Option<&str> {
        self.typing.typing_user()
    }

    /// Whether the active room's socket is open for sending.
    pub fn is_connected(&self) -> bool {
        self.transport.as_ref().is_some_and(Transport::is_open)
    }

    /// Drive the session until shutdown, dispatching events to `handler`.
    ///
    /// This is the single consumer loop: commands, inbound socket events,
    /// and the typing quiet-window timer all resolve here.
    pub async fn run<H: SessionHandler>(&mut self, handler: &mut H) {
        loop {
            let deadline = self.typing.deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.apply_command(command, handler).await,
                },
                event = next_transport_event(&mut self.transport) => match event {
                    Some(event) => self.apply_event(event, handler).await,
                    None => self.transport_lost(handler).await,
                },
                () = sleep_until_deadline(deadline) => {
                    if self.typing.expire(Instant::now()) {
                        handler.on_typing_stopped().await;
                    }
                },
            }
        }

        self.teardown();
    }

    async fn apply_command<H: SessionHandler>(&mut self, command: Command, handler: &mut H) {
        match command {
            Command::SwitchRoom(room) => self.switch_room(*room, handler).await,
            Command::PostMessage(content) => {
                let content = content.trim().to_string();
                if content.is_empty() {
                    return;
                }

                self.send_event(ClientEvent::PostMessage { content });

                // A local send ends the shown indication right away rather
                // than waiting out the quiet window
                if self.typing.clear() {
                    handler.on_typing_stopped().await;
                }
            }
            Command::Typing => {
                if self.is_connected() && self.typing_ping_due(Instant::now()) {
                    self.send_event(ClientEvent::TypingPing {
                        username: self.self_user.username.clone(),
                    });
                }
            }
            Command::MarkRead => self.send_event(ClientEvent::MarkRead),
            Command::Upload {
                bytes,
                kind,
                filename,
            } => self.spawn_upload(bytes, kind, filename),
            Command::Shutdown => {}
        }
    }

    /// Room activation: close the old socket, reset derived state, then load
    /// history and open the new socket concurrently. Loading becomes Active
    /// only once both have resolved.
    async fn switch_room<H: SessionHandler>(&mut self, room: ChatRoom, handler: &mut H) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }

        self.store.clear();
        self.active_room = None;
        if self.typing.clear() {
            handler.on_typing_stopped().await;
        }

        let room_id = room.id;
        self.phase = SessionPhase::Loading;
        tracing::debug!(room = room_id, "Activating room");

        let (history, transport) = tokio::join!(
            self.backend.history(room_id),
            Transport::open(&self.config.ws_base, room_id, &self.credentials),
        );

        let history = match history {
            Ok(history) => history,
            Err(e) => {
                // The freshly opened transport (if any) is dropped and
                // closed with it
                let error = SessionError::HistoryFetch {
                    room_id,
                    reason: e.to_string(),
                };
                self.fail_activation(room_id, error, handler).await;
                return;
            }
        };

        let transport = match transport {
            Ok(transport) => transport,
            Err(e) => {
                let error = SessionError::Connect {
                    room_id,
                    reason: e.to_string(),
                };
                self.fail_activation(room_id, error, handler).await;
                return;
            }
        };

        self.store.replace(history);
        self.transport = Some(transport);
        self.active_room = Some(room);
        self.phase = SessionPhase::Active;
        handler.on_room_active(room_id).await;
    }

    async fn fail_activation<H: SessionHandler>(
        &mut self,
        room_id: RoomId,
        error: SessionError,
        handler: &mut H,
    ) {
        tracing::error!(room = room_id, error = %error, "Room activation failed");
        self.phase = SessionPhase::Failed;
        handler.on_room_error(room_id, &error).await;
    }

    async fn apply_event<H: SessionHandler>(&mut self, event: ServerEvent, handler: &mut H) {
        // Stale-delivery guard for rapid switching: only events belonging to
        // the active room may mutate derived state
        let Some(active_id) = self.active_room.as_ref().map(|room| room.id) else {
            return;
        };

        match event {
            ServerEvent::NewMessage(message) => {
                if message.room.is_some_and(|room| room != active_id) {
                    tracing::warn!(
                        room = ?message.room,
                        active = active_id,
                        "Dropping cross-room message"
                    );
                    return;
                }

                // Message arrival doubles as an end-of-typing signal
                if self.typing.clear() {
                    handler.on_typing_stopped().await;
                }

                let from_other = message.sender.id != self.self_user.id;
                self.store.append(message.clone());
                handler.on_message(&message).await;

                // The room is on screen, so a foreign message is read the
                // moment it lands
                if from_other {
                    self.send_event(ClientEvent::MarkRead);
                }
            }
            ServerEvent::TypingPing { user_id, username } => {
                if user_id == self.self_user.id {
                    return;
                }

                self.typing.note_ping(&username);
                handler.on_typing_started(&username).await;
            }
            ServerEvent::ReadReceipt { reader_id } => {
                self.store.apply_read_receipt(reader_id);
                handler.on_read_receipt(reader_id).await;
            }
        }
    }

    /// The socket dropped underneath us. Terminal for this activation: no
    /// automatic reconnect (an open question left to callers), input stays
    /// disabled until another room switch.
    async fn transport_lost<H: SessionHandler>(&mut self, handler: &mut H) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };

        transport.close();
        let room_id = transport.room_id();
        tracing::error!(room = room_id, "Room socket closed unexpectedly");

        self.phase = SessionPhase::Failed;
        handler.on_disconnected(room_id).await;
    }

    /// Enqueue an outbound event on the active socket. Sends without an open
    /// socket are logged and dropped; nothing is queued for later.
    fn send_event(&self, event: ClientEvent) {
        match &self.transport {
            Some(transport) => transport.send(event),
            None => tracing::warn!(?event, "No open room; dropping send"),
        }
    }

    /// Throttle decision for outbound typing pings. Unthrottled sessions
    /// ping on every input change.
    fn typing_ping_due(&mut self, now: Instant) -> bool {
        let Some(min_gap) = self.config.typing_throttle else {
            return true;
        };

        if self
            .last_typing_sent
            .is_some_and(|sent| now.duration_since(sent) < min_gap)
        {
            return false;
        }

        self.last_typing_sent = Some(now);
        true
    }

    /// Out-of-band upload; the finished message comes back through the socket
    /// echo, so there is nothing to insert locally. Failures are logged only.
    fn spawn_upload(&self, bytes: Vec<u8>, kind: AttachmentKind, filename: String) {
        let Some(room_id) = self.active_room.as_ref().map(|room| room.id) else {
            tracing::warn!("No active room; dropping upload");
            return;
        };

        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            if let Err(e) = backend.upload_attachment(room_id, bytes, kind, &filename).await {
                tracing::error!(room = room_id, error = %e, "Attachment upload failed");
            }
        });
    }

    fn teardown(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }

        self.active_room = None;
        self.phase = SessionPhase::NoRoom;
    }
}

async fn next_transport_event(transport: &mut Option<Transport>) -> Option<ServerEvent> {
    match transport {
        Some(transport) => transport.next_event().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use talkie_protocol::{Message, MessageKind, UserId};

    use crate::credentials::StaticToken;

    struct StubBackend;

    #[async_trait]
    impl Backend for StubBackend {
        async fn history(&self, _room_id: RoomId) -> Result<Vec<Message>> {
            Ok(vec![])
        }

        async fn start_private_chat(&self, _other_user_id: UserId) -> Result<ChatRoom> {
            anyhow::bail!("not used in tests")
        }

        async fn create_group(&self, _name: &str, _member_ids: &[UserId]) -> Result<ChatRoom> {
            anyhow::bail!("not used in tests")
        }

        async fn room_list(&self) -> Result<Vec<ChatRoom>> {
            Ok(vec![])
        }

        async fn users(&self) -> Result<Vec<Member>> {
            Ok(vec![])
        }

        async fn upload_attachment(
            &self,
            _room_id: RoomId,
            _bytes: Vec<u8>,
            _kind: AttachmentKind,
            _filename: &str,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        events: Vec<String>,
    }

    #[async_trait]
    impl SessionHandler for RecordingHandler {
        async fn on_message(&mut self, message: &Message) {
            self.events.push(format!("message:{}", message.content));
        }

        async fn on_typing_started(&mut self, username: &str) {
            self.events.push(format!("typing:{}", username));
        }

        async fn on_typing_stopped(&mut self) {
            self.events.push("typing-stopped".to_string());
        }

        async fn on_read_receipt(&mut self, reader_id: UserId) {
            self.events.push(format!("receipt:{}", reader_id));
        }
    }

    fn member(id: UserId, username: &str) -> Member {
        Member {
            id,
            username: username.to_string(),
            is_online: true,
        }
    }

    fn room(id: RoomId) -> ChatRoom {
        ChatRoom {
            id,
            is_group: true,
            group_name: Some(format!("room-{}", id)),
            members: vec![],
            last_message: None,
            unread_count: 0,
        }
    }

    fn text_message(room_id: RoomId, sender: Member, content: &str) -> Message {
        Message {
            id: None,
            room: Some(room_id),
            sender,
            content: content.to_string(),
            message_type: MessageKind::Text,
            image: None,
            audio: None,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            read_by: vec![],
        }
    }

    fn test_session() -> (ChatSession<StubBackend>, SessionHandle) {
        ChatSession::new(
            Arc::new(StubBackend),
            Arc::new(StaticToken("token".to_string())),
            member(1, "alice"),
            SessionConfig::new("ws://127.0.0.1:8000"),
        )
    }

    #[tokio::test]
    async fn test_inbound_messages_append_in_arrival_order() {
        let (mut session, _handle) = test_session();
        session.active_room = Some(room(5));
        let mut handler = RecordingHandler::default();

        for content in ["one", "two", "three"] {
            let event = ServerEvent::NewMessage(text_message(5, member(2, "bob"), content));
            session.apply_event(event, &mut handler).await;
        }

        let contents: Vec<_> = session
            .store()
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_cross_room_message_is_dropped() {
        let (mut session, _handle) = test_session();
        session.active_room = Some(room(5));
        let mut handler = RecordingHandler::default();

        // A stale event from a superseded room must not corrupt the log
        let stale = ServerEvent::NewMessage(text_message(4, member(2, "bob"), "stale"));
        session.apply_event(stale, &mut handler).await;

        assert!(session.store().is_empty());
        assert!(handler.events.is_empty());
    }

    #[tokio::test]
    async fn test_event_without_active_room_is_dropped() {
        let (mut session, _handle) = test_session();
        let mut handler = RecordingHandler::default();

        let event = ServerEvent::NewMessage(text_message(4, member(2, "bob"), "late"));
        session.apply_event(event, &mut handler).await;

        assert!(session.store().is_empty());
    }

    #[tokio::test]
    async fn test_read_receipt_merges_into_log() {
        let (mut session, _handle) = test_session();
        session.active_room = Some(room(5));
        let mut handler = RecordingHandler::default();

        let event = ServerEvent::NewMessage(text_message(5, member(1, "alice"), "mine"));
        session.apply_event(event, &mut handler).await;
        session
            .apply_event(ServerEvent::ReadReceipt { reader_id: 2 }, &mut handler)
            .await;

        assert!(session.store().messages()[0].seen_by_other());
        assert!(handler.events.contains(&"receipt:2".to_string()));
    }

    #[tokio::test]
    async fn test_message_arrival_clears_typing_indicator() {
        let (mut session, _handle) = test_session();
        session.active_room = Some(room(5));
        let mut handler = RecordingHandler::default();

        session
            .apply_event(
                ServerEvent::TypingPing {
                    user_id: 2,
                    username: "bob".to_string(),
                },
                &mut handler,
            )
            .await;
        assert_eq!(session.typing_user(), Some("bob"));

        let event = ServerEvent::NewMessage(text_message(5, member(2, "bob"), "done typing"));
        session.apply_event(event, &mut handler).await;

        assert_eq!(session.typing_user(), None);
        assert_eq!(
            handler.events,
            vec!["typing:bob", "typing-stopped", "message:done typing"]
        );
    }

    #[tokio::test]
    async fn test_self_typing_ping_is_ignored() {
        let (mut session, _handle) = test_session();
        session.active_room = Some(room(5));
        let mut handler = RecordingHandler::default();

        session
            .apply_event(
                ServerEvent::TypingPing {
                    user_id: 1,
                    username: "alice".to_string(),
                },
                &mut handler,
            )
            .await;

        assert_eq!(session.typing_user(), None);
        assert!(handler.events.is_empty());
    }

    #[tokio::test]
    async fn test_post_while_disconnected_is_a_noop() {
        let (mut session, _handle) = test_session();
        session.active_room = Some(room(5));
        let mut handler = RecordingHandler::default();

        // No transport: the send is logged and dropped, nothing panics
        session
            .apply_command(Command::PostMessage("hi".to_string()), &mut handler)
            .await;

        assert!(session.store().is_empty());
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_blank_message_is_not_sent() {
        let (mut session, _handle) = test_session();
        let mut handler = RecordingHandler::default();

        session
            .apply_command(Command::PostMessage("   ".to_string()), &mut handler)
            .await;

        assert!(handler.events.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unthrottled_typing_pings_are_always_due() {
        let (mut session, _handle) = test_session();

        assert!(session.typing_ping_due(Instant::now()));
        assert!(session.typing_ping_due(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_typing_pings_respect_the_interval() {
        let (mut session, _handle) = test_session();
        session.config.typing_throttle = Some(Duration::from_secs(1));

        assert!(session.typing_ping_due(Instant::now()));
        assert!(!session.typing_ping_due(Instant::now()));

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert!(session.typing_ping_due(Instant::now()));
    }

    #[derive(Debug, PartialEq, Eq)]
    enum SocketEvent {
        Opened(usize),
        Closed(usize),
    }

    /// Accepts loopback sockets and reports each one's open and close.
    async fn serve_sockets(
        listener: tokio::net::TcpListener,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) {
        let mut next_id = 0usize;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let id = next_id;
            next_id += 1;
            let events = events.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let _ = events.send(SocketEvent::Opened(id));
                while let Some(Ok(_)) = ws.next().await {}
                let _ = events.send(SocketEvent::Closed(id));
            });
        }
    }

    #[tokio::test]
    async fn test_switching_rooms_closes_the_superseded_socket() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        tokio::spawn(serve_sockets(listener, events_tx));

        let (mut session, _handle) = ChatSession::new(
            Arc::new(StubBackend),
            Arc::new(StaticToken("token".to_string())),
            member(1, "alice"),
            SessionConfig::new(format!("ws://{}", addr)),
        );
        let mut handler = RecordingHandler::default();

        session.switch_room(room(1), &mut handler).await;
        assert!(session.is_connected());

        session.switch_room(room(2), &mut handler).await;
        assert!(session.is_connected());

        let mut seen = Vec::new();
        for _ in 0..3 {
            let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
                .await
                .expect("socket event")
                .expect("server alive");
            seen.push(event);
        }

        assert!(seen.contains(&SocketEvent::Opened(0)));
        assert!(seen.contains(&SocketEvent::Opened(1)));
        assert!(seen.contains(&SocketEvent::Closed(0)));
        assert!(!seen.contains(&SocketEvent::Closed(1)));
    }
}
