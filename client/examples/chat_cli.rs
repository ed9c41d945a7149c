use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use talkie_client::{
    Backend, ChatSession, Credentials, Member, Message, RestClient, RoomId, SessionConfig,
    SessionError, SessionHandle, SessionHandler, StaticToken,
};
use tokio::io::{AsyncBufReadExt, BufReader};

struct Printer;

#[async_trait]
impl SessionHandler for Printer {
    async fn on_room_active(&mut self, room_id: RoomId) {
        println!("-- room {} active --", room_id);
    }

    async fn on_room_error(&mut self, room_id: RoomId, error: &SessionError) {
        println!("-- room {} failed: {} --", room_id, error);
    }

    async fn on_message(&mut self, message: &Message) {
        println!("{}: {}", message.sender.username, message.content);
    }

    async fn on_typing_started(&mut self, username: &str) {
        println!("-- {} is typing... --", username);
    }

    async fn on_disconnected(&mut self, room_id: RoomId) {
        println!("-- lost connection to room {} --", room_id);
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /rooms       - List your chat rooms");
    println!("  /open <id>   - Switch to a room");
    println!("  /quit        - Exit");
    println!("  <message>    - Send to the current room");
}

async fn input_loop(backend: Arc<RestClient>, handle: SessionHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        if let Some(arg) = line.strip_prefix("/open ") {
            let room_id: i64 = arg.trim().parse()?;
            let rooms = backend.room_list().await?;
            match rooms.into_iter().find(|room| room.id == room_id) {
                Some(room) => handle.switch_room(room),
                None => println!("No such room: {}", room_id),
            }
        } else if line == "/rooms" {
            for room in backend.room_list().await? {
                println!(
                    "  {}  {}  ({} unread)",
                    room.id,
                    room.group_name.as_deref().unwrap_or("private"),
                    room.unread_count
                );
            }
        } else if line == "/help" {
            print_help();
        } else if line == "/quit" {
            handle.shutdown();
            break;
        } else {
            handle.post_message(line);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let token = std::env::var("TALKIE_TOKEN").unwrap_or_default();
    let user_id: i64 = std::env::var("TALKIE_USER_ID")?.parse()?;
    let username = std::env::var("TALKIE_USERNAME")?;
    let api_base = std::env::var("TALKIE_API")
        .unwrap_or_else(|_| "http://127.0.0.1:8000/auth-info/chatapp-ws".to_string());
    let ws_base = std::env::var("TALKIE_WS").unwrap_or_else(|_| "ws://127.0.0.1:8000".to_string());

    let credentials: Credentials = Arc::new(StaticToken(token));
    let backend = Arc::new(RestClient::new(api_base, Arc::clone(&credentials)));

    let self_user = Member {
        id: user_id,
        username,
        is_online: true,
    };

    let (mut session, handle) = ChatSession::new(
        Arc::clone(&backend),
        credentials,
        self_user,
        SessionConfig::new(ws_base),
    );

    print_help();
    tokio::spawn(async move {
        if let Err(e) = input_loop(backend, handle).await {
            eprintln!("Input error: {}", e);
        }
    });

    session.run(&mut Printer).await;
    Ok(())
}
