use std::sync::Arc;

use anyhow::Result;
use talkie_client::{
    Backend, Credentials, ROOM_LIST_POLL_INTERVAL, RestClient, StaticToken, spawn_room_list_poller,
};

/// Prints the inbox the way a sidebar would render it, refreshing on the
/// standard poll interval.
#[tokio::main]
async fn main() -> Result<()> {
    let token = std::env::var("TALKIE_TOKEN").unwrap_or_default();
    let api_base = std::env::var("TALKIE_API")
        .unwrap_or_else(|_| "http://127.0.0.1:8000/auth-info/chatapp-ws".to_string());

    let credentials: Credentials = Arc::new(StaticToken(token));
    let backend: Arc<dyn Backend> = Arc::new(RestClient::new(api_base, credentials));

    let users = backend.users().await?;
    println!("Directory:");
    for user in users {
        let presence = if user.is_online { "online" } else { "offline" };
        println!("  {}  {} ({})", user.id, user.username, presence);
    }

    let mut snapshots = spawn_room_list_poller(backend, ROOM_LIST_POLL_INTERVAL);
    while let Some(rooms) = snapshots.recv().await {
        println!("-- inbox --");
        for room in rooms {
            let name = room.group_name.clone().unwrap_or_else(|| "private".to_string());
            let preview = room
                .last_message
                .as_ref()
                .map(|m| m.content.as_str())
                .unwrap_or("");
            println!("  {}  {}  [{} unread]  {}", room.id, name, room.unread_count, preview);
        }
    }

    Ok(())
}
