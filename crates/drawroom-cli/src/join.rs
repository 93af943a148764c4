//! `drawroom join`: a terminal room member.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use drawroom_client::{
    ChatMessage, ClientError, ClientOptions, ParticipantEvent, RoomClient, RoomEventHandler,
};
use drawroom_core::types::ConnectionId;

/// Prints room traffic to stdout.
struct TerminalHandler;

impl RoomEventHandler for TerminalHandler {
    fn on_draw(&self, user_id: ConnectionId, draw_data: Value) {
        println!("[draw] {user_id}: {draw_data}");
    }

    fn on_participant_event(&self, event: ParticipantEvent) {
        match event {
            ParticipantEvent::Current { participants } => {
                println!("* joined, {} other participant(s) present", participants.len());
            }
            ParticipantEvent::Joined { user_id, name } => println!("* {name} joined ({user_id})"),
            ParticipantEvent::Left { user_id } => println!("* {user_id} left"),
        }
    }

    fn on_chat(&self, message: ChatMessage) {
        println!("<{}> {}", message.name, message.message);
    }
}

/// What a line of terminal input asks for.
#[derive(Debug, PartialEq)]
enum Input {
    Chat(String),
    Draw(Value),
    Skip,
}

fn parse_line(line: &str) -> Result<Input, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Skip);
    }
    match line.strip_prefix("/draw ") {
        Some(payload) => Ok(Input::Draw(serde_json::from_str(payload)?)),
        None => Ok(Input::Chat(line.to_string())),
    }
}

/// Stay in the room until stdin closes or Ctrl-C.
pub async fn run(options: ClientOptions) -> anyhow::Result<()> {
    println!(
        "Joining room '{}' at {} as {} (type to chat, '/draw <json>' to draw)",
        options.room_id, options.url, options.name
    );
    let client = RoomClient::connect(options, TerminalHandler);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let sent = match parse_line(&line) {
            Ok(Input::Chat(message)) => client.send_chat(message),
            Ok(Input::Draw(draw_data)) => client.send_draw(draw_data),
            Ok(Input::Skip) => continue,
            Err(e) => {
                warn!(%e, "Draw payload is not valid JSON");
                continue;
            }
        };
        match sent {
            Ok(()) => {}
            Err(ClientError::NotJoined) => println!("* not connected, message dropped"),
            Err(e) => warn!(%e, "Failed to send"),
        }
    }

    client.shutdown().await;
    Ok(())
}
