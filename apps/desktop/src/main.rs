//! Line-oriented chat shell over the session core.
//!
//! Plain input is sent to the joined room; slash commands drive membership,
//! editing and the attachment workflow.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    HttpApi, Membership, SelectedFile, SessionController, SessionEvent, WsTransport,
};
use shared::domain::MessageId;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chat", about = "Room-scoped chat client")]
struct Args {
    /// Base URL of the chat server, e.g. http://127.0.0.1:4000
    #[arg(long, default_value = "http://127.0.0.1:4000")]
    server_url: String,

    /// Display name used as the author of sent messages.
    #[arg(long)]
    username: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let api = Arc::new(HttpApi::new(&args.server_url));
    let transport = Arc::new(
        WsTransport::connect(&args.server_url)
            .await
            .context("event channel connection failed")?,
    );
    let controller = SessionController::new(api, transport);

    let mut events = controller.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    println!("connected to {}; /join <room> to start, /help for commands", args.server_url);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Err(err) = dispatch(&controller, &args.username, line).await {
            eprintln!("error: {err}");
        }
    }

    controller.leave().await;
    Ok(())
}

async fn dispatch(controller: &Arc<SessionController>, username: &str, line: &str) -> Result<()> {
    let coordinator = controller.coordinator();
    let uploader = controller.uploader();

    let (command, rest) = match line.strip_prefix('/') {
        Some(stripped) => match stripped.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (stripped, ""),
        },
        None => {
            coordinator.send(line).await?;
            return Ok(());
        }
    };

    match command {
        "help" => {
            println!("/join <room>   /leave   /list");
            println!("/edit <id> <text>   /delete <id>");
            println!("/attach <path>   /detach   /publish   /quit");
        }
        "join" => {
            controller.join(username, rest).await?;
        }
        "leave" => {
            controller.leave().await;
        }
        "list" => {
            match controller.membership().await {
                Membership::Joined { room } => println!("room {room}:"),
                _ => println!("not in a room"),
            }
            for message in controller.messages().await {
                print_message(&message.id, &message.author, &message.text, message.locator.as_deref());
            }
        }
        "edit" => {
            let (id, text) = rest
                .split_once(' ')
                .context("usage: /edit <id> <text>")?;
            coordinator.save_edit(&MessageId::from(id), text).await?;
        }
        "delete" => {
            anyhow::ensure!(!rest.is_empty(), "usage: /delete <id>");
            coordinator.delete(&MessageId::from(rest)).await?;
        }
        "attach" => {
            anyhow::ensure!(!rest.is_empty(), "usage: /attach <path>");
            uploader.select_file(read_file(rest).await?).await;
            println!("staged {rest}; /publish to send it");
        }
        "detach" => {
            uploader.clear_file().await;
        }
        "publish" => {
            uploader.publish().await?;
        }
        other => anyhow::bail!("unknown command: /{other}"),
    }
    Ok(())
}

async fn read_file(path: &str) -> Result<SelectedFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {path}"))?;
    let filename = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("attachment")
        .to_string();
    let mime_type = match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("png") => Some("image/png".to_string()),
        Some("jpg") | Some("jpeg") => Some("image/jpeg".to_string()),
        Some("gif") => Some("image/gif".to_string()),
        _ => None,
    };
    Ok(SelectedFile {
        filename,
        mime_type,
        bytes,
    })
}

fn print_event(event: SessionEvent) {
    match event {
        SessionEvent::SnapshotLoaded { room, count } => {
            println!("joined {room} ({count} messages)");
        }
        SessionEvent::MessageReceived(message) => {
            print_message(&message.id, &message.author, &message.text, message.locator.as_deref());
        }
        SessionEvent::MessageEdited(message) => {
            println!("[{}] {} (edited): {}", message.id, message.author, message.text);
        }
        SessionEvent::MessageDeleted(id) => println!("[{id}] deleted"),
        SessionEvent::Left => println!("left the room"),
        SessionEvent::Error(reason) => eprintln!("channel error: {reason}"),
    }
}

fn print_message(id: &MessageId, author: &str, text: &str, locator: Option<&str>) {
    match locator {
        Some(locator) => println!("[{id}] {author}: <attachment {locator}>"),
        None => println!("[{id}] {author}: {text}"),
    }
}
