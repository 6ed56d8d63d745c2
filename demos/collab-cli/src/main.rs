//! Terminal client for a Roomsync room.
//!
//! Every line typed replaces the shared document. Lines starting with `/`
//! are commands:
//!
//! ```text
//! /who            list participants
//! /show           print the document
//! /save <name>    keep the document as a snippet
//! /snippets       list saved snippets
//! /quit           leave the room
//! ```
//!
//! Run `collab-cli --serve --room abc --name Ada` in one terminal and
//! `collab-cli --room abc --name Bob` in another.

use anyhow::{Context, Result};
use clap::Parser;
use roomsync_broker::Broker;
use roomsync_client::prelude::*;
use roomsync_services::{InMemorySnippetStore, NewSnippet, SnippetStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "collab-cli", about = "Join a collaborative editing room")]
struct Args {
    /// Broker endpoint.
    #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
    endpoint: String,

    /// Room to join.
    #[arg(long)]
    room: String,

    /// Display name shown to other participants.
    #[arg(long, default_value = "Anonymous")]
    name: String,

    /// Email used to key saved snippets.
    #[arg(long)]
    email: Option<String>,

    /// Also run a broker in this process, listening on `--bind`.
    #[arg(long, default_value_t = false)]
    serve: bool,

    /// Listen address for `--serve`.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if args.serve {
        let broker = Broker::builder()
            .bind(&args.bind)
            .build()
            .await
            .with_context(|| format!("cannot listen on {}", args.bind))?;
        tracing::info!(addr = %broker.local_addr()?, "embedded broker listening");
        tokio::spawn(async move {
            if let Err(e) = broker.run().await {
                tracing::error!(error = %e, "broker stopped");
            }
        });
    }

    let mut profile = UserProfile::new(&args.name);
    if let Some(email) = &args.email {
        profile = profile.with_email(email);
    }
    let mut client = RoomClient::join(
        &args.endpoint,
        RoomId::new(&args.room),
        profile,
        ClientConfig::default(),
    )
    .await
    .with_context(|| format!("cannot join room {} at {}", args.room, args.endpoint))?;

    println!("joined {} as {} ({} here)", args.room, args.name, client.roster().len());
    let snippets = InMemorySnippetStore::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if !run_command(&client, &snippets, &args, &line).await {
                    break;
                }
            }
            notice = client.next_notice() => match notice {
                Some(notice) => print_notice(&notice),
                None => break,
            },
        }
    }

    client.leave().await;
    println!("left {}", args.room);
    Ok(())
}

/// Handles one input line. Returns `false` to quit.
async fn run_command(
    client: &RoomClient,
    snippets: &InMemorySnippetStore,
    args: &Args,
    line: &str,
) -> bool {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "/quit" => return false,
        "/who" => {
            for p in client.roster() {
                println!("  {} ({})", p.username, p.socket_id);
            }
        }
        "/show" => println!("{}", client.document()),
        "/save" => {
            let email = args.email.clone().unwrap_or_default();
            let snippet = NewSnippet::new(email, rest, client.document(), "javascript");
            match snippets.save(snippet).await {
                Ok(saved) => println!("saved {} as {}", saved.code_name, saved.id),
                Err(e) => println!("not saved: {e}"),
            }
        }
        "/snippets" => match snippets.list(args.email.as_deref().unwrap_or_default()).await {
            Ok(found) => {
                for s in found {
                    println!("  {} {} ({} bytes)", s.id, s.code_name, s.code.len());
                }
            }
            Err(e) => println!("cannot list: {e}"),
        },
        _ => client.edit(line),
    }
    true
}

fn print_notice(notice: &SessionNotice) {
    match notice {
        SessionNotice::Joined { socket_id } => println!("* joined as {socket_id:?}"),
        SessionNotice::PeerJoined { username, .. } => println!("* {username} joined"),
        SessionNotice::PeerLeft { username, .. } => println!("* {username} left"),
        SessionNotice::RosterChanged(roster) => println!("* {} in room", roster.len()),
        SessionNotice::DocumentChanged(code) => println!("--- document ---\n{code}\n----------------"),
        SessionNotice::ConnectionLost => println!("* connection lost, reconnecting"),
    }
}
