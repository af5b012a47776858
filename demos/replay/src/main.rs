//! Replays a capture of a game's message stream.
//!
//! Reads one JSON message per line from a file (or stdin), runs them
//! through a [`Hub`] and prints what each game's handlers see.
//!
//! ```text
//! cargo run -p replay -- demos/replay/captures/werewolf.jsonl
//! cargo run -p replay -- --config strict.json < capture.jsonl
//! ```
//!
//! Lines are routed to the game named by the most recent `game_connect`.

use std::path::PathBuf;

use clap::Parser;
use serde_json::Value;
use tabletalk::logging::init_logging;
use tabletalk::prelude::*;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Replay a JSON-lines capture of a game's message stream.
#[derive(Parser, Debug)]
#[command(name = "replay", version)]
struct Args {
    /// Pipeline config (JSON) to replay under.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "warn")]
    log: String,

    /// Capture file; reads stdin when omitted.
    capture: Option<PathBuf>,
}

/// The game a line switches to, if it is a `game_connect`.
fn connect_target(line: &str) -> Option<GameId> {
    let value: Value = serde_json::from_str(line).ok()?;
    if value.get("type")?.as_str()? != Tag::GameConnect.as_str() {
        return None;
    }
    value.get("gameId")?.as_str().map(GameId::from)
}

fn describe(event: &Event) -> String {
    let narration = event.narration();
    if !narration.is_empty() {
        return narration;
    }
    match &event.body {
        Body::GameConnect { game_id } => {
            format!("{} joined {game_id}", event.username_or_default())
        }
        Body::GameDisconnect => format!("{} left", event.username_or_default()),
        Body::GameStarted { players } => format!("started with {}", players.join(", ")),
        Body::NextSpeaker { player } => format!("{player} has the turn"),
        Body::Phase { phase } => format!("phase {phase}"),
        Body::PlayerAction { player, action } => format!("{player}: {action}"),
        _ => String::new(),
    }
}

fn printing_dispatcher(game_id: &GameId) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    for tag in Tag::ALL {
        let game = game_id.clone();
        dispatcher.register(tag, move |event: &Event| {
            println!("[{game}] {tag:<16} {}", describe(event));
            Ok(())
        });
    }
    let game = game_id.clone();
    dispatcher.on_rejection(move |rejection: &Rejection| {
        eprintln!("[{game}] rejected: {rejection}");
        Ok(())
    });
    dispatcher
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args.log)?;

    let config = match &args.config {
        Some(path) => PipelineConfig::from_json(&tokio::fs::read_to_string(path).await?)?,
        None => PipelineConfig::default(),
    };
    tracing::info!(compat = %config.compat, "replaying");

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &args.capture {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let mut hub = Hub::with_dispatchers(config, printing_dispatcher);
    let mut current: Option<GameId> = None;
    let mut lines = reader.lines();
    let mut number = 0usize;

    while let Some(line) = lines.next_line().await? {
        number += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(game_id) = connect_target(line) {
            current = Some(game_id);
        }
        let Some(game_id) = &current else {
            eprintln!("line {number}: skipped, no game_connect yet");
            continue;
        };
        match hub.submit(game_id, line.as_bytes()).await {
            Ok(Outcome::Accepted { report, .. }) if !report.is_clean() => {
                eprintln!("line {number}: {} handler(s) failed", report.faults);
            }
            Ok(_) => {}
            Err(error) => eprintln!("line {number}: {error}"),
        }
    }

    for game_id in hub.game_ids() {
        if let Ok(Some(info)) = hub.info(&game_id).await {
            println!("{}", serde_json::to_string(&info)?);
        }
    }
    hub.shutdown().await;
    Ok(())
}
