//! Terminal client: joins as a user, prints chat traffic and sends each stdin
//! line as a message. Reconnects with exponential backoff; nothing is
//! replayed after a reconnect beyond the server's `init` snapshot.

use std::time::Duration;

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{error, info, warn};
use lobby::history::ChatMessage;
use lobby::messages::{ClientMessage, ServerMessage};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// WebSocket endpoint of the chat server
    #[clap(short, long, default_value = "ws://127.0.0.1:2052/ws")]
    url: String,
    /// Username to join as
    #[clap(short = 'n', long)]
    username: String,
    /// Upper bound for the reconnect delay, in milliseconds
    #[clap(long, default_value = "30000")]
    max_backoff_ms: u64,
}

struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Backoff {
            initial,
            max,
            current: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

enum SessionEnd {
    Disconnected,
    InputClosed,
}

async fn run_session(
    url: &str,
    username: &str,
    input: &mut Lines<BufReader<Stdin>>,
) -> Result<SessionEnd, Box<dyn std::error::Error>> {
    let (stream, _) = connect_async(url).await?;
    info!("Connected to {}", url);
    let (mut ws_tx, mut ws_rx) = stream.split();

    let join = serde_json::to_string(&ClientMessage::Join {
        username: username.to_string(),
    })?;
    ws_tx.send(Message::text(join)).await?;

    loop {
        tokio::select! {
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(event) => print_event(&event),
                        Err(e) => warn!("Unexpected server payload: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Disconnected),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            line = input.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    let message = serde_json::to_string(&ClientMessage::Message { content: line })?;
                    ws_tx.send(Message::text(message)).await?;
                }
                None => {
                    let _ = ws_tx.close().await;
                    return Ok(SessionEnd::InputClosed);
                }
            },
        }
    }
}

fn print_message(message: &ChatMessage) {
    let time = message.timestamp.format("%H:%M");
    println!("[{}] {}: {}", time, message.username, message.content);
}

fn print_event(event: &ServerMessage) {
    match event {
        ServerMessage::Init { messages, users } => {
            for message in messages {
                print_message(message);
            }
            let names: Vec<&str> = users.iter().map(|user| user.username.as_str()).collect();
            println!("* online: {}", names.join(", "));
        }
        ServerMessage::Message { message } => print_message(message),
        ServerMessage::UserJoined { username, .. } => println!("* {username} joined"),
        ServerMessage::UserLeft { username, .. } => println!("* {username} left"),
        ServerMessage::Error { message } => println!("! {message}"),
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut backoff =
        Backoff::new(Duration::from_millis(500), Duration::from_millis(args.max_backoff_ms));

    loop {
        match run_session(&args.url, &args.username, &mut input).await {
            Ok(SessionEnd::InputClosed) => return,
            Ok(SessionEnd::Disconnected) => {
                warn!("Disconnected from {}", args.url);
                backoff.reset();
            }
            Err(e) => error!("Connection to {} failed: {}", args.url, e),
        }

        let delay = backoff.next_delay();
        info!("Reconnecting in {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}
