use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use archivist_types::{MessagePayload, PlatformEvent};

use crate::error::GatewayError;
use crate::payload::{WireMessage, WireUser};

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

const INTENT_GUILD_MESSAGES: u64 = 1 << 9;
const INTENT_MESSAGE_CONTENT: u64 = 1 << 15;

/// Events buffered between the socket and the dispatch loop.
const EVENT_BUFFER: usize = 256;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Sink = SplitSink<Socket, Message>;
type Source = SplitStream<Socket>;

#[derive(Debug, Deserialize)]
struct Frame {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Hello {
    heartbeat_interval: u64,
}

impl Hello {
    fn heartbeat_interval(&self) -> Result<Duration, GatewayError> {
        if self.heartbeat_interval == 0 {
            return Err(GatewayError::Protocol("hello carried a zero heartbeat interval".into()));
        }
        Ok(Duration::from_millis(self.heartbeat_interval))
    }
}

#[derive(Debug, Deserialize)]
struct Ready {
    user: WireUser,
}

/// An identified gateway connection.
///
/// The socket is driven by a background task that heartbeats and forwards
/// message events on `events`. The task ends when the socket closes or the
/// receiver is dropped; reconnecting is left to the caller.
pub struct GatewaySession {
    /// The bot's own user id, from the Ready dispatch.
    pub user_id: u64,
    pub events: mpsc::Receiver<PlatformEvent>,
    pub task: JoinHandle<Result<(), GatewayError>>,
}

impl GatewaySession {
    pub async fn connect(url: &str, token: &str) -> Result<Self, GatewayError> {
        let (socket, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut sender, mut receiver) = socket.split();

        // Step 1: Hello carries the heartbeat interval
        let hello = next_frame(&mut receiver).await?;
        if hello.op != OP_HELLO {
            return Err(GatewayError::Protocol(format!("expected hello, got op {}", hello.op)));
        }
        let hello: Hello = serde_json::from_value(hello.d)?;
        let interval = hello.heartbeat_interval()?;

        // Step 2: Identify
        let identify = json!({
            "op": OP_IDENTIFY,
            "d": {
                "token": token,
                "intents": INTENT_GUILD_MESSAGES | INTENT_MESSAGE_CONTENT,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "archivist",
                    "device": "archivist",
                },
            },
        });
        sender.send(Message::Text(identify.to_string().into())).await?;

        // Step 3: Wait for Ready
        let mut seq = None;
        let user_id = loop {
            let frame = next_frame(&mut receiver).await?;
            if frame.s.is_some() {
                seq = frame.s;
            }

            match (frame.op, frame.t.as_deref()) {
                (OP_DISPATCH, Some("READY")) => {
                    let ready: Ready = serde_json::from_value(frame.d)?;
                    break ready.user.id;
                }
                (OP_INVALID_SESSION, _) => {
                    return Err(GatewayError::Protocol("session rejected during identify".into()));
                }
                (op, t) => trace!(op, event = ?t, "Ignoring frame before ready"),
            }
        };

        info!(user_id, heartbeat_ms = hello.heartbeat_interval, "Gateway session ready");

        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let task = tokio::spawn(run_session_loop(sender, receiver, interval, seq, tx));

        Ok(Self {
            user_id,
            events,
            task,
        })
    }
}

async fn run_session_loop(
    mut sender: Sink,
    mut receiver: Source,
    interval: Duration,
    mut seq: Option<u64>,
    events: mpsc::Sender<PlatformEvent>,
) -> Result<(), GatewayError> {
    let mut heartbeat = tokio::time::interval(interval);
    heartbeat.tick().await;
    let mut acked = true;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if !acked {
                    warn!("Heartbeat not acknowledged, dropping gateway session");
                    return Err(GatewayError::Protocol("heartbeat not acknowledged".into()));
                }
                acked = false;
                send_heartbeat(&mut sender, seq).await?;
            }
            frame = next_frame(&mut receiver) => {
                let frame = frame?;
                if frame.s.is_some() {
                    seq = frame.s;
                }

                match frame.op {
                    OP_DISPATCH => {
                        if let Some(event) = decode_dispatch(frame.t.as_deref(), frame.d) {
                            if events.send(event).await.is_err() {
                                info!("Event receiver dropped, closing gateway session");
                                return Ok(());
                            }
                        }
                    }
                    OP_HEARTBEAT => send_heartbeat(&mut sender, seq).await?,
                    OP_HEARTBEAT_ACK => acked = true,
                    OP_RECONNECT => {
                        return Err(GatewayError::Closed("server requested reconnect".into()));
                    }
                    OP_INVALID_SESSION => {
                        return Err(GatewayError::Closed("session invalidated".into()));
                    }
                    op => trace!(op, "Ignoring gateway opcode"),
                }
            }
        }
    }
}

async fn send_heartbeat(sender: &mut Sink, seq: Option<u64>) -> Result<(), GatewayError> {
    let beat = json!({ "op": OP_HEARTBEAT, "d": seq });
    sender.send(Message::Text(beat.to_string().into())).await?;
    trace!(?seq, "Heartbeat sent");
    Ok(())
}

/// Reads the next JSON frame, skipping websocket control traffic.
async fn next_frame(receiver: &mut Source) -> Result<Frame, GatewayError> {
    while let Some(msg) = receiver.next().await {
        match msg? {
            Message::Text(text) => return Ok(serde_json::from_str(text.as_str())?),
            Message::Close(frame) => {
                let reason = frame
                    .map(|f| format!("{} {}", u16::from(f.code), f.reason.as_str()))
                    .unwrap_or_else(|| "no close frame".into());
                return Err(GatewayError::Closed(reason));
            }
            _ => {}
        }
    }

    Err(GatewayError::Closed("stream ended".into()))
}

/// Maps a dispatch to a message event. Other dispatch types, undecodable
/// payloads and updates without content yield `None`.
fn decode_dispatch(kind: Option<&str>, data: Value) -> Option<PlatformEvent> {
    let kind = kind?;
    let wrap: fn(MessagePayload) -> PlatformEvent = match kind {
        "MESSAGE_CREATE" => PlatformEvent::Created,
        "MESSAGE_UPDATE" => PlatformEvent::Edited,
        "MESSAGE_DELETE" => PlatformEvent::Deleted,
        _ => {
            trace!(event = kind, "Ignoring dispatch");
            return None;
        }
    };

    let wire: WireMessage = match serde_json::from_value(data) {
        Ok(wire) => wire,
        Err(e) => {
            warn!(event = kind, error = %e, "Dropping undecodable message event");
            return None;
        }
    };

    // Embed-only updates carry no content and must not blank the archive
    if kind == "MESSAGE_UPDATE" && wire.content.is_none() {
        debug!(message_id = wire.id, "Update without content, dropping");
        return None;
    }

    Some(wrap(wire.into_payload()))
}
