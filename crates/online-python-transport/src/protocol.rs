//! Engine.IO v3 / Socket.IO framing used by the online-python socket.
//!
//! The website owns this contract and may change it at any time, so nothing
//! outside this module knows what a frame looks like.

use std::time::Duration;

use online_python_core::{InputFile, Inbound, Outbound};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Public online-python socket endpoint.
pub const DEFAULT_ENDPOINT: &str =
    "wss://repl.online-cpp.com/socket.io/?type=script&lang=python3&EIO=3&transport=websocket";

/// Engine.IO ping.
pub const PING: &str = "2";
/// Engine.IO pong.
pub const PONG: &str = "3";

const EVENT: &str = "42";
const KILL: &str = "41";

/// Protocol error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Cannot quote argument: {0}")]
    Quote(#[from] shlex::QuoteError),
    #[error("Run requested before any file was uploaded")]
    NothingToRun,
}

/// Payload of the Engine.IO open frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPacket {
    pub sid: String,
    /// Milliseconds between client pings.
    #[serde(default)]
    pub ping_interval: u64,
}

impl OpenPacket {
    /// How often the client should ping, if the server asked for it.
    #[must_use]
    pub const fn heartbeat(&self) -> Option<Duration> {
        if self.ping_interval == 0 {
            None
        } else {
            Some(Duration::from_millis(self.ping_interval))
        }
    }
}

/// One decoded text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `0{...}`
    Open(OpenPacket),
    /// `1`
    Close,
    /// `2`
    Ping,
    /// `3`
    Pong,
    /// `40`
    Connect,
    /// `41`
    Disconnect,
    /// `42[name, args...]`
    Event { name: String, args: Vec<Value> },
    /// `45<n>-[name, placeholder...]`, attachments follow as separate frames.
    BinaryEvent { name: String, args: Vec<Value> },
    /// Anything else.
    Other(String),
}

/// Decode a text frame.
///
/// # Errors
/// Returns error if the frame is empty or its JSON body is invalid.
pub fn decode(text: &str) -> Result<Frame, ProtocolError> {
    let Some(kind) = text.chars().next() else {
        return Err(ProtocolError::Malformed("empty frame".into()));
    };
    let rest = &text[kind.len_utf8()..];
    match kind {
        '0' => Ok(Frame::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Frame::Close),
        '2' => Ok(Frame::Ping),
        '3' => Ok(Frame::Pong),
        '4' => decode_packet(text, rest),
        _ => Ok(Frame::Other(text.to_string())),
    }
}

fn decode_packet(text: &str, packet: &str) -> Result<Frame, ProtocolError> {
    let Some(kind) = packet.chars().next() else {
        return Err(ProtocolError::Malformed("empty socket.io packet".into()));
    };
    let body = &packet[kind.len_utf8()..];
    match kind {
        '0' => Ok(Frame::Connect),
        '1' => Ok(Frame::Disconnect),
        '2' => {
            let (name, args) = decode_event(body)?;
            Ok(Frame::Event { name, args })
        }
        '5' => {
            let (_, payload) = body.split_once('-').ok_or_else(|| {
                ProtocolError::Malformed(format!("binary event without attachment count: {text}"))
            })?;
            let (name, args) = decode_event(payload)?;
            Ok(Frame::BinaryEvent { name, args })
        }
        _ => Ok(Frame::Other(text.to_string())),
    }
}

fn decode_event(body: &str) -> Result<(String, Vec<Value>), ProtocolError> {
    // Namespace and ack id, when present, sit in front of the array.
    let start = body
        .find('[')
        .ok_or_else(|| ProtocolError::Malformed(format!("event without payload: {body}")))?;
    let mut items: Vec<Value> = serde_json::from_str(&body[start..])?;
    if items.is_empty() {
        return Err(ProtocolError::Malformed("event without name".into()));
    }
    match items.remove(0) {
        Value::String(name) => Ok((name, items)),
        other => Err(ProtocolError::Malformed(format!("event name is not a string: {other}"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkKind {
    Output,
    Error,
    Input,
}

impl ChunkKind {
    fn from_event(name: &str) -> Option<Self> {
        match name {
            "output" => Some(Self::Output),
            "err" => Some(Self::Error),
            "input" => Some(Self::Input),
            _ => None,
        }
    }

    fn into_inbound(self, text: String) -> Inbound {
        match self {
            Self::Output => Inbound::Output(text),
            Self::Error => Inbound::Error(text),
            Self::Input => Inbound::InputRequest(text),
        }
    }
}

/// What the transport should do with a received frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Hand a message to the relay.
    Deliver(Inbound),
    /// Answer with a pong.
    Ping,
    /// The server closed the Engine.IO session.
    Close,
    /// Nothing to do.
    Skip,
}

/// Turns frames into [`Inbound`] messages.
///
/// Output arrives as an announcement (`451-["output", ...]`) followed by
/// the attachment frame, so the decoder remembers the announced kind.
#[derive(Debug, Default)]
pub struct InboundDecoder {
    pending: Option<ChunkKind>,
}

impl InboundDecoder {
    /// Create a decoder with no pending attachment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a text frame.
    pub fn text(&mut self, text: &str) -> Step {
        if let Some(kind) = self.pending.take() {
            return Step::Deliver(kind.into_inbound(text.to_string()));
        }
        let unrecognized = || Step::Deliver(Inbound::Unrecognized(text.to_string()));
        match decode(text) {
            Ok(Frame::Ping) => Step::Ping,
            Ok(Frame::Close) => Step::Close,
            Ok(Frame::Pong | Frame::Open(_) | Frame::Connect) => Step::Skip,
            Ok(Frame::Disconnect) => Step::Deliver(Inbound::Killed),
            Ok(Frame::Event { name, args }) => {
                event_to_inbound(&name, &args).map_or_else(unrecognized, Step::Deliver)
            }
            Ok(Frame::BinaryEvent { name, .. }) => match ChunkKind::from_event(&name) {
                Some(kind) => {
                    self.pending = Some(kind);
                    Step::Skip
                }
                None => unrecognized(),
            },
            Ok(Frame::Other(_)) => unrecognized(),
            Err(e) => {
                tracing::debug!("Undecodable frame: {e}");
                unrecognized()
            }
        }
    }

    /// Handle a binary frame.
    pub fn binary(&mut self, data: &[u8]) -> Step {
        let text = String::from_utf8_lossy(data).into_owned();
        match self.pending.take() {
            Some(kind) => Step::Deliver(kind.into_inbound(text)),
            None => Step::Deliver(Inbound::Unrecognized(text)),
        }
    }
}

fn event_to_inbound(name: &str, args: &[Value]) -> Option<Inbound> {
    if name == "exit" {
        let message = args
            .first()
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let code = args.get(1).and_then(exit_code);
        return Some(Inbound::Exit { message, code });
    }
    let text = args.first()?.as_str()?;
    ChunkKind::from_event(name).map(|kind| kind.into_inbound(text.to_string()))
}

fn exit_code(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Serialize)]
struct UploadedFile<'a> {
    code: &'a str,
    file_name: &'a str,
}

/// Turns [`Outbound`] messages into frames.
///
/// The site takes every file together with the run command in a single
/// `code` event, so uploads are staged until `Run` arrives.
#[derive(Debug, Default)]
pub struct OutboundEncoder {
    staged: Vec<InputFile>,
}

impl OutboundEncoder {
    /// Create an encoder with nothing staged.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a message. Returns `None` when the message was only staged.
    ///
    /// # Errors
    /// Returns error if `Run` arrives before any upload or an argument
    /// cannot be quoted.
    pub fn encode(&mut self, message: Outbound) -> Result<Option<String>, ProtocolError> {
        match message {
            Outbound::Upload(file) => {
                self.staged.push(file);
                Ok(None)
            }
            Outbound::Run { args } => {
                let entry = self
                    .staged
                    .first()
                    .ok_or(ProtocolError::NothingToRun)?
                    .name
                    .clone();
                let args = shlex::try_join(args.iter().map(String::as_str))?;
                let files = std::mem::take(&mut self.staged);
                let uploads: Vec<_> = files
                    .iter()
                    .map(|f| UploadedFile {
                        code: &f.content,
                        file_name: &f.name,
                    })
                    .collect();
                event_frame(&("code", uploads, args, entry)).map(Some)
            }
            Outbound::StdinLine(line) => event_frame(&("message", line)).map(Some),
            Outbound::Kill => Ok(Some(KILL.to_string())),
        }
    }
}

fn event_frame<T: Serialize>(payload: &T) -> Result<String, ProtocolError> {
    Ok(format!("{EVENT}{}", serde_json::to_string(payload)?))
}
