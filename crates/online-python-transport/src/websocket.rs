//! WebSocket session against the online-python socket endpoint.
//!
//! After the handshake the socket is split: a reader task decodes frames,
//! answers server pings and keeps the client heartbeat going, while a
//! writer task owns the sink. Both run independently of the caller, so the
//! connection stays alive while the relay waits on something else.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use online_python_core::{
    Direction, Inbound, Outbound, RemoteSession, TrafficSink, TransportError,
};
use tokio::{
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message},
};

use crate::protocol::{self, Frame, InboundDecoder, OutboundEncoder, PING, PONG, Step};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Work for the writer task.
enum Wire {
    Frame(String),
    Close,
}

/// Open a connection and complete the Socket.IO handshake.
///
/// # Errors
/// Returns [`TransportError::Connect`] if the endpoint is unreachable and
/// [`TransportError::Protocol`] if the handshake does not look right.
pub async fn connect(
    url: &str,
    traffic: Option<Arc<dyn TrafficSink>>,
) -> Result<WebSocketSession, TransportError> {
    tracing::info!("Connecting to {url}");
    let (mut stream, response) = connect_async(url)
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;
    tracing::debug!(status = %response.status(), "WebSocket upgrade complete");

    let heartbeat = handshake(&mut stream, traffic.as_ref()).await?;

    let (sink, stream) = stream.split();
    let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
    let (incoming_tx, incoming) = mpsc::unbounded_channel();

    let writer = tokio::spawn(write_loop(sink, outgoing_rx, traffic.clone()));
    let reader = tokio::spawn(read_loop(
        stream,
        heartbeat,
        outgoing.clone(),
        incoming_tx,
        traffic,
    ));

    Ok(WebSocketSession {
        encoder: OutboundEncoder::new(),
        outgoing,
        incoming,
        writer: Some(writer),
        reader,
    })
}

/// A connected Socket.IO session.
pub struct WebSocketSession {
    encoder: OutboundEncoder,
    outgoing: mpsc::UnboundedSender<Wire>,
    incoming: mpsc::UnboundedReceiver<Result<Inbound, TransportError>>,
    writer: Option<JoinHandle<()>>,
    reader: JoinHandle<()>,
}

/// Wait for the open and connect packets. Returns the client heartbeat the
/// server asked for.
async fn handshake(
    stream: &mut WsStream,
    traffic: Option<&Arc<dyn TrafficSink>>,
) -> Result<Option<Interval>, TransportError> {
    let open = match next_handshake_frame(stream, traffic).await? {
        Frame::Open(open) => open,
        other => {
            return Err(TransportError::Protocol(format!(
                "expected open packet, got {other:?}"
            )));
        }
    };
    tracing::info!(sid = %open.sid, "Engine.IO session opened");

    loop {
        match next_handshake_frame(stream, traffic).await? {
            Frame::Connect => break,
            Frame::Ping => {
                record(traffic, Direction::Outbound, PONG).await;
                stream
                    .send(Message::text(PONG))
                    .await
                    .map_err(|e| TransportError::Connection(e.to_string()))?;
            }
            Frame::Pong => {}
            other => {
                return Err(TransportError::Protocol(format!(
                    "expected connect packet, got {other:?}"
                )));
            }
        }
    }

    Ok(open.heartbeat().map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }))
}

async fn next_handshake_frame(
    stream: &mut WsStream,
    traffic: Option<&Arc<dyn TrafficSink>>,
) -> Result<Frame, TransportError> {
    loop {
        let text = match stream.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
            Some(Ok(Message::Binary(_))) => {
                return Err(TransportError::Protocol(
                    "binary frame during handshake".into(),
                ));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(TransportError::Connection(e.to_string())),
        };
        record(traffic, Direction::Inbound, text.as_str()).await;
        return protocol::decode(text.as_str())
            .map_err(|e| TransportError::Protocol(e.to_string()));
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outgoing: mpsc::UnboundedReceiver<Wire>,
    traffic: Option<Arc<dyn TrafficSink>>,
) {
    while let Some(Wire::Frame(frame)) = outgoing.recv().await {
        record(traffic.as_ref(), Direction::Outbound, &frame).await;
        tracing::debug!("Sending (raw): {frame:?}");
        if let Err(e) = sink.send(Message::text(frame)).await {
            tracing::error!("Failed to send frame: {e}");
            return;
        }
    }

    match sink.close().await {
        Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {}
        Err(e) => tracing::debug!("Failed to close connection: {e}"),
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    mut heartbeat: Option<Interval>,
    outgoing: mpsc::UnboundedSender<Wire>,
    incoming: mpsc::UnboundedSender<Result<Inbound, TransportError>>,
    traffic: Option<Arc<dyn TrafficSink>>,
) {
    let mut decoder = InboundDecoder::new();
    loop {
        let message = tokio::select! {
            message = stream.next() => message,
            () = tick(&mut heartbeat) => {
                if outgoing.send(Wire::Frame(PING.to_string())).is_err() {
                    return;
                }
                continue;
            }
        };

        let step = match message {
            Some(Ok(Message::Text(text))) => {
                record(traffic.as_ref(), Direction::Inbound, text.as_str()).await;
                tracing::debug!("Receiving (raw): {:?}", text.as_str());
                decoder.text(text.as_str())
            }
            Some(Ok(Message::Binary(data))) => {
                let lossy = String::from_utf8_lossy(&data);
                record(traffic.as_ref(), Direction::Inbound, &lossy).await;
                decoder.binary(&data)
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!(?frame, "Server closed the websocket");
                return;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                let _ = incoming.send(Err(TransportError::Connection(e.to_string())));
                return;
            }
            None => return,
        };

        let delivered = match step {
            Step::Deliver(inbound) => incoming.send(Ok(inbound)).is_ok(),
            Step::Ping => outgoing.send(Wire::Frame(PONG.to_string())).is_ok(),
            Step::Close => return,
            Step::Skip => true,
        };
        if !delivered {
            return;
        }
    }
}

async fn record(traffic: Option<&Arc<dyn TrafficSink>>, direction: Direction, raw: &str) {
    if let Some(traffic) = traffic {
        traffic.record(direction, raw).await;
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[async_trait]
impl RemoteSession for WebSocketSession {
    async fn send(&mut self, message: Outbound) -> Result<(), TransportError> {
        tracing::info!(kind = message.kind(), "Sending");
        let frame = self
            .encoder
            .encode(message)
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        match frame {
            Some(frame) => self
                .outgoing
                .send(Wire::Frame(frame))
                .map_err(|_| TransportError::Closed),
            None => Ok(()),
        }
    }

    async fn recv(&mut self) -> Result<Option<Inbound>, TransportError> {
        self.incoming.recv().await.transpose()
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // Queued frames go out before the close frame.
        let _ = self.outgoing.send(Wire::Close);
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.await {
                tracing::debug!("Writer task ended abnormally: {e}");
            }
        }
        self.reader.abort();
        Ok(())
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(writer) = &self.writer {
            writer.abort();
        }
    }
}
