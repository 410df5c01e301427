// One WebSocket connection per channel. The connection task only forwards
// lifecycle events and raw text frames, in order, to the supervisor; all
// decisions (dispatch, reconnect, status) are taken there.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use super::{ChannelKind, ChannelState};

const OUTBOUND_BUFFER: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened { channel: ChannelKind, generation: u64 },
    Message { channel: ChannelKind, generation: u64, text: String },
    Error { channel: ChannelKind, generation: u64, error: String },
    Closed { channel: ChannelKind, generation: u64, reason: String },
}

/// Owns the lifecycle of one streaming connection. Every `open()` starts a
/// new generation; events tagged with an older generation are stale and the
/// owner must ignore them (see `on_opened` / `on_closed` / `is_current`).
pub struct TransportChannel {
    kind: ChannelKind,
    url: String,
    state: ChannelState,
    generation: u64,
    outbound: Option<mpsc::Sender<String>>,
    task: Option<JoinHandle<()>>,
    events: mpsc::Sender<ChannelEvent>,
}

impl TransportChannel {
    pub fn new(kind: ChannelKind, url: String, events: mpsc::Sender<ChannelEvent>) -> Self {
        Self { kind, url, state: ChannelState::Closed, generation: 0, outbound: None, task: None, events }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.task.is_some()
    }

    /// Start a connection attempt. No-op while connecting or open.
    pub fn open(&mut self) -> bool {
        if self.state != ChannelState::Closed {
            return false;
        }
        self.generation += 1;
        self.state = ChannelState::Connecting;

        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        self.outbound = Some(tx);
        info!(channel = %self.kind, url = %self.url, generation = self.generation, "Connecting");
        self.task = Some(tokio::spawn(run_connection(
            self.kind,
            self.generation,
            self.url.clone(),
            self.events.clone(),
            rx,
        )));
        true
    }

    /// Queue a frame. Returns false (and drops the frame) unless open.
    pub fn send(&self, frame: String) -> bool {
        if self.state != ChannelState::Open {
            return false;
        }
        match self.outbound.as_ref().map(|tx| tx.try_send(frame)) {
            Some(Ok(())) => true,
            Some(Err(e)) => {
                warn!(channel = %self.kind, error = %e, "Dropping outbound frame");
                false
            }
            None => false,
        }
    }

    /// Graceful, idempotent close. Dropping the outbound sender makes the
    /// connection task send a Close frame and exit; its remaining events are
    /// stale because the generation moves on. Returns the task handle the
    /// first time so the caller may wait for the close handshake.
    pub fn close(&mut self) -> Option<JoinHandle<()>> {
        let task = self.task.take()?;
        debug!(channel = %self.kind, generation = self.generation, "Closing");
        self.generation += 1;
        self.outbound = None;
        self.state = ChannelState::Closed;
        Some(task)
    }

    pub fn on_opened(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) || self.state != ChannelState::Connecting {
            return false;
        }
        self.state = ChannelState::Open;
        true
    }

    /// Returns true when this close belongs to the live connection, i.e.
    /// exactly once per connection attempt.
    pub fn on_closed(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.state = ChannelState::Closed;
        self.outbound = None;
        self.task = None;
        true
    }
}

async fn run_connection(
    channel: ChannelKind,
    generation: u64,
    url: String,
    events: mpsc::Sender<ChannelEvent>,
    mut outbound: mpsc::Receiver<String>,
) {
    let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws_stream, response)) => {
            debug!(%channel, status = %response.status(), "WebSocket handshake complete");
            ws_stream
        }
        Err(e) => {
            let error = e.to_string();
            let _ = events.send(ChannelEvent::Error { channel, generation, error: error.clone() }).await;
            let _ = events
                .send(ChannelEvent::Closed { channel, generation, reason: format!("connect failed: {error}") })
                .await;
            return;
        }
    };

    if events.send(ChannelEvent::Opened { channel, generation }).await.is_err() {
        return;
    }

    let (mut write, mut read) = ws_stream.split();
    let reason = loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    trace!(%channel, %text, "Sending frame");
                    if let Err(e) = write.send(Message::Text(text)).await {
                        break format!("send failed: {e}");
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    let _ = write.close().await;
                    break "closed by client".to_string();
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if events.send(ChannelEvent::Message { channel, generation, text }).await.is_err() {
                        break "supervisor gone".to_string();
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        if events.send(ChannelEvent::Message { channel, generation, text }).await.is_err() {
                            break "supervisor gone".to_string();
                        }
                    }
                    Err(_) => warn!(%channel, "Dropping non UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(f) => format!("closed by server ({}): {}", u16::from(f.code), f.reason),
                        None => "closed by server".to_string(),
                    };
                }
                // ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let error = e.to_string();
                    let _ = events.send(ChannelEvent::Error { channel, generation, error: error.clone() }).await;
                    break error;
                }
                None => break "stream ended".to_string(),
            },
        }
    };

    let _ = events.send(ChannelEvent::Closed { channel, generation, reason }).await;
}
