//! The single event loop behind a [`MarketLink`](super::MarketLink).
//!
//! Owns both transport channels, their reconnect policies and timers, the
//! shared heartbeat, and the only write path into the store. Everything that
//! happens to the streaming side is serialised through [`Supervisor::run`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::dispatcher::Dispatcher;
use super::heartbeat::{ping_frame, Heartbeat};
use super::reconnect::{ReconnectDecision, ReconnectPolicy};
use super::status::{ChannelStatus, StatusAggregator};
use super::transport::{ChannelEvent, TransportChannel};
use super::{ChannelKind, ChannelState};
use crate::config::ClientConfig;
use crate::store::StateStore;

const EVENT_BUFFER: usize = 1024;
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub(crate) enum Command {
    Reset,
    Shutdown(oneshot::Sender<()>),
}

struct Slot {
    channel: TransportChannel,
    policy: ReconnectPolicy,
    // single authoritative reconnect timer; replaced, never stacked
    timer: Option<JoinHandle<()>>,
    timer_seq: u64,
}

impl Slot {
    fn status(&self) -> ChannelStatus {
        ChannelStatus {
            state: self.channel.state(),
            reconnect_attempts: self.policy.attempts(),
            exhausted: self.policy.is_exhausted(),
        }
    }

    fn cancel_timer(&mut self) -> bool {
        match self.timer.take() {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }
}

pub(crate) struct Supervisor {
    market_data: Slot,
    trades: Slot,
    dispatcher: Dispatcher,
    status: StatusAggregator,
    heartbeat: Heartbeat,
    events: mpsc::Receiver<ChannelEvent>,
    timers_tx: mpsc::UnboundedSender<(ChannelKind, u64)>,
    timers: mpsc::UnboundedReceiver<(ChannelKind, u64)>,
    commands: mpsc::Receiver<Command>,
}

impl Supervisor {
    pub(crate) fn new(
        config: &ClientConfig,
        store: Arc<StateStore>,
        status: StatusAggregator,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let (events_tx, events) = mpsc::channel(EVENT_BUFFER);
        let (timers_tx, timers) = mpsc::unbounded_channel();
        let slot = |kind: ChannelKind| Slot {
            channel: TransportChannel::new(kind, config.ws_url(kind), events_tx.clone()),
            policy: ReconnectPolicy::new(config.reconnect_max_attempts, config.reconnect_base_delay()),
            timer: None,
            timer_seq: 0,
        };
        Self {
            market_data: slot(ChannelKind::MarketData),
            trades: slot(ChannelKind::Trades),
            dispatcher: Dispatcher::new(store),
            status,
            heartbeat: Heartbeat::new(config.heartbeat_interval()),
            events,
            timers_tx,
            timers,
            commands,
        }
    }

    fn slot(&self, kind: ChannelKind) -> &Slot {
        match kind {
            ChannelKind::MarketData => &self.market_data,
            ChannelKind::Trades => &self.trades,
        }
    }

    fn slot_mut(&mut self, kind: ChannelKind) -> &mut Slot {
        match kind {
            ChannelKind::MarketData => &mut self.market_data,
            ChannelKind::Trades => &mut self.trades,
        }
    }

    fn publish(&self) {
        self.status.publish(self.market_data.status(), self.trades.status());
    }

    pub(crate) async fn run(mut self) {
        info!(
            market_data = %self.market_data.channel.url(),
            trades = %self.trades.channel.url(),
            heartbeat_ms = self.heartbeat.period().as_millis() as u64,
            "Stream supervisor started"
        );
        for kind in ChannelKind::ALL {
            self.open(kind);
        }
        self.publish();

        loop {
            tokio::select! {
                Some(event) = self.events.recv() => self.on_channel_event(event),
                Some((kind, seq)) = self.timers.recv() => self.on_reconnect_due(kind, seq),
                _ = self.heartbeat.tick() => self.on_heartbeat(),
                command = self.commands.recv() => match command {
                    Some(Command::Reset) => self.reset(),
                    Some(Command::Shutdown(ack)) => {
                        // later commands fail fast instead of queueing
                        self.commands.close();
                        self.teardown().await;
                        let _ = ack.send(());
                        break;
                    }
                    // every handle dropped
                    None => {
                        self.teardown().await;
                        break;
                    }
                },
            }
        }
        info!("Stream supervisor stopped");
    }

    fn open(&mut self, kind: ChannelKind) {
        let slot = self.slot_mut(kind);
        slot.policy.on_connecting();
        slot.channel.open();
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened { channel, generation } => {
                let slot = self.slot_mut(channel);
                if !slot.channel.on_opened(generation) {
                    trace!(%channel, generation, "Stale open event");
                    return;
                }
                slot.policy.on_open();
                info!(%channel, "Channel open");
                self.publish();
            }
            ChannelEvent::Message { channel, generation, text } => {
                if !self.slot(channel).channel.is_current(generation) {
                    trace!(%channel, generation, "Stale frame");
                    return;
                }
                metrics::counter!("marketlink_frames_total", "channel" => channel.as_str()).increment(1);
                if let Err(e) = self.dispatcher.dispatch(channel, &text) {
                    warn!(%channel, error = %e, "Dropping inbound frame");
                    metrics::counter!("marketlink_frames_dropped_total", "channel" => channel.as_str())
                        .increment(1);
                }
            }
            ChannelEvent::Error { channel, generation, error } => {
                if self.slot(channel).channel.is_current(generation) {
                    warn!(%channel, %error, "Channel error");
                }
            }
            ChannelEvent::Closed { channel, generation, reason } => {
                if !self.slot_mut(channel).channel.on_closed(generation) {
                    trace!(%channel, generation, "Stale close event");
                    return;
                }
                info!(%channel, %reason, "Channel closed");
                self.schedule_reconnect(channel);
                self.publish();
            }
        }
    }

    /// Exactly one decision per live close.
    fn schedule_reconnect(&mut self, kind: ChannelKind) {
        let timers_tx = self.timers_tx.clone();
        let slot = self.slot_mut(kind);
        match slot.policy.on_close() {
            ReconnectDecision::Schedule { attempt, delay } => {
                if slot.cancel_timer() {
                    debug!(channel = %kind, "Replacing pending reconnect timer");
                }
                slot.timer_seq += 1;
                let seq = slot.timer_seq;
                slot.timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = timers_tx.send((kind, seq));
                }));
                info!(channel = %kind, attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
                metrics::counter!("marketlink_reconnects_total", "channel" => kind.as_str()).increment(1);
            }
            ReconnectDecision::Exhausted => {
                slot.cancel_timer();
                error!(
                    channel = %kind,
                    max_attempts = slot.policy.max_attempts(),
                    "Reconnect attempts exhausted, waiting for reset"
                );
            }
        }
    }

    fn on_reconnect_due(&mut self, kind: ChannelKind, seq: u64) {
        let slot = self.slot_mut(kind);
        if slot.timer.is_none() || seq != slot.timer_seq {
            trace!(channel = %kind, seq, "Stale reconnect timer");
            return;
        }
        slot.timer = None;
        debug!(channel = %kind, attempt = slot.policy.attempts(), "Reconnecting");
        self.open(kind);
        self.publish();
    }

    fn on_heartbeat(&mut self) {
        for kind in ChannelKind::ALL {
            let slot = self.slot(kind);
            if slot.channel.state() == ChannelState::Open && slot.channel.send(ping_frame()) {
                trace!(channel = %kind, "Heartbeat sent");
            }
        }
    }

    /// External reset: forget failures and reconnect anything that is down.
    fn reset(&mut self) {
        info!("Resetting stream channels");
        for kind in ChannelKind::ALL {
            let slot = self.slot_mut(kind);
            slot.cancel_timer();
            slot.policy.reset();
            if slot.channel.state() == ChannelState::Closed {
                self.open(kind);
            }
        }
        self.publish();
    }

    async fn teardown(&mut self) {
        let mut pending = Vec::new();
        for kind in ChannelKind::ALL {
            let slot = self.slot_mut(kind);
            slot.cancel_timer();
            if let Some(task) = slot.channel.close() {
                pending.push((kind, task));
            }
        }
        self.publish();

        for (kind, mut task) in pending {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                debug!(channel = %kind, "Close handshake timed out, aborting connection task");
                task.abort();
            }
        }
    }
}
