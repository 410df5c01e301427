// Keep-alive: one timer shared by both channels. Fire-and-forget, no pong
// tracking; dead connections surface as transport closes instead.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(30_000);

pub struct Heartbeat {
    interval: Interval,
    period: Duration,
}

impl Heartbeat {
    /// First tick fires one full period after construction.
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

pub fn ping_frame() -> String {
    serde_json::json!({ "type": "ping" }).to_string()
}
