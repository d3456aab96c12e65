//! Liveness probing for a silent connection.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::LinkState;
use crate::command::builder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// A record arrived since the previous tick
    Alive,
    /// Silent for one period; a keep-alive should be sent
    Probe,
    /// Still silent after the keep-alive
    Dead,
}

/// Record-arrival bookkeeping shared by the reader and the heartbeat.
#[derive(Debug, Default)]
pub struct Liveness {
    record_seen: AtomicBool,
    keepalive_sent: AtomicBool,
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for every inbound record.
    pub fn record_seen(&self) {
        self.keepalive_sent.store(false, Ordering::SeqCst);
        self.record_seen.store(true, Ordering::SeqCst);
    }

    pub fn tick(&self) -> Verdict {
        if self.record_seen.swap(false, Ordering::SeqCst) {
            Verdict::Alive
        } else if self.keepalive_sent.swap(true, Ordering::SeqCst) {
            Verdict::Dead
        } else {
            Verdict::Probe
        }
    }
}

pub(crate) async fn heartbeat_loop(
    period: Duration,
    liveness: Arc<Liveness>,
    link: LinkState,
    mut stop_rx: mpsc::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = ticker.tick() => {}
        }

        match liveness.tick() {
            Verdict::Alive => {}
            Verdict::Probe => {
                log::debug!("No traffic for {:?}, sending keep-alive", period);
                link.dispatcher.enqueue(builder::none());
            }
            Verdict::Dead => {
                log::error!("No traffic after keep-alive; connection presumed dead");
                link.connection_lost();
                break;
            }
        }
    }
    log::debug!("Heartbeat stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_then_dead_when_silent() {
        let liveness = Liveness::new();
        assert_eq!(liveness.tick(), Verdict::Probe);
        assert_eq!(liveness.tick(), Verdict::Dead);
    }

    #[test]
    fn test_record_after_probe_keeps_alive() {
        let liveness = Liveness::new();
        assert_eq!(liveness.tick(), Verdict::Probe);
        liveness.record_seen();
        assert_eq!(liveness.tick(), Verdict::Alive);
        assert_eq!(liveness.tick(), Verdict::Probe);
    }
}
