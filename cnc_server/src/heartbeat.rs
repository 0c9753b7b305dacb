//! Heartbeat loop.
//!
//! Stamps the server timestamp on a fixed period while no batch is
//! executing. Ticks that fall inside a batch are skipped, never queued.

use crate::clock::Clock;
use crate::run_state::RunGate;
use crate::shutdown::ShutdownSignal;
use crate::telemetry::TelemetryChannel;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

/// Heartbeat counters, returned when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatStats {
    /// Ticks that wrote the timestamp
    pub beats: u64,
    /// Ticks skipped because a batch was running
    pub skipped: u64,
}

/// Periodic server timestamp writer.
pub struct Heartbeat {
    telemetry: Arc<TelemetryChannel>,
    gate: Arc<RunGate>,
    clock: Arc<dyn Clock>,
    period: Duration,
}

impl Heartbeat {
    /// Create a heartbeat writing to `telemetry` every `period`.
    pub fn new(
        telemetry: Arc<TelemetryChannel>,
        gate: Arc<RunGate>,
        clock: Arc<dyn Clock>,
        period: Duration,
    ) -> Self {
        Self {
            telemetry,
            gate,
            clock,
            period,
        }
    }

    /// Execute one tick. Returns `true` if the timestamp was written.
    pub fn tick(&self) -> bool {
        self.gate
            .when_idle(|| self.telemetry.write_timestamp(self.clock.now()))
            .is_some()
    }

    /// Tick every period until `shutdown` fires.
    pub async fn run(self, mut shutdown: ShutdownSignal) -> HeartbeatStats {
        let mut stats = HeartbeatStats::default();
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Heartbeat started (period={}ms)", self.period.as_millis());

        loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                _ = ticker.tick() => {
                    if self.tick() {
                        stats.beats += 1;
                    } else {
                        stats.skipped += 1;
                        debug!("Heartbeat skipped: batch running");
                    }
                }
            }
        }

        info!(
            "Heartbeat stopped after {} beats ({} skipped)",
            stats.beats, stats.skipped
        );
        stats
    }
}
