//! G-code command interpreter.
//!
//! Executes a batch of program text line by line:
//!
//! 1. Blank, `(comment)` and `%` lines are skipped without delay.
//! 2. A `G00`/`G01` move with `X` and/or `Z` derives velocity and
//!    acceleration from the positional delta over wall-clock time and
//!    publishes position, velocity and acceleration per axis, then the
//!    shared server timestamp.
//! 3. `S` and `F` tokens publish spindle speed and feed rate.
//! 4. Every executed line is followed by a fixed pacing delay.
//!
//! The interpreter is the only owner of [`MotionState`]. While a batch runs
//! the run-state gate is held in `BatchRunning`, so the heartbeat cannot
//! write the server timestamp.

use crate::clock::Clock;
use crate::gcode::{Directive, GCode, ParsedLine, parse_line};
use crate::model::Variant;
use crate::motion::{AxisKinematics, MotionState};
use crate::run_state::RunGate;
use crate::shutdown::ShutdownSignal;
use crate::telemetry::{Axis, Slot, TelemetryChannel};
use cnc_common::config::TimingConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Batch rejection reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BatchError {
    /// The payload is not text; nothing was executed.
    #[error("G-code must be a string.")]
    NotText,
}

/// Extract the program text of a batch payload.
///
/// # Errors
/// `BatchError::NotText` for any non-string payload.
pub fn batch_text(payload: &Variant) -> Result<&str, BatchError> {
    payload.as_str().ok_or(BatchError::NotText)
}

/// Summary of one executed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Lines executed (and paced)
    pub executed: usize,
    /// Blank, comment and delimiter lines
    pub skipped: usize,
    /// Executed lines without any recognized directive
    pub unrecognized: usize,
    /// Lines that moved at least one axis
    pub moves: usize,
    /// Whether a server stop ended the batch early
    pub aborted: bool,
}

/// Line-by-line G-code executor.
pub struct CommandInterpreter {
    motion: MotionState,
    telemetry: Arc<TelemetryChannel>,
    gate: Arc<RunGate>,
    clock: Arc<dyn Clock>,
    line_delay: Duration,
    settle_delay: Duration,
    shutdown: Option<ShutdownSignal>,
}

impl CommandInterpreter {
    /// Create an interpreter at the origin, sampled now.
    pub fn new(
        telemetry: Arc<TelemetryChannel>,
        gate: Arc<RunGate>,
        clock: Arc<dyn Clock>,
        timing: &TimingConfig,
    ) -> Self {
        let motion = MotionState::new(clock.now());
        Self {
            motion,
            telemetry,
            gate,
            clock,
            line_delay: timing.line_delay(),
            settle_delay: timing.settle_delay(),
            shutdown: None,
        }
    }

    /// End batches early once `signal` fires.
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// Current motion state.
    pub const fn motion(&self) -> &MotionState {
        &self.motion
    }

    /// Execute a batch payload.
    ///
    /// Lines that do not parse only lose their unrecognized parts; the
    /// batch itself never fails once accepted.
    ///
    /// # Errors
    /// `BatchError::NotText` if `payload` is not a string. Nothing is
    /// executed in that case.
    pub async fn execute_batch(&mut self, payload: &Variant) -> Result<BatchReport, BatchError> {
        let text = batch_text(payload)?;
        Ok(self.execute_text(text).await)
    }

    /// Execute program text.
    pub async fn execute_text(&mut self, text: &str) -> BatchReport {
        let _batch = self.gate.begin().await;
        let mut report = BatchReport::default();

        for (idx, raw) in text.lines().enumerate() {
            let directives = match parse_line(raw) {
                ParsedLine::Skipped => {
                    report.skipped += 1;
                    continue;
                }
                ParsedLine::Executable(directives) => directives,
            };

            if self.stop_requested() {
                warn!("Batch aborted at line {}: server stopping", idx + 1);
                report.aborted = true;
                break;
            }

            debug!("Line {}: {:?}", idx + 1, directives);
            if directives.is_empty() {
                report.unrecognized += 1;
            }
            if self.apply(&directives) {
                report.moves += 1;
            }
            report.executed += 1;

            if !self.line_delay.is_zero() {
                tokio::time::sleep(self.line_delay).await;
            }
        }

        info!(
            "Batch finished: {} executed, {} skipped, {} unrecognized, {} moves",
            report.executed, report.skipped, report.unrecognized, report.moves
        );
        report
    }

    /// Apply the directives of one line without pacing.
    ///
    /// Returns `true` if an axis moved.
    pub fn apply(&mut self, directives: &[Directive]) -> bool {
        let mut moved = false;
        for directive in directives {
            match *directive {
                Directive::Move { g_code, x, z } => moved |= self.apply_move(g_code, x, z),
                Directive::SpindleSpeed(speed) => self.telemetry.write(Slot::SpindleSpeed, speed),
                Directive::FeedRate(feed) => self.telemetry.write(Slot::FeedRate, feed),
            }
        }
        moved
    }

    /// Reference (home) both axes.
    ///
    /// Publishes position 0.0 for X and Z, resets the motion state to the
    /// origin, then waits the settle delay. Velocity, acceleration and the
    /// sample time are left as they are.
    pub async fn reference(&mut self) {
        self.telemetry.write(Slot::XPosition, 0.0);
        self.telemetry.write(Slot::ZPosition, 0.0);
        self.motion.reference();
        info!("Axes referenced, settling for {}ms", self.settle_delay.as_millis());

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
    }

    fn apply_move(&mut self, g_code: GCode, x: Option<f64>, z: Option<f64>) -> bool {
        if x.is_none() && z.is_none() {
            return false;
        }

        let now = self.clock.now();
        let dt = self.motion.sample_interval(now);

        for (axis, target) in [(Axis::X, x), (Axis::Z, z)] {
            let Some(target) = target else { continue };
            let k = AxisKinematics::derive(
                self.motion.position().get(axis),
                target,
                self.telemetry.get(Slot::velocity(axis)),
                dt,
            );
            self.telemetry.write(Slot::position(axis), k.position);
            self.telemetry.write(Slot::velocity(axis), k.velocity);
            self.telemetry.write(Slot::acceleration(axis), k.acceleration);
            self.motion.set_axis(axis, target);
            debug!(
                "{:?} {:?}: pos={:.3} vel={:.3} acc={:.3} dt={:.3}s",
                g_code, axis, k.position, k.velocity, k.acceleration, dt
            );
        }

        self.telemetry.write_timestamp(now);
        self.motion.commit_sample(now);
        true
    }

    fn stop_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(ShutdownSignal::is_triggered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::motion::Position;
    use crate::run_state::RunState;
    use crate::shutdown::Shutdown;
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    /// Interpreter whose clock returns t0 on construction and moves one
    /// second per later reading.
    fn stepping_interpreter() -> (CommandInterpreter, Arc<TelemetryChannel>) {
        let clock = Arc::new(ManualClock::stepping(t0(), Duration::from_secs(1)));
        let telemetry = Arc::new(TelemetryChannel::new(t0()));
        let interpreter = CommandInterpreter::new(
            Arc::clone(&telemetry),
            Arc::new(RunGate::new()),
            clock,
            &TimingConfig::immediate(),
        );
        (interpreter, telemetry)
    }

    #[tokio::test]
    async fn constant_velocity_scenario() {
        let (mut interp, telemetry) = stepping_interpreter();

        interp.execute_text("G01 X5").await;
        assert_eq!(telemetry.get(Slot::XVelocity), 5.0);
        assert_eq!(telemetry.get(Slot::XAcceleration), 5.0);

        interp.execute_text("G01 X10").await;
        assert_eq!(telemetry.get(Slot::XPosition), 10.0);
        assert_eq!(telemetry.get(Slot::XVelocity), 5.0);
        assert_eq!(telemetry.get(Slot::XAcceleration), 0.0);
        assert_eq!(interp.motion().position().x, 10.0);
    }

    #[tokio::test]
    async fn shared_timestamp_once_per_line() {
        let (mut interp, telemetry) = stepping_interpreter();

        let report = interp.execute_text("G00 X2 Z-4").await;
        assert_eq!(report.moves, 1);
        // One clock reading for both axes: dt = 1s.
        assert_eq!(telemetry.get(Slot::XVelocity), 2.0);
        assert_eq!(telemetry.get(Slot::ZVelocity), -4.0);
        assert_eq!(telemetry.timestamp(), t0() + chrono::Duration::seconds(1));
        assert_eq!(
            interp.motion().last_sample_time(),
            t0() + chrono::Duration::seconds(1)
        );
        // 3 slots per axis + timestamp.
        assert_eq!(telemetry.write_count(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn comment_only_batch_is_free() {
        let clock = Arc::new(ManualClock::new(t0()));
        let telemetry = Arc::new(TelemetryChannel::new(t0()));
        let mut timing = TimingConfig::immediate();
        timing.line_delay_ms = 500;
        let mut interp =
            CommandInterpreter::new(Arc::clone(&telemetry), Arc::new(RunGate::new()), clock, &timing);

        let started = tokio::time::Instant::now();
        let report = interp.execute_text("%\n(setup)\n\n   \n(end)\n%").await;

        assert_eq!(report.skipped, 6);
        assert_eq!(report.executed, 0);
        assert_eq!(telemetry.write_count(), 0);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn executed_lines_are_paced() {
        let clock = Arc::new(ManualClock::new(t0()));
        let telemetry = Arc::new(TelemetryChannel::new(t0()));
        let mut timing = TimingConfig::immediate();
        timing.line_delay_ms = 500;
        let mut interp = CommandInterpreter::new(telemetry, Arc::new(RunGate::new()), clock, &timing);

        let started = tokio::time::Instant::now();
        interp.execute_text("G01 X1\n(skip)\nM30\nS100").await;
        // Three executed lines; the comment is not paced.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1500));
        assert!(elapsed < Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn one_line_carries_move_spindle_and_feed() {
        let (mut interp, telemetry) = stepping_interpreter();
        interp.execute_text("G01 X10 S500 F20").await;
        assert_eq!(telemetry.get(Slot::XPosition), 10.0);
        assert_eq!(telemetry.get(Slot::SpindleSpeed), 500.0);
        assert_eq!(telemetry.get(Slot::FeedRate), 20.0);
    }

    #[tokio::test]
    async fn move_without_axes_changes_nothing() {
        let (mut interp, telemetry) = stepping_interpreter();
        let report = interp.execute_text("G01").await;
        assert_eq!(report.executed, 1);
        assert_eq!(report.moves, 0);
        assert_eq!(telemetry.write_count(), 0);
        assert_eq!(interp.motion().last_sample_time(), t0());
    }

    #[tokio::test]
    async fn overflowing_numbers_write_nothing() {
        let (mut interp, telemetry) = stepping_interpreter();
        let huge = "9".repeat(400);
        let report = interp
            .execute_text(&format!("G01 X{huge} S{huge} F{huge}"))
            .await;
        assert_eq!(report.executed, 1);
        assert_eq!(report.moves, 0);
        assert_eq!(telemetry.write_count(), 0);
        assert_eq!(telemetry.get(Slot::XPosition), 0.0);
        assert_eq!(telemetry.get(Slot::SpindleSpeed), 0.0);
    }

    #[tokio::test]
    async fn non_text_payload_is_rejected_before_execution() {
        let (mut interp, telemetry) = stepping_interpreter();
        let result = interp.execute_batch(&Variant::Double(42.0)).await;
        assert_eq!(result, Err(BatchError::NotText));
        assert_eq!(telemetry.write_count(), 0);
    }

    #[tokio::test]
    async fn spindle_and_feed_without_move() {
        let (mut interp, telemetry) = stepping_interpreter();
        let report = interp
            .execute_batch(&Variant::from("M03 S800\nF0.15\nM30"))
            .await
            .unwrap();
        assert_eq!(report.executed, 3);
        assert_eq!(report.unrecognized, 1);
        assert_eq!(telemetry.get(Slot::SpindleSpeed), 800.0);
        assert_eq!(telemetry.get(Slot::FeedRate), 0.15);
        assert_eq!(telemetry.timestamp(), t0());
    }

    #[tokio::test]
    async fn gate_is_idle_after_batch() {
        let (mut interp, _telemetry) = stepping_interpreter();
        let gate = Arc::clone(&interp.gate);
        interp.execute_text("G01 X1\nG01 X2").await;
        assert_eq!(gate.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn shutdown_aborts_remaining_lines() {
        let (interp, telemetry) = stepping_interpreter();
        let shutdown = Shutdown::new();
        let mut interp = interp.with_shutdown(shutdown.signal());
        shutdown.trigger();

        let report = interp.execute_text("G01 X1\nG01 X2").await;
        assert!(report.aborted);
        assert_eq!(report.executed, 0);
        assert_eq!(telemetry.write_count(), 0);
    }

    #[tokio::test]
    async fn reference_zeroes_positions_only() {
        let (mut interp, telemetry) = stepping_interpreter();
        interp.execute_text("G01 X4 Z6").await;
        let sampled = interp.motion().last_sample_time();

        interp.reference().await;
        assert_eq!(telemetry.get(Slot::XPosition), 0.0);
        assert_eq!(telemetry.get(Slot::ZPosition), 0.0);
        assert_eq!(telemetry.get(Slot::XVelocity), 4.0);
        assert_eq!(interp.motion().position(), Position::ORIGIN);
        assert_eq!(interp.motion().last_sample_time(), sampled);
    }
}
