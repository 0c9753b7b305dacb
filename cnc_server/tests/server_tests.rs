//! End-to-end server tests.
//!
//! Drives the server through the remote methods of the in-memory address
//! space, the way a process-information client would: batch execution,
//! referencing, stop, non-text rejection, and heartbeat exclusivity.

use chrono::{DateTime, TimeZone, Utc};
use cnc_common::config::{ServerConfig, TimingConfig};
use cnc_server::observer::TelemetryObserver;
use cnc_server::telemetry::SERVER_TIMESTAMP;
use cnc_server::{
    AddressSpace, CncServer, ManualClock, ModelError, Slot, UiMirror, Variant, method_paths,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const X_POSITION: &str = "cnc interface/cnc axis list/x axis/x position direct";
const Z_POSITION: &str = "cnc interface/cnc axis list/z axis/z position direct";
const TIMESTAMP: &str = "cnc interface/cnc channel list/timestamp channel/server timestamp";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Config with no pacing and a heartbeat that never fires during a test.
fn quiet_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.timing = TimingConfig::immediate();
    config.timing.heartbeat_period_ms = 3_600_000;
    config
}

struct Harness {
    space: Arc<AddressSpace>,
    mirror: Arc<UiMirror>,
    server: CncServer,
}

fn harness(config: ServerConfig) -> Harness {
    let space = Arc::new(AddressSpace::new());
    let mirror = Arc::new(UiMirror::new());
    let server = CncServer::new(config, space.clone(), Arc::new(ManualClock::new(t0()))).unwrap();
    server.add_observer(mirror.clone());
    Harness {
        space,
        mirror,
        server,
    }
}

/// Counts server timestamp writes.
#[derive(Default)]
struct TimestampCounter(AtomicU64);

impl TelemetryObserver for TimestampCounter {
    fn update_variable(&self, name: &str, _value: &Variant) {
        if name == SERVER_TIMESTAMP {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn run_g_code_publishes_through_address_space() {
    let mut h = harness(quiet_config());
    h.server.start().unwrap();

    let program = "%\n(facing)\nG00 X20 Z2\nG01 X10 S1200 F0.2\nM30\n%";
    let result = h
        .space
        .call(&method_paths().run_g_code, vec![Variant::from(program)])
        .await
        .unwrap();
    assert_eq!(result, vec![Variant::Boolean(true)]);

    assert_eq!(h.space.read(X_POSITION).unwrap(), Variant::Double(10.0));
    assert_eq!(h.space.read(Z_POSITION).unwrap(), Variant::Double(2.0));
    assert_eq!(h.mirror.value("spindle_speed_direct"), Some(Variant::Double(1200.0)));
    assert_eq!(h.mirror.value("feed_rate_direct"), Some(Variant::Double(0.2)));
    assert_eq!(h.space.read(TIMESTAMP).unwrap().as_datetime(), Some(t0()));

    let log = h.mirror.method_log("run_gcode");
    assert_eq!(log.first().unwrap(), &format!("Method called with argument: {program}"));
    assert_eq!(log.last().unwrap(), "Method executed successfully.");

    h.server.stop().await.unwrap();
}

#[tokio::test]
async fn non_text_batch_returns_false_without_writes() {
    let mut h = harness(quiet_config());
    h.server.start().unwrap();
    let before = h.server.telemetry().write_count();

    let result = h
        .space
        .call(&method_paths().run_g_code, vec![Variant::Double(42.0)])
        .await
        .unwrap();
    assert_eq!(result, vec![Variant::Boolean(false)]);
    assert_eq!(h.server.telemetry().write_count(), before);
    assert_eq!(
        h.mirror.method_log("run_gcode").last().unwrap(),
        "G-code must be a string."
    );

    h.server.stop().await.unwrap();
}

#[tokio::test]
async fn wrong_argument_count_is_a_model_error() {
    let mut h = harness(quiet_config());
    h.server.start().unwrap();

    let result = h.space.call(&method_paths().run_g_code, Vec::new()).await;
    assert!(matches!(result, Err(ModelError::ArgumentCount { expected: 1, got: 0, .. })));

    h.server.stop().await.unwrap();
}

#[tokio::test]
async fn reference_homes_positions() {
    let mut h = harness(quiet_config());
    h.server.start().unwrap();
    let paths = method_paths();

    h.space
        .call(&paths.run_g_code, vec![Variant::from("G01 X8 Z-3")])
        .await
        .unwrap();
    let velocity = h.server.telemetry().get(Slot::XVelocity);

    let result = h.space.call(&paths.reference, Vec::new()).await.unwrap();
    assert_eq!(result, vec![Variant::Boolean(true)]);
    assert_eq!(h.space.read(X_POSITION).unwrap(), Variant::Double(0.0));
    assert_eq!(h.space.read(Z_POSITION).unwrap(), Variant::Double(0.0));
    assert_eq!(h.server.telemetry().get(Slot::XVelocity), velocity);
    assert_eq!(
        h.mirror.method_log("reference_cnc"),
        vec!["Method called", "Method executed successfully."]
    );

    h.server.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn reference_waits_for_settle_delay() {
    let mut config = quiet_config();
    config.timing.settle_delay_ms = 3000;
    let mut h = harness(config);
    h.server.start().unwrap();

    let started = tokio::time::Instant::now();
    h.server.operations().reference().await;
    assert!(started.elapsed() >= Duration::from_millis(3000));

    h.server.stop().await.unwrap();
}

#[tokio::test]
async fn stop_machine_is_idempotent_and_motionless() {
    let mut h = harness(quiet_config());
    h.server.start().unwrap();
    let paths = method_paths();

    h.space
        .call(&paths.run_g_code, vec![Variant::from("G01 X4")])
        .await
        .unwrap();
    let before = h.server.telemetry().snapshot();
    let writes = h.server.telemetry().write_count();

    for _ in 0..2 {
        let result = h.space.call(&paths.stop, Vec::new()).await.unwrap();
        assert_eq!(result, vec![Variant::Boolean(true)]);
    }

    assert_eq!(h.server.telemetry().snapshot(), before);
    assert_eq!(h.server.telemetry().write_count(), writes);
    assert_eq!(h.mirror.method_log("stop_cnc_machine").len(), 4);

    h.server.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn heartbeat_pauses_while_batch_runs() {
    let mut config = quiet_config();
    config.timing.heartbeat_period_ms = 500;
    config.timing.line_delay_ms = 2000;
    let mut h = harness(config);
    let counter = Arc::new(TimestampCounter::default());
    h.server.add_observer(counter.clone());
    h.server.start().unwrap();

    // First tick fires immediately.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let ops = h.server.operations();
    let batch = tokio::spawn(async move { ops.run_g_code(Variant::from("G01 X1")).await });
    assert!(batch.await.unwrap());

    let stats = h.server.stop().await.unwrap();
    assert!(stats.beats >= 1);
    assert!(stats.skipped >= 3);
    // One move line plus every heartbeat that actually wrote.
    assert_eq!(counter.0.load(Ordering::SeqCst), stats.beats + 1);
}

#[tokio::test(start_paused = true)]
async fn stop_aborts_running_batch() {
    let mut config = quiet_config();
    config.timing.line_delay_ms = 500;
    let mut h = harness(config);
    h.server.start().unwrap();

    let ops = h.server.operations();
    let batch = tokio::spawn(async move {
        ops.run_g_code(Variant::from("G01 X1\nG01 X2\nG01 X3\nG01 X4"))
            .await
    });

    // Inside the pacing delay of the second line.
    tokio::time::sleep(Duration::from_millis(700)).await;
    h.server.stop().await.unwrap();

    assert!(!batch.await.unwrap());
    assert_eq!(h.server.telemetry().get(Slot::XPosition), 2.0);
    assert_eq!(
        h.mirror.method_log("run_gcode").last().unwrap(),
        "G-code execution aborted."
    );
}
