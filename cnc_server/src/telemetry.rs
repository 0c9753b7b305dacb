//! Telemetry channel.
//!
//! The externally observable machine state: position, velocity and
//! acceleration per axis, spindle speed, feed rate and the server
//! timestamp. Each write replaces one slot, is pushed to the bound model
//! variable, and is then announced to every registered observer.
//!
//! Writers are the command interpreter and the heartbeat loop; readers are
//! the information model and the UI mirror.

use crate::model::{VariableHandle, Variant};
use crate::observer::TelemetryObserver;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{trace, warn};

/// Published variable name of the server timestamp.
pub const SERVER_TIMESTAMP: &str = "server_timestamp";

/// All published variable names in publication order.
pub const PUBLISHED_VARIABLES: [&str; 9] = [
    "x_position_direct",
    "x_velocity",
    "x_acceleration",
    "z_position_direct",
    "z_velocity",
    "z_acceleration",
    "spindle_speed_direct",
    "feed_rate_direct",
    SERVER_TIMESTAMP,
];

/// Linear axis of the lathe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Cross slide
    X,
    /// Carriage
    Z,
}

/// Numeric telemetry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// X commanded position
    XPosition,
    /// X derived velocity
    XVelocity,
    /// X derived acceleration
    XAcceleration,
    /// Z commanded position
    ZPosition,
    /// Z derived velocity
    ZVelocity,
    /// Z derived acceleration
    ZAcceleration,
    /// Spindle speed
    SpindleSpeed,
    /// Feed rate
    FeedRate,
}

impl Slot {
    /// Number of numeric slots.
    pub const COUNT: usize = 8;

    /// All numeric slots in publication order.
    pub const ALL: [Slot; Self::COUNT] = [
        Slot::XPosition,
        Slot::XVelocity,
        Slot::XAcceleration,
        Slot::ZPosition,
        Slot::ZVelocity,
        Slot::ZAcceleration,
        Slot::SpindleSpeed,
        Slot::FeedRate,
    ];

    /// Published variable name.
    pub const fn name(self) -> &'static str {
        PUBLISHED_VARIABLES[self.index()]
    }

    /// Position slot of `axis`.
    pub const fn position(axis: Axis) -> Self {
        match axis {
            Axis::X => Slot::XPosition,
            Axis::Z => Slot::ZPosition,
        }
    }

    /// Velocity slot of `axis`.
    pub const fn velocity(axis: Axis) -> Self {
        match axis {
            Axis::X => Slot::XVelocity,
            Axis::Z => Slot::ZVelocity,
        }
    }

    /// Acceleration slot of `axis`.
    pub const fn acceleration(axis: Axis) -> Self {
        match axis {
            Axis::X => Slot::XAcceleration,
            Axis::Z => Slot::ZAcceleration,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Current value of every telemetry slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    /// X commanded position
    pub x_position: f64,
    /// X derived velocity
    pub x_velocity: f64,
    /// X derived acceleration
    pub x_acceleration: f64,
    /// Z commanded position
    pub z_position: f64,
    /// Z derived velocity
    pub z_velocity: f64,
    /// Z derived acceleration
    pub z_acceleration: f64,
    /// Spindle speed
    pub spindle_speed: f64,
    /// Feed rate
    pub feed_rate: f64,
    /// Last heartbeat or kinematics sample time
    pub server_timestamp: DateTime<Utc>,
}

impl TelemetrySnapshot {
    /// All numeric slots at 0.0, timestamp at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            x_position: 0.0,
            x_velocity: 0.0,
            x_acceleration: 0.0,
            z_position: 0.0,
            z_velocity: 0.0,
            z_acceleration: 0.0,
            spindle_speed: 0.0,
            feed_rate: 0.0,
            server_timestamp: now,
        }
    }

    /// Value of one numeric slot.
    pub const fn get(&self, slot: Slot) -> f64 {
        match slot {
            Slot::XPosition => self.x_position,
            Slot::XVelocity => self.x_velocity,
            Slot::XAcceleration => self.x_acceleration,
            Slot::ZPosition => self.z_position,
            Slot::ZVelocity => self.z_velocity,
            Slot::ZAcceleration => self.z_acceleration,
            Slot::SpindleSpeed => self.spindle_speed,
            Slot::FeedRate => self.feed_rate,
        }
    }

    fn set(&mut self, slot: Slot, value: f64) {
        let field = match slot {
            Slot::XPosition => &mut self.x_position,
            Slot::XVelocity => &mut self.x_velocity,
            Slot::XAcceleration => &mut self.x_acceleration,
            Slot::ZPosition => &mut self.z_position,
            Slot::ZVelocity => &mut self.z_velocity,
            Slot::ZAcceleration => &mut self.z_acceleration,
            Slot::SpindleSpeed => &mut self.spindle_speed,
            Slot::FeedRate => &mut self.feed_rate,
        };
        *field = value;
    }
}

/// Model variables the channel pushes to.
#[derive(Default)]
struct Bindings {
    slots: [Option<VariableHandle>; Slot::COUNT],
    timestamp: Option<VariableHandle>,
}

/// Shared telemetry channel.
pub struct TelemetryChannel {
    snapshot: RwLock<TelemetrySnapshot>,
    bindings: RwLock<Bindings>,
    observers: RwLock<Vec<Arc<dyn TelemetryObserver>>>,
    writes: AtomicU64,
}

impl TelemetryChannel {
    /// Create a channel with every slot at its default.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            snapshot: RwLock::new(TelemetrySnapshot::new(now)),
            bindings: RwLock::new(Bindings::default()),
            observers: RwLock::new(Vec::new()),
            writes: AtomicU64::new(0),
        }
    }

    /// Push future writes of `slot` to `variable`.
    pub fn bind(&self, slot: Slot, variable: VariableHandle) {
        self.bindings.write().slots[slot.index()] = Some(variable);
    }

    /// Push future timestamp writes to `variable`.
    pub fn bind_timestamp(&self, variable: VariableHandle) {
        self.bindings.write().timestamp = Some(variable);
    }

    /// Register an observer.
    pub fn add_observer(&self, observer: Arc<dyn TelemetryObserver>) {
        self.observers.write().push(observer);
    }

    /// Replace the value of `slot`.
    pub fn write(&self, slot: Slot, value: f64) {
        self.snapshot.write().set(slot, value);
        self.writes.fetch_add(1, Ordering::Relaxed);
        trace!("{} = {}", slot.name(), value);

        let binding = self.bindings.read().slots[slot.index()].clone();
        self.publish(binding, slot.name(), Variant::Double(value));
    }

    /// Replace the server timestamp.
    pub fn write_timestamp(&self, now: DateTime<Utc>) {
        self.snapshot.write().server_timestamp = now;
        self.writes.fetch_add(1, Ordering::Relaxed);
        trace!("{} = {}", SERVER_TIMESTAMP, now);

        let binding = self.bindings.read().timestamp.clone();
        self.publish(binding, SERVER_TIMESTAMP, Variant::DateTime(now));
    }

    /// Current value of `slot`.
    pub fn get(&self, slot: Slot) -> f64 {
        self.snapshot.read().get(slot)
    }

    /// Current server timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.snapshot.read().server_timestamp
    }

    /// Copy of every slot.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshot.read().clone()
    }

    /// Number of slot writes since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Forward a method log message to every observer.
    pub fn log_method(&self, method: &str, message: &str) {
        for observer in self.observers() {
            let delivered =
                catch_unwind(AssertUnwindSafe(|| observer.log_method(method, message)));
            if delivered.is_err() {
                warn!("Observer panicked while logging {}", method);
            }
        }
    }

    fn publish(&self, binding: Option<VariableHandle>, name: &str, value: Variant) {
        if let Some(variable) = binding {
            if let Err(e) = variable.write(value.clone()) {
                warn!("Failed to publish {}: {}", name, e);
            }
        }

        for observer in self.observers() {
            let delivered =
                catch_unwind(AssertUnwindSafe(|| observer.update_variable(name, &value)));
            if delivered.is_err() {
                warn!("Observer panicked while receiving {}", name);
            }
        }
    }

    fn observers(&self) -> Vec<Arc<dyn TelemetryObserver>> {
        self.observers.read().clone()
    }
}
