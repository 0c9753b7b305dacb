//! Motion state and kinematics derivation.
//!
//! `MotionState` is the rolling kinematic context of the interpreter: the
//! last commanded position per axis and the time of the last sample.
//! Velocity and acceleration are finite differences over wall-clock time.

use crate::telemetry::Axis;
use chrono::{DateTime, Utc};
use cnc_common::consts::MIN_SAMPLE_DT_S;

/// Absolute position of both axes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    /// X position
    pub x: f64,
    /// Z position
    pub z: f64,
}

impl Position {
    /// Machine origin.
    pub const ORIGIN: Self = Self { x: 0.0, z: 0.0 };

    /// Coordinate of one axis.
    pub const fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Z => self.z,
        }
    }

    fn set(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::X => self.x = value,
            Axis::Z => self.z = value,
        }
    }
}

/// Derived kinematics of one axis for one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisKinematics {
    /// New position
    pub position: f64,
    /// Velocity over the sample interval
    pub velocity: f64,
    /// Acceleration relative to the previously published velocity
    pub acceleration: f64,
}

impl AxisKinematics {
    /// Derive kinematics for a move from `previous_position` to `position`
    /// over `dt` seconds.
    ///
    /// `published_velocity` is the velocity currently published for the
    /// axis, not one recomputed from motion history.
    pub fn derive(previous_position: f64, position: f64, published_velocity: f64, dt: f64) -> Self {
        let velocity = (position - previous_position) / dt;
        let acceleration = (velocity - published_velocity) / dt;
        Self {
            position,
            velocity,
            acceleration,
        }
    }
}

/// Rolling kinematic context, owned by the command interpreter.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionState {
    position: Position,
    last_sample_time: DateTime<Utc>,
}

impl MotionState {
    /// State at the origin, sampled at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            position: Position::ORIGIN,
            last_sample_time: now,
        }
    }

    /// Last commanded position.
    pub const fn position(&self) -> Position {
        self.position
    }

    /// Time of the last kinematics update.
    pub const fn last_sample_time(&self) -> DateTime<Utc> {
        self.last_sample_time
    }

    /// Seconds elapsed since the last sample.
    ///
    /// Coincident (or earlier) timestamps yield [`MIN_SAMPLE_DT_S`] so the
    /// derivatives stay finite.
    pub fn sample_interval(&self, now: DateTime<Utc>) -> f64 {
        match (now - self.last_sample_time).to_std() {
            Ok(dt) if !dt.is_zero() => dt.as_secs_f64(),
            _ => MIN_SAMPLE_DT_S,
        }
    }

    /// Record a new commanded position for `axis`.
    pub fn set_axis(&mut self, axis: Axis, value: f64) {
        self.position.set(axis, value);
    }

    /// Close a sample at `now`. The sample time never moves backwards.
    pub fn commit_sample(&mut self, now: DateTime<Utc>) {
        if now > self.last_sample_time {
            self.last_sample_time = now;
        }
    }

    /// Reset the position to the origin. The sample time is kept.
    pub fn reference(&mut self) {
        self.position = Position::ORIGIN;
    }
}
