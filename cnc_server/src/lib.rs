//! # CNC Server Library
//!
//! Motion telemetry engine of the CNC turning concept: accepts G-code
//! batches over a process-information model, derives per-axis kinematics
//! from successive commanded positions and publishes them as telemetry.
//!
//! # Module Structure
//!
//! - [`server`] - CncServer facade, node tree, remote methods
//! - [`interpreter`] - Line-by-line G-code execution
//! - [`gcode`] - Directive parser (G00/G01 moves, S, F)
//! - [`motion`] - Motion state and kinematics derivation
//! - [`telemetry`] - Telemetry channel and snapshot
//! - [`run_state`] - Batch run-state gate
//! - [`heartbeat`] - Periodic server timestamp writer
//! - [`model`] - Information model interface and value types
//! - [`address_space`] - In-memory information model
//! - [`observer`] - Telemetry observers, UI mirror
//! - [`clock`] - System and manual clocks
//! - [`shutdown`] - Server-wide stop signal
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          cnc_server                              │
//! │  ┌───────────────┐  call  ┌───────────────┐  ┌────────────────┐  │
//! │  │ AddressSpace  │───────►│ CncOperations │─►│ Command        │  │
//! │  │ (Information  │        └───────────────┘  │ Interpreter    │  │
//! │  │  Model)       │                           └───────┬────────┘  │
//! │  └───────▲───────┘                                   │ BatchGuard│
//! │          │ push      ┌───────────────┐       ┌───────▼────────┐  │
//! │          └───────────┤  Telemetry    │◄──────┤    RunGate     │  │
//! │  ┌───────────────┐   │  Channel      │       └───────▲────────┘  │
//! │  │  UiMirror     │◄──┤               │◄──────┐       │ when_idle │
//! │  └───────────────┘   └───────────────┘       └── Heartbeat       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod address_space;
pub mod clock;
pub mod gcode;
pub mod heartbeat;
pub mod interpreter;
pub mod model;
pub mod motion;
pub mod observer;
pub mod run_state;
pub mod server;
pub mod shutdown;
pub mod telemetry;

// Re-export key types for convenience
pub use crate::address_space::AddressSpace;
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::interpreter::{BatchError, BatchReport, CommandInterpreter};
pub use crate::model::{InformationModel, ModelError, Variant};
pub use crate::observer::{TelemetryObserver, UiMirror};
pub use crate::server::{CncOperations, CncServer, ServerError, method_paths};
pub use crate::telemetry::{Slot, TelemetryChannel, TelemetrySnapshot};
