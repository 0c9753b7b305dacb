//! System-wide constants for the CNC telemetry workspace.
//!
//! Single source of truth for default endpoints, timing and the browse
//! names of the published information model.

/// Default server endpoint.
pub const DEFAULT_ENDPOINT: &str = "opc.tcp://localhost:4840/cnc_concept_turn_155_one";

/// Default namespace URI registered by the server.
pub const DEFAULT_NAMESPACE_URI: &str = "cnc_concept_turn_155_one";

/// Default service name used for logging.
pub const DEFAULT_SERVICE_NAME: &str = "cnc_concept_turn_155_one";

/// Required scheme prefix for endpoints.
pub const ENDPOINT_SCHEME: &str = "opc.tcp://";

/// Heartbeat period in milliseconds.
pub const HEARTBEAT_PERIOD_MS: u64 = 500;

/// Pacing delay after every executed G-code line, in milliseconds.
pub const LINE_DELAY_MS: u64 = 500;

/// Settle delay after referencing, in milliseconds.
pub const SETTLE_DELAY_MS: u64 = 3000;

/// UI mirror refresh period in milliseconds.
pub const UI_REFRESH_MS: u64 = 500;

/// Substitute sample interval (seconds) when two samples share a timestamp.
pub const MIN_SAMPLE_DT_S: f64 = 0.001;

/// Lines kept per method in the UI mirror log.
pub const METHOD_LOG_CAPACITY: usize = 64;

// ─── Node browse names ──────────────────────────────────────────────

/// Root object of the CNC model.
pub const NODE_CNC_INTERFACE: &str = "cnc interface";
/// Container of all axes.
pub const NODE_AXIS_LIST: &str = "cnc axis list";
/// X axis object.
pub const NODE_X_AXIS: &str = "x axis";
/// Z axis object.
pub const NODE_Z_AXIS: &str = "z axis";
/// Container of all spindles.
pub const NODE_SPINDLE_LIST: &str = "cnc spindle list";
/// Main spindle object.
pub const NODE_SPINDLE: &str = "spindle";
/// Container of all channels and machine-level methods.
pub const NODE_CHANNEL_LIST: &str = "cnc channel list";
/// Feed rate channel object.
pub const NODE_FEED_RATE_CHANNEL: &str = "feed rate channel";
/// Timestamp channel object.
pub const NODE_TIMESTAMP_CHANNEL: &str = "timestamp channel";
/// G function channel object (hosts `run_g_code`).
pub const NODE_G_FUNCTION_CHANNEL: &str = "g function channel";

// ─── Remote methods ─────────────────────────────────────────────────

/// Method executing a G-code batch.
pub const METHOD_RUN_G_CODE: &str = "run_g_code";
/// Method referencing (homing) the machine.
pub const METHOD_REFERENCE: &str = "reference_cnc_machine";
/// Method stopping the machine.
pub const METHOD_STOP: &str = "stop_cnc_machine";

/// Input argument name of `run_g_code`.
pub const ARG_G_CODE_COMMAND: &str = "G-Code Command";
/// Output argument name shared by all methods.
pub const ARG_EXECUTION_RESULT: &str = "Execution Result";

// ─── UI log channels ────────────────────────────────────────────────

/// UI log channel for G-code execution.
pub const LOG_RUN_GCODE: &str = "run_gcode";
/// UI log channel for referencing.
pub const LOG_REFERENCE: &str = "reference_cnc";
/// UI log channel for stop.
pub const LOG_STOP: &str = "stop_cnc_machine";
