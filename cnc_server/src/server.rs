//! CNC server facade.
//!
//! Wires the telemetry channel, command interpreter, run-state gate and
//! heartbeat into an [`InformationModel`]:
//!
//! ```text
//! Objects
//! └── cnc interface
//!     ├── cnc axis list
//!     │   ├── x axis      (x position direct, x velocity, x acceleration)
//!     │   └── z axis      (z position direct, z velocity, z acceleration)
//!     ├── cnc spindle list
//!     │   └── spindle     (spindle speed direct)
//!     └── cnc channel list
//!         ├── feed rate channel   (feed rate direct)
//!         ├── timestamp channel   (server timestamp)
//!         ├── g function channel
//!         │   └── run_g_code(G-Code Command) -> Execution Result
//!         ├── reference_cnc_machine() -> Execution Result
//!         └── stop_cnc_machine() -> Execution Result
//! ```

use crate::clock::Clock;
use crate::heartbeat::{Heartbeat, HeartbeatStats};
use crate::interpreter::{CommandInterpreter, batch_text};
use crate::model::{
    Argument, InformationModel, MethodFuture, MethodHandler, ModelError, NodeId, Variant,
    VariantType,
};
use crate::observer::TelemetryObserver;
use crate::run_state::RunGate;
use crate::shutdown::Shutdown;
use crate::telemetry::{Axis, Slot, TelemetryChannel, SERVER_TIMESTAMP};
use cnc_common::config::{ConfigError, ServerConfig};
use cnc_common::consts::{
    ARG_EXECUTION_RESULT, ARG_G_CODE_COMMAND, LOG_REFERENCE, LOG_RUN_GCODE, LOG_STOP,
    METHOD_REFERENCE, METHOD_RUN_G_CODE, METHOD_STOP, NODE_AXIS_LIST, NODE_CHANNEL_LIST,
    NODE_CNC_INTERFACE, NODE_FEED_RATE_CHANNEL, NODE_G_FUNCTION_CHANNEL, NODE_SPINDLE,
    NODE_SPINDLE_LIST, NODE_TIMESTAMP_CHANNEL, NODE_X_AXIS, NODE_Z_AXIS,
};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const MSG_CALLED: &str = "Method called";
const MSG_SUCCESS: &str = "Method executed successfully.";

/// Server lifecycle errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Node tree could not be built
    #[error("Information model error: {0}")]
    Model(#[from] ModelError),

    /// `start` called on a running server
    #[error("Server is already running")]
    AlreadyRunning,

    /// `stop` called on a stopped server
    #[error("Server is not running")]
    NotRunning,

    /// Heartbeat task panicked or was cancelled
    #[error("Heartbeat task failed: {0}")]
    Heartbeat(#[from] tokio::task::JoinError),
}

/// Browse paths of the remote methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodPaths {
    /// `run_g_code`
    pub run_g_code: String,
    /// `reference_cnc_machine`
    pub reference: String,
    /// `stop_cnc_machine`
    pub stop: String,
}

/// Browse paths of the three remote methods.
pub fn method_paths() -> MethodPaths {
    let channels = format!("{NODE_CNC_INTERFACE}/{NODE_CHANNEL_LIST}");
    MethodPaths {
        run_g_code: format!("{channels}/{NODE_G_FUNCTION_CHANNEL}/{METHOD_RUN_G_CODE}"),
        reference: format!("{channels}/{METHOD_REFERENCE}"),
        stop: format!("{channels}/{METHOD_STOP}"),
    }
}

/// Remote-callable machine operations.
///
/// Cheap to clone; all clones share one interpreter, so a reference
/// request waits for a running batch and batches run one after another.
#[derive(Clone)]
pub struct CncOperations {
    interpreter: Arc<AsyncMutex<CommandInterpreter>>,
    telemetry: Arc<TelemetryChannel>,
}

impl CncOperations {
    /// Execute a G-code batch.
    ///
    /// Returns `false` without touching telemetry if `payload` is not
    /// text, or if a server stop ended the batch early.
    pub async fn run_g_code(&self, payload: Variant) -> bool {
        self.log(LOG_RUN_GCODE, &format!("Method called with argument: {payload}"));

        let text = match batch_text(&payload) {
            Ok(text) => text,
            Err(e) => {
                warn!("run_g_code rejected: {}", e);
                self.log(LOG_RUN_GCODE, &e.to_string());
                return false;
            }
        };

        let report = self.interpreter.lock().await.execute_text(text).await;
        if report.aborted {
            self.log(LOG_RUN_GCODE, "G-code execution aborted.");
            return false;
        }

        info!("G-code execution completed");
        self.log(LOG_RUN_GCODE, MSG_SUCCESS);
        true
    }

    /// Reference (home) the machine.
    pub async fn reference(&self) -> bool {
        self.log(LOG_REFERENCE, MSG_CALLED);
        info!("Starting CNC referencing");

        self.interpreter.lock().await.reference().await;

        info!("CNC referencing completed");
        self.log(LOG_REFERENCE, MSG_SUCCESS);
        true
    }

    /// Stop the machine. Only logged; motion is not affected.
    pub fn stop_machine(&self) -> bool {
        self.log(LOG_STOP, MSG_CALLED);
        info!("CNC stopped");
        self.log(LOG_STOP, MSG_SUCCESS);
        true
    }

    fn log(&self, method: &str, message: &str) {
        self.telemetry.log_method(method, message);
    }
}

/// CNC telemetry server.
pub struct CncServer {
    config: ServerConfig,
    model: Arc<dyn InformationModel>,
    clock: Arc<dyn Clock>,
    telemetry: Arc<TelemetryChannel>,
    gate: Arc<RunGate>,
    shutdown: Shutdown,
    operations: CncOperations,
    published: bool,
    heartbeat: Option<JoinHandle<HeartbeatStats>>,
}

impl CncServer {
    /// Create a stopped server publishing into `model`.
    ///
    /// # Errors
    /// `ServerError::Config` if `config` does not validate.
    pub fn new(
        config: ServerConfig,
        model: Arc<dyn InformationModel>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let telemetry = Arc::new(TelemetryChannel::new(clock.now()));
        let gate = Arc::new(RunGate::new());
        let shutdown = Shutdown::new();
        let interpreter = CommandInterpreter::new(
            Arc::clone(&telemetry),
            Arc::clone(&gate),
            Arc::clone(&clock),
            &config.timing,
        )
        .with_shutdown(shutdown.signal());

        let operations = CncOperations {
            interpreter: Arc::new(AsyncMutex::new(interpreter)),
            telemetry: Arc::clone(&telemetry),
        };

        Ok(Self {
            config,
            model,
            clock,
            telemetry,
            gate,
            shutdown,
            operations,
            published: false,
            heartbeat: None,
        })
    }

    /// Register an observer of telemetry writes and method logs.
    pub fn add_observer(&self, observer: Arc<dyn TelemetryObserver>) {
        self.telemetry.add_observer(observer);
    }

    /// Shared telemetry channel.
    pub fn telemetry(&self) -> &Arc<TelemetryChannel> {
        &self.telemetry
    }

    /// Machine operations, for in-process callers.
    pub fn operations(&self) -> CncOperations {
        self.operations.clone()
    }

    /// Active configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Whether the heartbeat is running.
    pub fn is_running(&self) -> bool {
        self.heartbeat.is_some()
    }

    /// Publish the node tree (first start only) and spawn the heartbeat.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// `AlreadyRunning`, or `Model` if the node tree cannot be built.
    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.heartbeat.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        if !self.published {
            self.publish()?;
            self.published = true;
        }

        self.shutdown.reset();
        let heartbeat = Heartbeat::new(
            Arc::clone(&self.telemetry),
            Arc::clone(&self.gate),
            Arc::clone(&self.clock),
            self.config.timing.heartbeat_period(),
        );
        self.heartbeat = Some(tokio::spawn(heartbeat.run(self.shutdown.signal())));

        info!(
            "CNC server '{}' started at {}",
            self.config.shared.service_name, self.config.server.endpoint
        );
        Ok(())
    }

    /// Signal shutdown and wait for the heartbeat to exit.
    ///
    /// A running batch ends at its next line.
    ///
    /// # Errors
    /// `NotRunning`, or `Heartbeat` if the task did not exit cleanly.
    pub async fn stop(&mut self) -> Result<HeartbeatStats, ServerError> {
        let handle = self.heartbeat.take().ok_or(ServerError::NotRunning)?;
        self.shutdown.trigger();
        let stats = handle.await?;
        info!("CNC server '{}' stopped", self.config.shared.service_name);
        Ok(stats)
    }

    fn publish(&self) -> Result<(), ServerError> {
        let model = &self.model;
        let ns = model.register_namespace(&self.config.server.namespace_uri)?;
        info!(
            "Publishing node tree in namespace {} ({})",
            ns, self.config.server.namespace_uri
        );

        let cnc = model.add_object(&NodeId::objects(), ns, NODE_CNC_INTERFACE)?;

        let axes = model.add_object(&cnc, ns, NODE_AXIS_LIST)?;
        for (axis, name) in [(Axis::X, NODE_X_AXIS), (Axis::Z, NODE_Z_AXIS)] {
            let node = model.add_object(&axes, ns, name)?;
            for slot in [
                Slot::position(axis),
                Slot::velocity(axis),
                Slot::acceleration(axis),
            ] {
                self.publish_slot(&node, ns, slot)?;
            }
        }

        let spindles = model.add_object(&cnc, ns, NODE_SPINDLE_LIST)?;
        let spindle = model.add_object(&spindles, ns, NODE_SPINDLE)?;
        self.publish_slot(&spindle, ns, Slot::SpindleSpeed)?;

        let channels = model.add_object(&cnc, ns, NODE_CHANNEL_LIST)?;
        let feed = model.add_object(&channels, ns, NODE_FEED_RATE_CHANNEL)?;
        self.publish_slot(&feed, ns, Slot::FeedRate)?;

        let timestamp = model.add_object(&channels, ns, NODE_TIMESTAMP_CHANNEL)?;
        let variable = model.add_variable(
            &timestamp,
            ns,
            &browse_name(SERVER_TIMESTAMP),
            Variant::DateTime(self.telemetry.timestamp()),
        )?;
        self.telemetry.bind_timestamp(variable);

        let g_functions = model.add_object(&channels, ns, NODE_G_FUNCTION_CHANNEL)?;
        let ops = self.operations.clone();
        model.add_method(
            &g_functions,
            ns,
            METHOD_RUN_G_CODE,
            vec![Argument::new(ARG_G_CODE_COMMAND, VariantType::String)],
            vec![execution_result()],
            handler(move |args| {
                let ops = ops.clone();
                async move {
                    match args.into_iter().next() {
                        Some(payload) => ops.run_g_code(payload).await,
                        None => false,
                    }
                }
            }),
        )?;

        let ops = self.operations.clone();
        model.add_method(
            &channels,
            ns,
            METHOD_REFERENCE,
            Vec::new(),
            vec![execution_result()],
            handler(move |_| {
                let ops = ops.clone();
                async move { ops.reference().await }
            }),
        )?;

        let ops = self.operations.clone();
        model.add_method(
            &channels,
            ns,
            METHOD_STOP,
            Vec::new(),
            vec![execution_result()],
            handler(move |_| {
                let ops = ops.clone();
                async move { ops.stop_machine() }
            }),
        )?;

        Ok(())
    }

    fn publish_slot(&self, parent: &NodeId, ns: u16, slot: Slot) -> Result<(), ServerError> {
        let variable = self.model.add_variable(
            parent,
            ns,
            &browse_name(slot.name()),
            Variant::Double(self.telemetry.get(slot)),
        )?;
        self.telemetry.bind(slot, variable);
        Ok(())
    }
}

impl Drop for CncServer {
    fn drop(&mut self) {
        if self.heartbeat.is_some() {
            warn!("CNC server dropped while running, signalling heartbeat");
            self.shutdown.trigger();
        }
    }
}

/// Browse name of a published variable (`x_position_direct` -> `x position direct`).
fn browse_name(variable: &str) -> String {
    variable.replace('_', " ")
}

fn execution_result() -> Argument {
    Argument::new(ARG_EXECUTION_RESULT, VariantType::Boolean)
}

/// Wrap an async operation returning `bool` as a method handler.
fn handler<F, Fut>(f: F) -> MethodHandler
where
    F: Fn(Vec<Variant>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    Arc::new(move |args: Vec<Variant>| -> MethodFuture {
        let done = f(args);
        Box::pin(async move { vec![Variant::Boolean(done.await)] })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::AddressSpace;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use cnc_common::config::TimingConfig;

    fn quiet_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.timing = TimingConfig::immediate();
        config.timing.heartbeat_period_ms = 60_000;
        config
    }

    fn server(space: &Arc<AddressSpace>) -> CncServer {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        CncServer::new(quiet_config(), space.clone(), clock).unwrap()
    }

    #[test]
    fn method_paths_follow_node_tree() {
        let paths = method_paths();
        assert_eq!(
            paths.run_g_code,
            "cnc interface/cnc channel list/g function channel/run_g_code"
        );
        assert_eq!(
            paths.reference,
            "cnc interface/cnc channel list/reference_cnc_machine"
        );
        assert_eq!(paths.stop, "cnc interface/cnc channel list/stop_cnc_machine");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = quiet_config();
        config.server.endpoint = "http://localhost:4840".to_string();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let result = CncServer::new(config, Arc::new(AddressSpace::new()), clock);
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn start_publishes_node_tree() {
        let space = Arc::new(AddressSpace::new());
        let mut server = server(&space);
        server.start().unwrap();

        assert_eq!(
            space.browse("cnc interface/cnc axis list/x axis").unwrap(),
            vec!["x acceleration", "x position direct", "x velocity"]
        );
        assert_eq!(
            space
                .read("cnc interface/cnc spindle list/spindle/spindle speed direct")
                .unwrap(),
            Variant::Double(0.0)
        );
        assert_eq!(
            space
                .read("cnc interface/cnc channel list/timestamp channel/server timestamp")
                .unwrap()
                .type_of(),
            VariantType::DateTime
        );

        let (inputs, outputs) = space.method_signature(&method_paths().run_g_code).unwrap();
        assert_eq!(inputs, vec![Argument::new("G-Code Command", VariantType::String)]);
        assert_eq!(outputs, vec![Argument::new("Execution Result", VariantType::Boolean)]);

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn lifecycle_errors() {
        let space = Arc::new(AddressSpace::new());
        let mut server = server(&space);

        assert!(matches!(server.stop().await, Err(ServerError::NotRunning)));
        server.start().unwrap();
        assert!(matches!(server.start(), Err(ServerError::AlreadyRunning)));
        server.stop().await.unwrap();
        assert!(!server.is_running());

        // Restart reuses the published tree.
        server.start().unwrap();
        assert!(server.is_running());
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn writes_reach_published_variables() {
        let space = Arc::new(AddressSpace::new());
        let mut server = server(&space);
        server.start().unwrap();

        assert!(server.operations().run_g_code(Variant::from("S750\nF12")).await);
        assert_eq!(
            space
                .read("cnc interface/cnc channel list/feed rate channel/feed rate direct")
                .unwrap(),
            Variant::Double(12.0)
        );
        assert_eq!(server.telemetry().get(Slot::SpindleSpeed), 750.0);

        server.stop().await.unwrap();
    }
}
