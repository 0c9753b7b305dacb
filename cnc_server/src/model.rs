//! Information model interface.
//!
//! This module defines:
//! - `Variant` - Value type stored in model variables and passed to methods
//! - `InformationModel` trait - Interface of the process-information server
//! - `ModelVariable` trait / `VariableHandle` - Handle to a published variable
//! - `MethodHandler` - Async handler of a remote-invokable method
//! - `ModelError` enum - Error types for model operations
//!
//! The server core only needs "set named variable to value" and
//! "expose a remote-invokable operation"; everything else about the
//! information model lives behind this seam.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Error types for information model operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// A node with this path already exists
    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    /// No node at this path
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Node exists but is not of the requested kind
    #[error("Node {path} is not a {expected}")]
    WrongNodeKind {
        /// Node path
        path: String,
        /// Expected node kind
        expected: &'static str,
    },

    /// Method called with the wrong number of input arguments
    #[error("Method {method} expects {expected} arguments, got {got}")]
    ArgumentCount {
        /// Method path
        method: String,
        /// Declared input count
        expected: usize,
        /// Supplied input count
        got: usize,
    },

    /// No 16-bit namespace index left
    #[error("Namespace table full, cannot register {0}")]
    NamespaceTableFull(String),

    /// Variable written with a value of a different type
    #[error("Type mismatch on {node}: expected {expected:?}, got {got:?}")]
    TypeMismatch {
        /// Variable path
        node: String,
        /// Declared type
        expected: VariantType,
        /// Supplied type
        got: VariantType,
    },
}

/// Data type tag of a [`Variant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VariantType {
    /// Boolean
    Boolean,
    /// 64-bit float
    Double,
    /// UTF-8 string
    String,
    /// UTC timestamp
    DateTime,
}

/// Value stored in a model variable or passed to a method.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Variant {
    /// Boolean value
    Boolean(bool),
    /// 64-bit float value
    Double(f64),
    /// String value
    String(String),
    /// UTC timestamp value
    DateTime(DateTime<Utc>),
}

impl Variant {
    /// Type tag of this value.
    pub const fn type_of(&self) -> VariantType {
        match self {
            Self::Boolean(_) => VariantType::Boolean,
            Self::Double(_) => VariantType::Double,
            Self::String(_) => VariantType::String,
            Self::DateTime(_) => VariantType::DateTime,
        }
    }

    /// String payload, if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Timestamp payload, if this is a `DateTime`.
    pub const fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
            Self::DateTime(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for Variant {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<&str> for Variant {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Variant {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<DateTime<Utc>> for Variant {
    fn from(t: DateTime<Utc>) -> Self {
        Self::DateTime(t)
    }
}

/// Description of one method input or output argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    /// Display name
    pub name: String,
    /// Declared data type
    pub data_type: VariantType,
}

impl Argument {
    /// Create an argument description.
    pub fn new(name: &str, data_type: VariantType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
        }
    }
}

/// Identifier of a model node: namespace index plus browse path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    /// Namespace index
    pub namespace: u16,
    /// Slash-separated browse path below `Objects`
    pub path: String,
}

impl NodeId {
    /// The `Objects` root folder.
    pub fn objects() -> Self {
        Self {
            namespace: 0,
            path: String::new(),
        }
    }

    /// Path of a child node.
    pub fn child(&self, namespace: u16, name: &str) -> Self {
        let path = if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        };
        Self { namespace, path }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns={};s={}", self.namespace, self.path)
    }
}

/// Handle to a published variable.
pub trait ModelVariable: Send + Sync {
    /// Node of this variable.
    fn node_id(&self) -> &NodeId;

    /// Replace the current value.
    ///
    /// # Errors
    /// `ModelError::TypeMismatch` if `value` has a different type than the
    /// variable's initial value.
    fn write(&self, value: Variant) -> Result<(), ModelError>;

    /// Current value.
    fn read(&self) -> Variant;
}

/// Shared variable handle.
pub type VariableHandle = Arc<dyn ModelVariable>;

/// Boxed future returned by method handlers.
pub type MethodFuture = Pin<Box<dyn Future<Output = Vec<Variant>> + Send>>;

/// Handler invoked when a remote client calls a method.
pub type MethodHandler = Arc<dyn Fn(Vec<Variant>) -> MethodFuture + Send + Sync>;

/// Interface of the process-information server.
///
/// The CNC server uses this trait to build its node tree, publish
/// telemetry variables and expose remote methods.
pub trait InformationModel: Send + Sync {
    /// Register a namespace URI and return its index.
    ///
    /// Registering the same URI twice returns the same index.
    ///
    /// # Errors
    /// `ModelError::NamespaceTableFull` once every 16-bit index is taken.
    fn register_namespace(&self, uri: &str) -> Result<u16, ModelError>;

    /// Add an object (folder) node below `parent`.
    fn add_object(&self, parent: &NodeId, namespace: u16, name: &str)
    -> Result<NodeId, ModelError>;

    /// Add a variable node below `parent` holding `initial`.
    fn add_variable(
        &self,
        parent: &NodeId,
        namespace: u16,
        name: &str,
        initial: Variant,
    ) -> Result<VariableHandle, ModelError>;

    /// Add a remote-invokable method below `parent`.
    fn add_method(
        &self,
        parent: &NodeId,
        namespace: u16,
        name: &str,
        inputs: Vec<Argument>,
        outputs: Vec<Argument>,
        handler: MethodHandler,
    ) -> Result<NodeId, ModelError>;
}
