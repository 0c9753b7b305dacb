//! In-process information model.
//!
//! `AddressSpace` implements [`InformationModel`] with an in-memory node
//! tree. Remote clients (and tests) browse, read and call methods through
//! slash-separated browse paths below `Objects`.

use crate::model::{
    Argument, InformationModel, MethodHandler, ModelError, ModelVariable, NodeId,
    VariableHandle, Variant, VariantType,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Namespace 0, always registered.
const BASE_NAMESPACE: &str = "http://opcfoundation.org/UA/";

/// Variable stored in the address space.
struct MemoryVariable {
    node_id: NodeId,
    data_type: VariantType,
    value: RwLock<Variant>,
}

impl ModelVariable for MemoryVariable {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    fn write(&self, value: Variant) -> Result<(), ModelError> {
        if value.type_of() != self.data_type {
            return Err(ModelError::TypeMismatch {
                node: self.node_id.path.clone(),
                expected: self.data_type,
                got: value.type_of(),
            });
        }
        trace!("{} <- {}", self.node_id, value);
        *self.value.write() = value;
        Ok(())
    }

    fn read(&self) -> Variant {
        self.value.read().clone()
    }
}

/// Method stored in the address space.
struct MethodNode {
    inputs: Vec<Argument>,
    outputs: Vec<Argument>,
    handler: MethodHandler,
}

enum Node {
    Object,
    Variable(Arc<MemoryVariable>),
    Method(MethodNode),
}

impl Node {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Variable(_) => "variable",
            Self::Method(_) => "method",
        }
    }
}

/// In-memory address space.
pub struct AddressSpace {
    namespaces: RwLock<Vec<String>>,
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl AddressSpace {
    /// Create an address space holding only the `Objects` root.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(NodeId::objects().path, Node::Object);
        Self {
            namespaces: RwLock::new(vec![BASE_NAMESPACE.to_string()]),
            nodes: RwLock::new(nodes),
        }
    }

    /// Registered namespace URIs, indexed by namespace index.
    pub fn namespaces(&self) -> Vec<String> {
        self.namespaces.read().clone()
    }

    /// Read the value of the variable at `path`.
    pub fn read(&self, path: &str) -> Result<Variant, ModelError> {
        match self.nodes.read().get(path) {
            Some(Node::Variable(var)) => Ok(var.read()),
            Some(_) => Err(ModelError::WrongNodeKind {
                path: path.to_string(),
                expected: "variable",
            }),
            None => Err(ModelError::UnknownNode(path.to_string())),
        }
    }

    /// Names of the direct children of `path`.
    pub fn browse(&self, path: &str) -> Result<Vec<String>, ModelError> {
        let nodes = self.nodes.read();
        if !nodes.contains_key(path) {
            return Err(ModelError::UnknownNode(path.to_string()));
        }
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        Ok(nodes
            .keys()
            .filter(|key| !key.is_empty())
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }

    /// Declared input and output arguments of the method at `path`.
    pub fn method_signature(
        &self,
        path: &str,
    ) -> Result<(Vec<Argument>, Vec<Argument>), ModelError> {
        match self.nodes.read().get(path) {
            Some(Node::Method(m)) => Ok((m.inputs.clone(), m.outputs.clone())),
            Some(_) => Err(ModelError::WrongNodeKind {
                path: path.to_string(),
                expected: "method",
            }),
            None => Err(ModelError::UnknownNode(path.to_string())),
        }
    }

    /// Invoke the method at `path`.
    ///
    /// Only the argument count is checked here; argument types are left to
    /// the handler.
    ///
    /// # Errors
    /// `UnknownNode`, `WrongNodeKind` or `ArgumentCount`.
    pub async fn call(&self, path: &str, args: Vec<Variant>) -> Result<Vec<Variant>, ModelError> {
        let handler = {
            let nodes = self.nodes.read();
            let method = match nodes.get(path) {
                Some(Node::Method(m)) => m,
                Some(_) => {
                    return Err(ModelError::WrongNodeKind {
                        path: path.to_string(),
                        expected: "method",
                    });
                }
                None => return Err(ModelError::UnknownNode(path.to_string())),
            };
            if method.inputs.len() != args.len() {
                return Err(ModelError::ArgumentCount {
                    method: path.to_string(),
                    expected: method.inputs.len(),
                    got: args.len(),
                });
            }
            Arc::clone(&method.handler)
        };

        debug!("Calling method {} with {} argument(s)", path, args.len());
        Ok(handler(args).await)
    }

    fn insert(&self, parent: &NodeId, node_id: &NodeId, node: Node) -> Result<(), ModelError> {
        let mut nodes = self.nodes.write();
        match nodes.get(&parent.path) {
            Some(Node::Object) => {}
            Some(_) => {
                return Err(ModelError::WrongNodeKind {
                    path: parent.path.clone(),
                    expected: "object",
                });
            }
            None => return Err(ModelError::UnknownNode(parent.path.clone())),
        }
        if nodes.contains_key(&node_id.path) {
            return Err(ModelError::DuplicateNode(node_id.path.clone()));
        }
        debug!("Adding {} {}", node.kind(), node_id);
        nodes.insert(node_id.path.clone(), node);
        Ok(())
    }
}

/// Namespace indices are 16-bit on the wire.
fn namespace_index(idx: usize, uri: &str) -> Result<u16, ModelError> {
    u16::try_from(idx).map_err(|_| ModelError::NamespaceTableFull(uri.to_string()))
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl InformationModel for AddressSpace {
    fn register_namespace(&self, uri: &str) -> Result<u16, ModelError> {
        let mut namespaces = self.namespaces.write();
        if let Some(idx) = namespaces.iter().position(|ns| ns == uri) {
            return namespace_index(idx, uri);
        }
        let idx = namespace_index(namespaces.len(), uri)?;
        namespaces.push(uri.to_string());
        Ok(idx)
    }

    fn add_object(
        &self,
        parent: &NodeId,
        namespace: u16,
        name: &str,
    ) -> Result<NodeId, ModelError> {
        let node_id = parent.child(namespace, name);
        self.insert(parent, &node_id, Node::Object)?;
        Ok(node_id)
    }

    fn add_variable(
        &self,
        parent: &NodeId,
        namespace: u16,
        name: &str,
        initial: Variant,
    ) -> Result<VariableHandle, ModelError> {
        let node_id = parent.child(namespace, name);
        let var = Arc::new(MemoryVariable {
            node_id: node_id.clone(),
            data_type: initial.type_of(),
            value: RwLock::new(initial),
        });
        self.insert(parent, &node_id, Node::Variable(Arc::clone(&var)))?;
        Ok(var)
    }

    fn add_method(
        &self,
        parent: &NodeId,
        namespace: u16,
        name: &str,
        inputs: Vec<Argument>,
        outputs: Vec<Argument>,
        handler: MethodHandler,
    ) -> Result<NodeId, ModelError> {
        let node_id = parent.child(namespace, name);
        self.insert(
            parent,
            &node_id,
            Node::Method(MethodNode {
                inputs,
                outputs,
                handler,
            }),
        )?;
        Ok(node_id)
    }
}
