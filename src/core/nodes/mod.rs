//! Document tree produced by the parser.
//!
//! Nodes live in an arena owned by [`Document`] and refer to each other by
//! [`NodeId`]. A child keeps the id of the container it was attached to so
//! that references can walk the tree upwards; the arena alone owns nodes.

use log::trace;

use crate::errors::{Diagnostic, NaclError, Result};
use crate::types::Value;

pub mod array;
pub mod macro_call;
pub mod object;
pub mod operation;
pub mod reference;

pub use array::ArrayNode;
pub use macro_call::MacroNode;
pub use object::ObjectNode;
pub use operation::{OperationNode, Operator};
pub use reference::ReferenceNode;

pub type NodeId = usize;

/// Entry of a container: either an already native value or a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Native(Value),
    Node(NodeId),
}

impl From<Value> for Item {
    fn from(value: Value) -> Self {
        Item::Native(value)
    }
}

/// Memoized outcome of a lazy node.
#[derive(Debug, Clone)]
pub enum Resolution {
    Unresolved,
    /// Set while the node is being resolved; reaching it again is a cycle.
    Resolving,
    Resolved(Value),
    Failed(NaclError),
}

#[derive(Debug)]
pub enum NodeKind {
    Object(ObjectNode),
    Array(ArrayNode),
    Operation(OperationNode),
    Macro(MacroNode),
    Reference(ReferenceNode),
}

#[derive(Debug)]
pub struct Node {
    parent: Option<NodeId>,
    kind: NodeKind,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }
}

#[derive(Debug, Default)]
pub struct Document {
    nodes: Vec<Node>,
    root: Option<Item>,
    warnings: Vec<Diagnostic>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alloc(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node { parent: None, kind });
        self.nodes.len() - 1
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// Topmost ancestor of `id`.
    pub fn root_of(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            current = parent;
        }
        current
    }

    pub fn root(&self) -> Option<&Item> {
        self.root.as_ref()
    }

    pub(crate) fn set_root(&mut self, root: Item) {
        self.root = Some(root);
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub(crate) fn warn(&mut self, diagnostic: Diagnostic) {
        self.warnings.push(diagnostic);
    }

    /// Native value of the whole document. An empty document is an empty map.
    pub fn resolve(&mut self) -> Result<Value> {
        match self.root.clone() {
            Some(root) => self.resolve_item(&root),
            None => Ok(Value::Map(Default::default())),
        }
    }

    pub fn resolve_item(&mut self, item: &Item) -> Result<Value> {
        match item {
            Item::Native(value) => Ok(value.clone()),
            Item::Node(id) => self.resolve_node(*id),
        }
    }

    pub fn resolve_node(&mut self, id: NodeId) -> Result<Value> {
        trace!("Document::resolve_node({})", id);
        match self.nodes[id].kind {
            NodeKind::Object(_) => self.resolve_object(id),
            NodeKind::Array(_) => self.resolve_array(id),
            NodeKind::Operation(_) => self.resolve_operation(id),
            NodeKind::Macro(_) => self.resolve_macro(id),
            NodeKind::Reference(_) => self.resolve_reference(id),
        }
    }

    /// Records `parent` as the container of `item`. Operations, macro calls
    /// and references are not path elements: their operands see the same
    /// container.
    pub fn set_parent(&mut self, item: &Item, parent: NodeId) {
        let mut pending = vec![item.clone()];
        while let Some(item) = pending.pop() {
            let Item::Node(id) = item else {
                continue;
            };
            self.nodes[id].parent = Some(parent);

            match &self.nodes[id].kind {
                NodeKind::Operation(operation) => {
                    pending.push(operation.left.clone());
                    pending.push(operation.right.clone());
                }
                NodeKind::Macro(call) => {
                    pending.push(call.param.clone());
                    pending.push(Item::Node(call.options));
                }
                NodeKind::Reference(reference) => {
                    pending.push(reference.path.clone());
                    pending.push(Item::Node(reference.options));
                }
                NodeKind::Object(_) | NodeKind::Array(_) => {}
            }
        }
    }

    /// Drops the cached native value of `id` and of every ancestor.
    pub(crate) fn invalidate(&mut self, id: NodeId) {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            match &mut self.nodes[current].kind {
                NodeKind::Object(object) => object.cache = None,
                NodeKind::Array(array) => array.cache = None,
                _ => {}
            }
            cursor = self.nodes[current].parent;
        }
    }

    pub fn is_collection(&self, item: &Item) -> bool {
        match item {
            Item::Node(id) => matches!(self.nodes[*id].kind, NodeKind::Object(_) | NodeKind::Array(_)),
            Item::Native(value) => value.is_object() || value.is_list(),
        }
    }

    /// Turns a native value into nodes so that collections can be merged
    /// and walked like parsed ones.
    pub fn adopt(&mut self, value: Value) -> Item {
        match value {
            Value::Map(map) => Item::Node(self.object_from_map(map)),
            Value::List(items) => {
                let array = self.new_array();
                for value in items {
                    let item = self.adopt(value);
                    self.push(array, item);
                }
                Item::Node(array)
            }
            scalar => Item::Native(scalar),
        }
    }

    /// Copies the containers reachable from `item`, together with the
    /// references and operations that resolve relative to them. Macro calls
    /// stay shared so each one still runs once.
    pub(crate) fn copy_containers(&mut self, item: &Item) -> Item {
        let Item::Node(id) = item else {
            return item.clone();
        };

        match &self.nodes[*id].kind {
            NodeKind::Object(object) => {
                let entries: Vec<(String, Item)> = object.entries().map(|(k, v)| (k.clone(), v.clone())).collect();
                let copy = self.new_object();
                for (key, value) in entries {
                    let value = self.copy_containers(&value);
                    self.insert(copy, key, value);
                }
                Item::Node(copy)
            }
            NodeKind::Array(array) => {
                let items: Vec<Item> = array.items().to_vec();
                let copy = self.new_array();
                for value in items {
                    let value = self.copy_containers(&value);
                    self.push(copy, value);
                }
                Item::Node(copy)
            }
            NodeKind::Reference(reference) => {
                let (path, options, location) = (reference.path.clone(), reference.options, reference.location.clone());
                let path = self.copy_containers(&path);
                let options = match self.copy_containers(&Item::Node(options)) {
                    Item::Node(options) => options,
                    Item::Native(_) => options,
                };
                Item::Node(self.new_reference(path, options, location))
            }
            NodeKind::Operation(_) => self.copy_operation(*id),
            NodeKind::Macro(_) => item.clone(),
        }
    }

    fn copy_operation(&mut self, id: NodeId) -> Item {
        let mut spine = Vec::new();
        let mut current = id;
        let first = loop {
            let NodeKind::Operation(operation) = &self.nodes[current].kind else {
                break Item::Node(current);
            };
            spine.push((operation.right.clone(), operation.operator, operation.location.clone()));
            match &operation.left {
                Item::Node(next) if matches!(self.nodes[*next].kind, NodeKind::Operation(_)) => current = *next,
                left => break left.clone(),
            }
        };

        let mut copy = self.copy_containers(&first);
        while let Some((right, operator, location)) = spine.pop() {
            let right = self.copy_containers(&right);
            copy = Item::Node(self.new_operation(copy, right, operator, location));
        }
        copy
    }

    fn not_a(&self, id: NodeId, expected: &str) -> NaclError {
        NaclError::Internal(format!("Node {} is not {}", id, expected))
    }
}
