use log::trace;

use crate::core::nodes::{Document, Item, NodeId, NodeKind, Resolution};
use crate::errors::{Location, NaclError, Result};
use crate::types::Value;

/// `.ref` call: a slash separated path to another value of the document.
///
/// Paths starting with `/` are absolute from the document root; other paths
/// start at the object holding the reference. `.` stays in place and `..`
/// moves to the enclosing container.
#[derive(Debug)]
pub struct ReferenceNode {
    pub(crate) path: Item,
    pub(crate) options: NodeId,
    pub(crate) location: Location,
    pub(crate) state: Resolution,
}

impl ReferenceNode {
    pub fn state(&self) -> &Resolution {
        &self.state
    }
}

impl Document {
    pub fn new_reference(&mut self, path: Item, options: NodeId, location: Location) -> NodeId {
        self.alloc(NodeKind::Reference(ReferenceNode {
            path,
            options,
            location,
            state: Resolution::Unresolved,
        }))
    }

    pub(crate) fn resolve_reference(&mut self, id: NodeId) -> Result<Value> {
        let (path, options, location) = match &mut self.nodes[id].kind {
            NodeKind::Reference(node) => {
                match node.state {
                    Resolution::Resolved(ref value) => return Ok(value.clone()),
                    Resolution::Failed(ref error) => return Err(error.clone()),
                    Resolution::Resolving => {
                        return Err(NaclError::reference("Circular dependence detected.", node.location.clone()));
                    }
                    Resolution::Unresolved => {}
                }
                node.state = Resolution::Resolving;
                (node.path.clone(), node.options, node.location.clone())
            }
            _ => return Err(self.not_a(id, "a reference")),
        };

        let result = self.follow_reference(id, &path, options, &location);

        if let NodeKind::Reference(node) = &mut self.nodes[id].kind {
            node.state = match &result {
                Ok(value) => Resolution::Resolved(value.clone()),
                Err(error) => Resolution::Failed(error.clone()),
            };
        }
        result
    }

    fn follow_reference(&mut self, id: NodeId, path: &Item, options: NodeId, location: &Location) -> Result<Value> {
        let path = match self.resolve_item(path)? {
            Value::String(path) => path,
            other => {
                return Err(NaclError::reference(
                    format!(".ref expects parameter to be string, {} given.", other.type_name()),
                    location.clone(),
                ));
            }
        };
        trace!("Following reference '{}'", path);

        // A reference without a container has nothing to walk.
        let start = match self.parent(id) {
            Some(_) if path.starts_with('/') => Some(self.root_of(id)),
            parent => parent,
        };
        let Some(start) = start else {
            return self.missing_reference(&path, options, location);
        };

        let mut current = Item::Node(start);
        let mut trail: Vec<Item> = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if let Some(previous) = trail.pop() {
                        current = previous;
                        continue;
                    }
                    let parent = match &current {
                        Item::Node(node) => self.parent(*node),
                        Item::Native(_) => None,
                    };
                    match parent {
                        Some(parent) => current = Item::Node(parent),
                        None => return self.missing_reference(&path, options, location),
                    }
                }
                name => match self.child(&current, name)? {
                    Some(next) => trail.push(std::mem::replace(&mut current, next)),
                    None => return self.missing_reference(&path, options, location),
                },
            }
        }

        self.resolve_item(&current)
    }

    /// Entry `name` of the container behind `item`. Lazy values met on the
    /// way are resolved first and indexed natively.
    fn child(&mut self, item: &Item, name: &str) -> Result<Option<Item>> {
        let id = match item {
            Item::Native(value) => return Ok(value.get(name).cloned().map(Item::Native)),
            Item::Node(id) => *id,
        };

        match &self.nodes[id].kind {
            NodeKind::Object(object) => Ok(object.get(name).cloned()),
            NodeKind::Array(_) => Ok(None),
            _ => {
                let value = self.resolve_node(id)?;
                Ok(value.get(name).cloned().map(Item::Native))
            }
        }
    }

    fn missing_reference(&mut self, path: &str, options: NodeId, location: &Location) -> Result<Value> {
        let default = self.object(options).and_then(|options| options.get("default")).cloned();
        match default {
            Some(item) => self.resolve_item(&item),
            None => Err(NaclError::reference(format!("Undefined property: {}.", path), location.clone())),
        }
    }
}
