use indexmap::IndexMap;
use log::trace;

use crate::core::nodes::{Document, Item, NodeId, NodeKind};
use crate::errors::Result;
use crate::types::{Map, Value};

/// Ordered key/value container. Its native value is cached until an entry
/// changes.
#[derive(Debug, Default)]
pub struct ObjectNode {
    pub(crate) entries: IndexMap<String, Item>,
    pub(crate) cache: Option<Value>,
}

impl ObjectNode {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Item> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Item)> {
        self.entries.iter()
    }
}

impl Document {
    pub fn new_object(&mut self) -> NodeId {
        self.alloc(NodeKind::Object(ObjectNode::default()))
    }

    pub fn object_from_map(&mut self, map: Map) -> NodeId {
        let object = self.new_object();
        for (key, value) in map {
            let item = self.adopt(value);
            self.insert(object, key, item);
        }
        object
    }

    pub fn object(&self, id: NodeId) -> Option<&ObjectNode> {
        match &self.nodes[id].kind {
            NodeKind::Object(object) => Some(object),
            _ => None,
        }
    }

    fn object_mut(&mut self, id: NodeId) -> Option<&mut ObjectNode> {
        match &mut self.nodes[id].kind {
            NodeKind::Object(object) => Some(object),
            _ => None,
        }
    }

    fn object_id(&self, item: &Item) -> Option<NodeId> {
        match item {
            Item::Node(id) if self.object(*id).is_some() => Some(*id),
            _ => None,
        }
    }

    /// Stores `item` under `key`, replacing any previous value in place.
    pub fn insert(&mut self, object: NodeId, key: String, item: Item) {
        self.set_parent(&item, object);
        if let Some(node) = self.object_mut(object) {
            node.entries.insert(key, item);
        }
        self.invalidate(object);
    }

    /// Stores `item` under `key`. When both the previous and the new value are
    /// objects they are merged instead.
    pub fn assign(&mut self, object: NodeId, key: String, item: Item) {
        let existing = self.object(object).and_then(|node| node.get(&key)).cloned();
        let pair = existing.as_ref().and_then(|current| self.object_id(current)).zip(self.object_id(&item));
        match pair {
            Some((current, incoming)) => {
                let merged = self.merge(current, incoming);
                self.insert(object, key, Item::Node(merged));
            }
            None => self.insert(object, key, item),
        }
    }

    /// Deep merges `other` into `into` and returns the resulting object.
    ///
    /// If either side is empty the other one is returned untouched. Keys
    /// holding objects on both sides are merged recursively; any other value
    /// from `other` replaces the existing one, keeping its position.
    pub fn merge(&mut self, into: NodeId, other: NodeId) -> NodeId {
        let into_len = self.object(into).map(ObjectNode::len).unwrap_or(0);
        let incoming: Vec<(String, Item)> = match self.object(other) {
            Some(node) => node.entries().map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => return into,
        };
        if into_len == 0 {
            return other;
        }
        if incoming.is_empty() {
            return into;
        }

        trace!("Merging object {} into {}", other, into);
        for (key, value) in incoming {
            self.assign(into, key, value);
        }
        into
    }

    pub(crate) fn resolve_object(&mut self, id: NodeId) -> Result<Value> {
        let entries: Vec<(String, Item)> = match self.object(id) {
            Some(object) => {
                if let Some(cached) = &object.cache {
                    return Ok(cached.clone());
                }
                object.entries().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
            None => return Err(self.not_a(id, "an object")),
        };

        let mut map = Map::with_capacity(entries.len());
        for (key, item) in entries {
            let value = self.resolve_item(&item)?;
            map.insert(key, value);
        }

        let value = Value::Map(map);
        if let Some(object) = self.object_mut(id) {
            object.cache = Some(value.clone());
        }
        Ok(value)
    }
}
