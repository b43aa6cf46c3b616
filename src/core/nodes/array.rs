use crate::core::nodes::{Document, Item, NodeId, NodeKind};
use crate::errors::Result;
use crate::types::Value;

/// Ordered list of items.
#[derive(Debug, Default)]
pub struct ArrayNode {
    pub(crate) items: Vec<Item>,
    pub(crate) cache: Option<Value>,
}

impl ArrayNode {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }
}

impl Document {
    pub fn new_array(&mut self) -> NodeId {
        self.alloc(NodeKind::Array(ArrayNode::default()))
    }

    pub fn array(&self, id: NodeId) -> Option<&ArrayNode> {
        match &self.nodes[id].kind {
            NodeKind::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn push(&mut self, array: NodeId, item: Item) {
        self.set_parent(&item, array);
        if let NodeKind::Array(node) = &mut self.nodes[array].kind {
            node.items.push(item);
        }
        self.invalidate(array);
    }

    pub(crate) fn resolve_array(&mut self, id: NodeId) -> Result<Value> {
        let items: Vec<Item> = match self.array(id) {
            Some(array) => {
                if let Some(cached) = &array.cache {
                    return Ok(cached.clone());
                }
                array.items.clone()
            }
            None => return Err(self.not_a(id, "an array")),
        };

        let mut values = Vec::with_capacity(items.len());
        for item in &items {
            values.push(self.resolve_item(item)?);
        }

        let value = Value::List(values);
        if let NodeKind::Array(array) = &mut self.nodes[id].kind {
            array.cache = Some(value.clone());
        }
        Ok(value)
    }
}
