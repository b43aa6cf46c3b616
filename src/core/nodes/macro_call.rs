use std::fmt;
use std::sync::Arc;

use log::{debug, trace};

use crate::core::macros::{Macro, MacroContext};
use crate::core::nodes::{Document, Item, NodeId, NodeKind, Resolution};
use crate::errors::{NaclError, Result};
use crate::types::{Map, Value};

/// Deferred call to a registered macro. The callback runs at most once; its
/// value, or its error, is kept for every later read.
pub struct MacroNode {
    pub(crate) callback: Arc<dyn Macro>,
    pub(crate) param: Item,
    pub(crate) options: NodeId,
    pub(crate) context: MacroContext,
    pub(crate) state: Resolution,
}

impl MacroNode {
    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn state(&self) -> &Resolution {
        &self.state
    }
}

impl fmt::Debug for MacroNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroNode")
            .field("name", &self.context.name)
            .field("param", &self.param)
            .field("options", &self.options)
            .field("state", &self.state)
            .finish()
    }
}

impl Document {
    pub fn new_macro(&mut self, callback: Arc<dyn Macro>, param: Item, options: NodeId, context: MacroContext) -> NodeId {
        self.alloc(NodeKind::Macro(MacroNode {
            callback,
            param,
            options,
            context,
            state: Resolution::Unresolved,
        }))
    }

    pub(crate) fn resolve_macro(&mut self, id: NodeId) -> Result<Value> {
        let (callback, param, options, context) = match &mut self.nodes[id].kind {
            NodeKind::Macro(node) => {
                match node.state {
                    Resolution::Resolved(ref value) => return Ok(value.clone()),
                    Resolution::Failed(ref error) => return Err(error.clone()),
                    Resolution::Resolving => {
                        return Err(NaclError::reference("Circular dependence detected.", node.context.location.clone()));
                    }
                    Resolution::Unresolved => {}
                }
                node.state = Resolution::Resolving;
                (node.callback.clone(), node.param.clone(), node.options, node.context.clone())
            }
            _ => return Err(self.not_a(id, "a macro call")),
        };

        trace!("Resolving macro '{}'", context.name);
        let result = self.invoke_macro(callback.as_ref(), &param, options, &context);

        if let NodeKind::Macro(node) = &mut self.nodes[id].kind {
            node.state = match &result {
                Ok(value) => Resolution::Resolved(value.clone()),
                Err(error) => Resolution::Failed(error.clone()),
            };
        }
        result
    }

    fn invoke_macro(&mut self, callback: &dyn Macro, param: &Item, options: NodeId, context: &MacroContext) -> Result<Value> {
        let parameter = self.resolve_item(param)?;
        let options = match self.resolve_node(options)? {
            Value::Map(map) => map,
            _ => Map::new(),
        };

        callback.validate(&parameter, context)?;
        debug!("Executing macro '{}' in {}", context.name, context.location);
        callback.execute(parameter, &options, context)
    }
}
