use crate::errors::Result;
use crate::types::{Map, Value};

use super::{Macro, MacroContext, ParamType};

/// Adapts a closure `(parameter, options) -> value` to [`Macro`].
pub struct CallbackMacro<F> {
    callback: F,
    parameter_type: ParamType,
}

impl<F> CallbackMacro<F>
where
    F: Fn(Value, &Map) -> Result<Value> + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback, parameter_type: ParamType::All }
    }

    pub fn with_parameter_type(mut self, parameter_type: ParamType) -> Self {
        self.parameter_type = parameter_type;
        self
    }
}

impl<F> Macro for CallbackMacro<F>
where
    F: Fn(Value, &Map) -> Result<Value> + Send + Sync,
{
    fn execute(&self, parameter: Value, options: &Map, _context: &MacroContext) -> Result<Value> {
        (self.callback)(parameter, options)
    }

    fn parameter_type(&self) -> ParamType {
        self.parameter_type.clone()
    }
}
