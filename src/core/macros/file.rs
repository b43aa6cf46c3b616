use log::debug;

use crate::errors::Result;
use crate::types::{Map, Value};

use super::{Macro, MacroContext, ParamType};

/// `.file "path"` returns the content of a file, relative to the document
/// containing the call. A `default` option replaces a missing file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileMacro;

impl Macro for FileMacro {
    fn execute(&self, parameter: Value, options: &Map, context: &MacroContext) -> Result<Value> {
        let name = parameter.as_str().unwrap_or_default();

        let content = context
            .resolve_path(name)
            .and_then(|path| context.file_system.read(&path).ok());

        match (content, options.get("default")) {
            (Some(content), _) => Ok(Value::String(content)),
            (None, Some(default)) => {
                debug!("File '{}' is not readable, using default", name);
                Ok(default.clone())
            }
            (None, None) => Err(context.error(format!("Unable to read file '{}'", name))),
        }
    }

    fn parameter_type(&self) -> ParamType {
        ParamType::String
    }
}
