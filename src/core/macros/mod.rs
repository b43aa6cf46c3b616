use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use log::trace;

use crate::errors::{Location, NaclError, Result};
use crate::fs::FileSystem;
use crate::types::{Map, Value};

pub mod callback;
pub mod env;
pub mod file;

pub use callback::CallbackMacro;
pub use env::EnvMacro;
pub use file::FileMacro;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Null,
    All,
    Any(Vec<ParamType>)
}

impl ParamType {
    pub fn matches(&self, value: &Value) -> bool {
        trace!("ParamType::matches({:?}, {:?})", self, value);
        match self {
            ParamType::String => matches!(value, Value::String(_)),
            ParamType::Number => matches!(value, Value::Number(_)),
            ParamType::Boolean => matches!(value, Value::Boolean(_)),
            ParamType::Array => matches!(value, Value::List(_)),
            ParamType::Object => matches!(value, Value::Map(_)),
            ParamType::Null => matches!(value, Value::Null),
            ParamType::All => true,
            ParamType::Any(types) => types.iter().any(|t| t.matches(value)),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::String => write!(f, "string"),
            ParamType::Number => write!(f, "number"),
            ParamType::Boolean => write!(f, "boolean"),
            ParamType::Array => write!(f, "array"),
            ParamType::Object => write!(f, "object"),
            ParamType::Null => write!(f, "null"),
            ParamType::All => write!(f, "any"),
            ParamType::Any(types) => write!(f, "{}", types.iter().map(|t| t.to_string()).collect::<Vec<String>>().join(" or ")),
        }
    }
}

/// Where and how a macro call was written, handed to the macro when it runs.
#[derive(Debug, Clone)]
pub struct MacroContext {
    pub name: String,
    pub location: Location,
    /// Directory of the document that contains the call.
    pub base_dir: PathBuf,
    pub file_system: Arc<dyn FileSystem>,
}

impl MacroContext {
    /// Builds a parse error located at the macro call.
    pub fn error(&self, message: impl Into<String>) -> NaclError {
        NaclError::parsing(message, self.location.clone())
    }

    pub fn resolve_path(&self, relative: &str) -> Option<PathBuf> {
        self.file_system.resolve_path(relative, &self.base_dir)
    }
}

/// A named extension invoked from a document as `.name (options) parameter`.
pub trait Macro: Send + Sync {
    fn execute(&self, parameter: Value, options: &Map, context: &MacroContext) -> Result<Value>;

    fn parameter_type(&self) -> ParamType {
        ParamType::All
    }

    fn validate(&self, parameter: &Value, context: &MacroContext) -> Result<()> {
        let expected = self.parameter_type();
        if expected.matches(parameter) {
            return Ok(());
        }
        Err(context.error(format!(
            "Macro '{}' expects parameter to be {}, {} given.",
            context.name,
            expected,
            parameter.type_name()
        )))
    }
}
