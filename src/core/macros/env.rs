use log::debug;

use crate::casting::{to_bool, to_number};
use crate::errors::Result;
use crate::types::{Map, Number, Value};

use super::{Macro, MacroContext, ParamType};

/// `.env NAME` reads an environment variable.
///
/// Options:
/// - `default`: returned when the variable is not set (otherwise `false`).
/// - `type`: one of `string`, `num`/`numeric`, `int`/`integer`,
///   `bool`/`boolean`, coercing the raw text.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvMacro;

impl Macro for EnvMacro {
    fn execute(&self, parameter: Value, options: &Map, context: &MacroContext) -> Result<Value> {
        let name = parameter.as_str().unwrap_or_default();

        let raw = match std::env::var(name) {
            Ok(raw) => raw,
            Err(_) => {
                debug!("Environment variable '{}' is not set", name);
                return Ok(options.get("default").cloned().unwrap_or(Value::Boolean(false)));
            }
        };

        let Some(kind) = options.get("type") else {
            return Ok(Value::String(raw));
        };

        match kind.as_str().map(str::to_ascii_lowercase).as_deref() {
            Some("string") => Ok(Value::String(raw)),
            Some("num") | Some("numeric") => Ok(Value::Number(to_number(&raw))),
            Some("int") | Some("integer") => Ok(Value::Number(Number::Int(to_number(&raw).truncate()))),
            Some("bool") | Some("boolean") => Ok(Value::Boolean(to_bool(&raw))),
            _ => Err(context.error(format!("Invalid type for .env macro: {}", describe(kind)))),
        }
    }

    fn parameter_type(&self) -> ParamType {
        ParamType::String
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        other => other.type_name().to_string(),
    }
}
