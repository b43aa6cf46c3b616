use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};

pub mod casting;
pub mod core;
pub mod dumper;
pub mod errors;
pub mod fs;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod token;
pub mod types;
mod tests;

pub use crate::core::macros::{CallbackMacro, Macro, MacroContext, ParamType};
pub use crate::core::nodes::Document;
pub use dumper::{DumpOptions, Dumper};
pub use errors::{Diagnostic, Location, NaclError, Result};
pub use fs::{FileSystem, OsFileSystem};
pub use parser::{DEFAULT_FILENAME, Parser, ParserOptions};
pub use registry::MacroRegistry;
pub use types::{Map, Number, Value};

/// Entry point holding everything a parse needs: macros, predefined
/// variables, file access and parser options.
///
/// Each parse builds a fresh [`Parser`]; the macro registry is shared.
#[derive(Debug, Clone)]
pub struct Nacl {
    registry: Arc<MacroRegistry>,
    variables: HashMap<String, Value>,
    file_system: Arc<dyn FileSystem>,
    options: ParserOptions,
}

impl Default for Nacl {
    fn default() -> Self {
        Self::new()
    }
}

impl Nacl {
    /// Creates an instance with the built-in `env` and `file` macros.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(MacroRegistry::with_builtins()))
    }

    pub fn with_registry(registry: Arc<MacroRegistry>) -> Self {
        Self {
            registry,
            variables: HashMap::new(),
            file_system: Arc::new(OsFileSystem),
            options: ParserOptions::default(),
        }
    }

    pub fn registry(&self) -> &Arc<MacroRegistry> {
        &self.registry
    }

    pub fn register_macro(&self, name: &str, r#macro: Arc<dyn Macro>) -> Result<()> {
        self.registry.register(name, r#macro)
    }

    pub fn register_fn<F>(&self, name: &str, callback: F) -> Result<()>
    where
        F: Fn(Value, &Map) -> Result<Value> + Send + Sync + 'static,
    {
        self.registry.register_fn(name, callback)
    }

    pub fn set_variable(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.variables.insert(name.to_string(), value.into());
        self
    }

    pub fn set_file_system(&mut self, file_system: Arc<dyn FileSystem>) -> &mut Self {
        self.file_system = file_system;
        self
    }

    pub fn set_max_depth(&mut self, max_depth: usize) -> &mut Self {
        self.options.max_depth = max_depth;
        self
    }

    pub fn set_base_dir(&mut self, base_dir: impl Into<PathBuf>) -> &mut Self {
        self.options.base_dir = base_dir.into();
        self
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Parser primed with this instance's macros, variables and options.
    pub fn create_parser(&self) -> Parser {
        let mut parser = Parser::new(self.registry.clone(), self.file_system.clone(), self.options.clone());
        for (name, value) in &self.variables {
            parser.set_variable(name, value.clone());
        }
        parser
    }

    pub fn parse(&self, text: &str) -> Result<Value> {
        self.parse_named(text, DEFAULT_FILENAME)
    }

    /// Parses `text`, reporting errors against `filename`.
    pub fn parse_named(&self, text: &str, filename: &str) -> Result<Value> {
        let document = self.create_parser().parse(text, filename)?;
        resolve(document)
    }

    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        let document = self.create_parser().parse_file(path.as_ref())?;
        resolve(document)
    }

    /// Pretty printed NACL source for `value`.
    pub fn dump(value: &Value) -> String {
        Dumper::new(DumpOptions::pretty()).dump(value)
    }
}

fn resolve(mut document: Document) -> Result<Value> {
    debug!("Resolving document of {} nodes", document.len());
    let value = document.resolve();
    if !document.warnings().is_empty() {
        warn!("Parsed with {} warning(s)", document.warnings().len());
    }
    value
}

/// Parses `text` with the built-in macros.
pub fn parse(text: &str) -> Result<Value> {
    Nacl::new().parse(text)
}

pub fn parse_file(path: impl AsRef<Path>) -> Result<Value> {
    Nacl::new().parse_file(path)
}

pub fn dump(value: &Value) -> String {
    Nacl::dump(value)
}
