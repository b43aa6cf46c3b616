use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock}
};

use log::{debug, error};

use crate::core::macros::{CallbackMacro, EnvMacro, FileMacro, Macro};
use crate::errors::{NaclError, Result};
use crate::types::{Map, Value};

/// Names handled by the parser itself.
pub const RESERVED_MACROS: [&str; 2] = ["include", "ref"];

/// Name → macro table consulted when a document calls `.name`.
///
/// Registration happens before parsing; parsers only read from it, so one
/// registry can be shared between parses behind an `Arc`.
pub struct MacroRegistry {
    macros: RwLock<HashMap<String, Arc<dyn Macro>>>,
}

impl MacroRegistry {
    /// Creates a registry without any macro.
    pub fn new() -> Self {
        Self {
            macros: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry holding the `env` and `file` macros.
    pub fn with_builtins() -> Self {
        let mut macros = HashMap::new();
        macros.insert("env".to_string(), Arc::new(EnvMacro) as Arc<dyn Macro>);
        macros.insert("file".to_string(), Arc::new(FileMacro) as Arc<dyn Macro>);
        Self {
            macros: RwLock::new(macros),
        }
    }

    /// Registers a macro under `name`. A name can only be registered once.
    pub fn register(&self, name: &str, r#macro: Arc<dyn Macro>) -> Result<()> {
        if RESERVED_MACROS.contains(&name) {
            error!("Macro '{}' is reserved", name);
            return Err(NaclError::DuplicateMacro(name.to_string()));
        }

        let mut macros = self.macros.write().map_err(|_| {
            error!("Failed to acquire write lock on macros");
            NaclError::Internal("Macro lock poisoned".to_string())
        })?;

        if macros.contains_key(name) {
            error!("Macro '{}' is already registered", name);
            return Err(NaclError::DuplicateMacro(name.to_string()));
        }

        debug!("Registering macro: {}", name);
        macros.insert(name.to_string(), r#macro);
        Ok(())
    }

    /// Registers a closure receiving the resolved parameter and options.
    pub fn register_fn<F>(&self, name: &str, callback: F) -> Result<()>
    where
        F: Fn(Value, &Map) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(CallbackMacro::new(callback)))
    }

    pub fn lookup(&self, name: &str) -> Result<Option<Arc<dyn Macro>>> {
        let macros = self.macros.read().map_err(|_| {
            error!("Failed to acquire read lock on macros");
            NaclError::Internal("Macro lock poisoned".to_string())
        })?;
        Ok(macros.get(name).cloned())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros
            .read()
            .map(|macros| macros.contains_key(name))
            .unwrap_or(false)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .macros
            .read()
            .map(|macros| macros.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl Default for MacroRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for MacroRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroRegistry").field("macros", &self.names()).finish()
    }
}
