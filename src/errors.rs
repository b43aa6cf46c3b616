use std::fmt;

use thiserror::Error;

/// Source position attached to content-driven errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: usize,
}

impl Location {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self { file: file.into(), line }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on line {}", self.file, self.line)
    }
}

/// Non-fatal event recorded while parsing, such as an undefined variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub location: Location,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.message, self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NaclError {
    #[error("{message} in {location}")]
    Lexing { message: String, location: Location },
    #[error("{message} in {location}")]
    Parsing { message: String, location: Location },
    #[error("{message} in {location}")]
    Reference { message: String, location: Location },
    #[error("{message} in {location}")]
    Evaluation { message: String, location: Location },
    #[error("Macro '{0}' is already registered")]
    DuplicateMacro(String),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Not a file: {0}")]
    NotAFile(String),
    #[error("File is not readable: {0}")]
    NotReadable(String),
    #[error("{0}")]
    Macro(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NaclError {
    pub fn lexing(message: impl Into<String>, location: Location) -> Self {
        NaclError::Lexing { message: message.into(), location }
    }

    pub fn parsing(message: impl Into<String>, location: Location) -> Self {
        NaclError::Parsing { message: message.into(), location }
    }

    pub fn reference(message: impl Into<String>, location: Location) -> Self {
        NaclError::Reference { message: message.into(), location }
    }

    pub fn evaluation(message: impl Into<String>, location: Location) -> Self {
        NaclError::Evaluation { message: message.into(), location }
    }

    /// The error message without its location suffix.
    pub fn message(&self) -> String {
        match self {
            NaclError::Lexing { message, .. }
            | NaclError::Parsing { message, .. }
            | NaclError::Reference { message, .. }
            | NaclError::Evaluation { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            NaclError::Lexing { location, .. }
            | NaclError::Parsing { location, .. }
            | NaclError::Reference { location, .. }
            | NaclError::Evaluation { location, .. } => Some(location),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, NaclError>;
