//! Error types for policy resolution, type generation and validation.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::CrudOperation;

/// Errors while resolving policies, generating types or building documents.
///
/// None of these are recoverable inside the crate; a failed call produces
/// no partial type or document.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("entity '{entity}' has no field '{field}'")]
    UnknownField { entity: String, field: String },

    #[error("values for '{entity}' supply field '{field}' more than once")]
    DuplicateField { entity: String, field: String },

    #[error(
        "field '{field}' of '{entity}' has storage kind '{kind}' with no scalar mapping"
    )]
    UnsupportedScalarKind {
        entity: String,
        field: String,
        kind: String,
    },

    #[error("cyclic relation while generating {operation} types: {}", path.join(" -> "))]
    CyclicRelation {
        operation: CrudOperation,
        path: Vec<String>,
    },

    #[error("unknown entity '{entity}'")]
    UnknownEntity { entity: String },

    #[error("entity '{entity}' declares no mutation name table")]
    MissingMutationConfig { entity: String },
}

impl GenerateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Errors while loading catalogs and values from files, strings or URLs.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid catalog: {source}")]
    InvalidCatalog {
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors during values validation.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error("generated schema rejected: {message}")]
    InvalidSchema { message: String },

    #[error("validation failed with {} error(s)", errors.len())]
    Invalid { errors: Vec<SchemaError> },
}

/// Single validation error with path context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchemaError {
    /// JSON Pointer (RFC 6901) to the invalid value.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl ValidateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidateError::Generate(e) => e.exit_code(),
            ValidateError::InvalidSchema { .. } => 2,
            ValidateError::Invalid { .. } => 1,
        }
    }
}
