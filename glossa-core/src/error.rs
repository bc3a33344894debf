//! Error types for glossa operations

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Record not found: {title}")]
    NotFound { title: String },

    #[error("Redirect loop at {title}: {}", chain.join(" -> "))]
    RedirectLoop { title: String, chain: Vec<String> },

    #[error("Redirect chain from {title} exceeds {hops} hops")]
    RedirectDepthExceeded { title: String, hops: usize },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Upstream source errors (remote transport or composed caches).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Request to {endpoint} failed with status {status}: {message}")]
    RequestFailed {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("Cache {cache} does not support refresh")]
    RefreshUnsupported { cache: String },

    #[error("Gave up on {endpoint} after {attempts} attempts: {last}")]
    RetriesExhausted {
        endpoint: String,
        attempts: u32,
        last: String,
    },
}

/// Data-quality errors raised while deriving one record.
///
/// These are caught at the derived-cache boundary and stored as the record's
/// error text instead of aborting the batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Parameter {param} is ambiguous: {reason}")]
    AmbiguousParameter { param: String, reason: String },

    #[error("Parameter {param} has unsupported content: {reason}")]
    UnparseableParameter { param: String, reason: String },

    #[error("Template {template} requires parameter {param}")]
    MissingParameter { template: String, param: String },

    #[error("Expansion of {name} exceeded depth {depth}")]
    ExpansionDepthExceeded { name: String, depth: usize },
}

/// Violations of the closed wikitext grammar. Never caught by the engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StructuralError {
    #[error("Blank template name in {context}")]
    BlankTemplateName { context: String },

    #[error("Unhandled directive {name} in {context}")]
    UnhandledDirective { name: String, context: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid pattern for {field}: {reason}")]
    InvalidPattern { field: String, reason: String },

    #[error("Cannot read {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Master error type for all glossa errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GlossaError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl GlossaError {
    /// Whether the error only concerns the record being derived.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GlossaError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GlossaError::Storage(StorageError::NotFound { .. }))
    }
}

/// Result type alias for glossa operations.
pub type GlossaResult<T> = Result<T, GlossaError>;

// =============================================================================
// TESTS
// =============================================================================
