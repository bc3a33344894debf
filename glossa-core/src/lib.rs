//! glossa core types
//!
//! Records, the token stream, the force flag, the error taxonomy and
//! configuration. Every other glossa crate depends on this one.

use chrono::{DateTime, Utc};

pub mod config;
pub mod entities;
pub mod error;
pub mod force;
pub mod record;
pub mod token;

pub use config::{CacheConfig, GlossaConfig, RemoteConfig, RetryConfig};
pub use error::{
    ConfigError, GlossaError, GlossaResult, SourceError, StorageError, StructuralError,
    ValidationError,
};
pub use force::{Force, SourceKind};
pub use record::Record;
pub use token::{HeaderSegment, Params, Token, TokenParams};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
