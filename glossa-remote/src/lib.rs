//! glossa remote - MediaWiki leaf source
//!
//! [`MediaWikiSource`] feeds a leaf [`glossa_storage::ContentCache`] from a
//! wiki's action API. HTTP lives behind [`ApiTransport`]; [`MediaWikiClient`]
//! is the blocking implementation with rate limiting and a [`RetryPolicy`].

pub mod api;
pub mod client;
pub mod filter;
pub mod retry;
pub mod source;

pub use client::{ApiTransport, MediaWikiClient};
pub use filter::ContentFilter;
pub use retry::{is_retryable_status, Failure, RetryPolicy};
pub use source::{records_from_pages, MediaWikiSource};
