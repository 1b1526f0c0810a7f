//! Common types module for the order pipeline.
//!
//! Shared data types used across the pipeline crates: the order record and
//! its lifecycle, pub/sub channel and delivery signalling types, state store
//! entries, HTTP error payloads and configuration validation helpers.

/// API types for HTTP endpoints and error responses.
pub mod api;
/// Error classification shared by collaborator clients.
pub mod error;
/// Order record and ingestion payload types.
pub mod order;
/// Pub/sub channel, subscription and delivery status types.
pub mod pubsub;
/// Self-registration trait for pluggable implementations.
pub mod registry;
/// State store entry types.
pub mod state;
/// Configuration validation types.
pub mod validation;

pub use api::*;
pub use error::ErrorClass;
pub use order::*;
pub use pubsub::*;
pub use registry::ImplementationRegistry;
pub use state::*;
pub use validation::*;
