//! Core data model for the Discovery and Synchronization Service
//!
//! Holds the record types shared by every API surface (identification
//! service areas, subscriptions, operational intents, constraints), the
//! optimistic-concurrency version tokens, the hierarchical sphere-cell
//! covering used for 4-D airspace indexing, and the internal error taxonomy.

pub mod error;
pub mod geo;
pub mod models;

pub use error::{DssError, DssResult, ErrorKind};
