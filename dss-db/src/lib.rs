//! DSS database layer
//!
//! Wraps a PostgreSQL pool behind a single [`Store::transact`] primitive:
//! every business operation runs inside one serializable transaction and is
//! retried from scratch on serialization conflicts. The per-entity
//! repositories live in [`repos`] as methods on the transaction-owning
//! [`Repository`].

pub mod repos;
pub mod schema;
pub mod store;

pub use repos::{NotifyTrigger, Repository};
pub use schema::DSS_SCHEMA;
pub use store::{RidSchemaVersion, Store, TxFuture};
