//! Business services, one per API surface
//!
//! Each operation runs inside a single [`dss_db::Store::transact`] call:
//! read the affected records, validate preconditions, write the mutation,
//! bump the notification index of every intersecting subscription, and
//! return the affected set. Closures recompute derived values on every
//! attempt so a serialization-conflict rerun starts clean.

pub mod aux;
pub mod rid;
pub mod scd;

pub use aux::AuxService;
pub use rid::RidService;
pub use scd::ScdService;
