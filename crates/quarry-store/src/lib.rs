//! Data-store runtime for Quarry.
//!
//! This crate hosts the stateful half of the engine:
//!
//! - `StateTracker` snapshots and dirty detection
//! - `EntityCache` weak identity cache
//! - `TransactionState` join-outer nesting with rollback-only poisoning
//! - `EntityStream` lazy, cancelable result decoding
//! - `EntityStore` tying it all together over a [`quarry_core::Backend`]

pub mod cache;
pub mod store;
pub mod stream;
pub mod tracker;
pub mod transaction;

pub use cache::EntityCache;
pub use store::{EntityStore, StoreConfig};
pub use stream::{CancelToken, EntityStream};
pub use tracker::{EntityState, ObjectKey, StateTracker};
pub use transaction::{Completion, TransactionState};
