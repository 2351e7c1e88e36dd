//! Persistence gateway implementations.
//!
//! The gateway trait lives in `renju_core::store`; this module provides the
//! backends: [`MemoryGateway`] for tests and ephemeral runs, [`RedbGateway`]
//! for durable embedded storage. Both are `Arc`-shared internally, so
//! clones see the same data.

mod memory;
mod redb;

pub use memory::MemoryGateway;
pub use redb::RedbGateway;
