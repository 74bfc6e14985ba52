//! Statement execution: render → bind → dispatch → map, with the
//! session-scoped first-level cache (`simple`) and the optional
//! namespace-scoped second-tier cache (`caching`) layered on top.

pub mod caching;
pub mod simple;
pub mod transaction;

pub use transaction::Transaction;
