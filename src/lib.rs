//! Client-side read cache for OData v4 services.
//!
//! Consumers read ranges of a collection (or a single entity) through a
//! cache; the cache requests only what nobody has requested yet, shares
//! in-flight requests between overlapping reads and discards responses that
//! arrive after a refresh.

pub mod cache;
pub mod config;
pub mod odata;
pub mod query;
