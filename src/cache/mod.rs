//! Layered cache orchestration modules
//!
//! The manager fans operations out across an ordered chain of cache handles,
//! the backplane carries invalidations between manager instances, and the
//! update module implements the optimistic-concurrency write path.

pub mod backplane;
pub mod config;
pub mod error;
pub mod handle;
pub mod item;
pub mod manager;
pub mod stats;
pub mod update;
