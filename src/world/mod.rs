//! World lifecycle
//!
//! One backend, one capability token, any number of worlds.

pub mod world_manager;

pub use world_manager::{WorldId, WorldManager};
