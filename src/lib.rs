//! Job application tracker: a query cache with optimistic writes, a Kanban
//! board projection, and a drag controller on top of an owner-scoped store.

pub mod auth;
pub mod board;
pub mod cache;
pub mod db;
pub mod drag;
pub mod error;
pub mod export;
pub mod models;
pub mod mutation;
pub mod store;
pub mod tracker;
pub mod tui;

pub use error::{Result, TrackerError};
pub use tracker::Tracker;
