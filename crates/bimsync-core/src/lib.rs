//! bimsync-core - Core library for bimsync
//!
//! This crate contains the entity models, the change-tracked unit of work,
//! the libSQL-backed local store and the three-way synchronization engine
//! that reconciles local, synchronized-baseline and remote copies of
//! projects, objectives and their children.

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod sync;
pub mod util;

pub use context::Context;
pub use error::{Error, Result};
pub use models::{BimElement, DynamicField, FieldValue, Item, Objective, Project, User};
