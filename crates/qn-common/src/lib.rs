//! Quake nowcast common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the nowcast crates:
//! - Catalog events and bounding boxes
//! - Training run identifiers
//! - Artifact schema versioning
//! - The unified error type

pub mod error;
pub mod event;
pub mod id;
pub mod region;
pub mod schema;

pub use error::{Error, Result};
pub use event::{days_between, Event, MS_PER_DAY};
pub use id::RunId;
pub use region::BoundingBox;
pub use schema::ARTIFACT_SCHEMA_VERSION;
