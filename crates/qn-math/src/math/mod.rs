//! Core math modules.

pub mod geo;
pub mod stable;
