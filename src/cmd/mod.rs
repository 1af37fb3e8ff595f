//! Command-line entry points.

pub mod extract;
pub mod split;
