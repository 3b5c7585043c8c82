//! CLI command implementations.

pub mod backup;
pub mod scan;
pub mod write;
