//! Shared utilities: the crate's error taxonomy and logging setup.

pub mod error;
pub mod logging;
