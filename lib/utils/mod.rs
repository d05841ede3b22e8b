//! Common error handling and output directory utilities
pub mod dirs;
pub mod errors;
