//! CLI command handlers
//!
//! - start: run the supervisor until Ctrl-C
//! - status: lock file and persisted progress
//! - info: effective configuration and network selection

pub mod info;
pub mod start;
pub mod status;

pub use info::*;
pub use start::*;
pub use status::*;
