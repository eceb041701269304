//! Command line interface

pub mod commands;
pub mod handlers;

pub use commands::selection_args;
pub use commands::Cli;
pub use commands::Commands;
pub use handlers::*;
