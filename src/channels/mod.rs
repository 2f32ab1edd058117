//! Terminal front end.

pub mod render;
pub mod repl;

pub use repl::ReplChannel;
