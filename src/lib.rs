//! Agent Timeline - Discover, parse and follow Claude Code session logs.

pub mod config;
pub mod display;
pub mod scanner;
pub mod transcript;
pub mod watcher;
