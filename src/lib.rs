//! Kindle relay — watches an inbox, emails originals, converts, archives.

pub mod config;
pub mod convert;
pub mod delivery;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod validator;
pub mod watcher;
