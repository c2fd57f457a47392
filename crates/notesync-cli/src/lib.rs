//! notesync-cli: native binary wiring the reconciliation engine to a
//! real directory and the Simperium HTTP API.

pub mod config;
pub mod native_fs;
pub mod simperium;

pub use config::{Config, ConfigError};
pub use native_fs::NativeFs;
pub use simperium::HttpRemote;
