//! Library half of the `orbital` package: the configuration surface, kept
//! separate from `main.rs` so CLI parsing and config mapping can be unit
//! tested directly.

pub mod config;

pub use config::CliArgs;
