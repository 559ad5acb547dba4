//! Crate for the `flushguard` project
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_copy_implementations)]
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod events;
pub mod flushing;
pub mod http_client;
pub mod logger;
pub mod pipeline;
pub mod transport;

pub const LIBRARY_NAME: &str = "flushguard";
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the YAML file looked up in the configuration directory.
pub const CONFIG_FILE_NAME: &str = "flushguard.yaml";
/// Prefix for environment variable overrides, e.g. `FLUSHGUARD_WRITE_KEY`.
pub const ENV_PREFIX: &str = "FLUSHGUARD_";
