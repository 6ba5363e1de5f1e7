/*!
 * Core Module
 * Fundamental types, configuration and error handling
 */

pub mod config;
pub mod errors;
pub mod sync;
pub mod types;

// Re-export for convenience
pub use config::{PollConfig, ProcessConfig, WatchStrategy};
pub use errors::*;
pub use types::*;
