//! Configuration for the window cache.
//!
//! Settings persist to disk as a RON file and tolerate missing or unknown
//! fields, so older and newer config files keep loading.

mod config;
mod error;

pub use config::{Config, DebugConfig, MAX_GRID_EXPONENT, WindowConfig};
pub use error::{ConfigError, WindowFitError};
