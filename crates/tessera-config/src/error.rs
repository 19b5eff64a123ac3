//! Configuration error types.

/// Errors that can occur when loading, saving, or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file from disk.
    #[error("failed to read config: {0}")]
    ReadError(#[source] std::io::Error),

    /// Failed to write the config file to disk.
    #[error("failed to write config: {0}")]
    WriteError(#[source] std::io::Error),

    /// Failed to parse RON content.
    #[error("failed to parse config: {0}")]
    ParseError(#[source] ron::error::SpannedError),

    /// Failed to serialize config to RON.
    #[error("failed to serialize config: {0}")]
    SerializeError(#[source] ron::Error),

    /// The configured window does not fit the slot grid.
    #[error("invalid window settings: {0}")]
    InvalidWindow(#[from] WindowFitError),
}

/// Why a window shape cannot be laid out on its slot grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WindowFitError {
    /// The grid exponent would allocate an unreasonable number of slots.
    #[error("grid exponent {grid_exponent} exceeds the maximum of {max}")]
    GridTooLarge {
        /// Requested exponent.
        grid_exponent: u32,
        /// Largest accepted exponent.
        max: u32,
    },

    /// `2 * range + 1` columns do not fit in the slot grid.
    #[error("window range {range} needs {needed} columns but the slot grid is {grid_size} wide")]
    WindowTooLarge {
        /// Requested window range.
        range: u32,
        /// `2 * range + 1`.
        needed: u64,
        /// Slots per grid side.
        grid_size: u64,
    },
}
