//! Error types for patternkit.
//!
//! Most of the kernel is total (noise and integrators never fail). Errors only
//! come from the preset layer: storage access, JSON (de)serialization and
//! factory preset loading. The public "never fails" entry points catch these
//! and degrade, the `try_*` variants surface them.

use thiserror::Error;

/// Errors produced by the preset store, storage backends and factory loaders.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A storage backend rejected a read or write.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Writing would push the store past its size budget.
    #[error("Storage budget exceeded: {needed} bytes needed, budget is {budget} bytes")]
    QuotaExceeded { needed: usize, budget: usize },

    /// JSON has no NaN or infinity, so such a value would not load back.
    #[error("Preset {preset:?} has a non-finite value for {key:?}")]
    NonFiniteParameter { preset: String, key: String },

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    /// The factory preset resource could not be fetched.
    #[error("Factory presets unavailable: {0}")]
    FactoryUnavailable(String),
}

pub type Result<T> = std::result::Result<T, PatternError>;
