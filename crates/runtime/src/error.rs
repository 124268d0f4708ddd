//! Runtime error types

use thiserror::Error;

use crate::ffi::FfiType;

/// Errors from library loading, argument marshaling and native calls
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// None of the candidate names could be loaded
    #[error("could not load any of [{}]: {}", candidates.join(", "), reasons.join("; "))]
    LibraryNotFound {
        candidates: Vec<String>,
        reasons: Vec<String>,
    },

    /// The library does not export the requested symbol
    #[error("symbol '{symbol}' not found in library '{library}'")]
    SymbolNotFound { library: String, symbol: String },

    /// The library handle was already released
    #[error("library '{0}' is closed")]
    LibraryClosed(String),

    /// Library or symbol name that cannot be passed to the platform loader
    #[error("invalid name '{0}': contains an interior NUL byte")]
    InvalidName(String),

    /// A value with no marshaling rule was handed to the argument buffer
    #[error("argument {index} has unsupported type {type_name}")]
    UnsupportedValue { index: usize, type_name: String },

    /// A type shape that cannot be passed through the call interface
    #[error("type '{0}' cannot cross the native call boundary")]
    UnsupportedType(String),

    /// Buffer contents do not match the descriptor parameters
    #[error("argument buffer does not match descriptor: {0}")]
    SignatureMismatch(String),

    /// The requested return kind differs from the descriptor's
    #[error("requested {requested} return but descriptor declares {declared}")]
    ReturnKindMismatch { requested: FfiType, declared: FfiType },
}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
