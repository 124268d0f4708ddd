//! Error types for decoding, demangling and name validation

use thiserror::Error;

/// Errors raised while validating a [`SymbolName`](crate::SymbolName)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// The short name is not the trailing segment of the full name
    #[error("short name '{short_name}' is not the last segment of '{full_name}'")]
    SuffixMismatch {
        full_name: String,
        short_name: String,
    },

    /// A mangled name has no `_` separating the package from the short name
    #[error("mangled name '{0}' has no package separator")]
    MissingSeparator(String),

    /// A mangled name has an empty short name
    #[error("mangled name '{0}' has an empty short name")]
    EmptyShortName(String),
}

/// Errors raised while decoding the binary format
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The buffer ended before a complete value was read
    #[error("unexpected end of input at offset {offset}: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    /// A variant decoder found a different kind tag than it expects
    #[error("kind tag mismatch for {what} at offset {offset}: expected {expected}, found {found}")]
    TagMismatch {
        what: &'static str,
        offset: usize,
        expected: u8,
        found: u8,
    },

    /// A kind tag that no variant uses
    #[error("unknown {what} kind tag {tag} at offset {offset}")]
    UnknownTag {
        what: &'static str,
        offset: usize,
        tag: u8,
    },

    /// Builtin ordinal outside the 17-entry enumeration
    #[error("invalid builtin ordinal {ordinal} at offset {offset}")]
    InvalidBuiltin { offset: usize, ordinal: u8 },

    /// Presence flag other than 0 or 1
    #[error("invalid presence flag {flag} at offset {offset}")]
    InvalidFlag { offset: usize, flag: u8 },

    /// String payload is not valid UTF-8
    #[error("invalid UTF-8 in string at offset {offset}: {source}")]
    InvalidUtf8 {
        offset: usize,
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// Decoded symbol name violates the name invariant
    #[error("invalid symbol name: {0}")]
    InvalidName(#[from] NameError),

    /// Types nested deeper than the decoder accepts
    #[error("type nesting exceeds {} levels at offset {offset}", crate::codec::MAX_NESTING)]
    NestingTooDeep { offset: usize },

    /// Array or struct whose byte size does not fit in `usize`
    #[error("type at offset {offset} is larger than the address space")]
    SizeOverflow { offset: usize },

    /// Array type with a zero element count
    #[error("array type with zero dimensions at offset {offset}")]
    ZeroDimensions { offset: usize },

    /// Bytes left over after a complete top-level value
    #[error("{0} trailing bytes after decoded value")]
    TrailingBytes(usize),

    /// The decompressor rejected the payload
    #[error("decompression failed: {0}")]
    Decompress(#[from] std::io::Error),
}

/// Errors raised while demangling a type name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DemangleError {
    /// Input ended in the middle of a type
    #[error("unexpected end of mangled name '{input}'")]
    UnexpectedEnd { input: String },

    /// Character that cannot start or continue the current production
    #[error("unexpected '{found}' at offset {offset} in mangled name '{input}'")]
    UnexpectedChar {
        input: String,
        offset: usize,
        found: char,
    },

    /// The field resolver has no layout for a struct
    #[error("no field layout known for struct '{0}'")]
    UnresolvedStruct(String),

    /// Embedded name could not be reconstructed
    #[error("invalid name in mangled form: {0}")]
    InvalidName(#[from] NameError),

    /// Types nested deeper than the demangler accepts
    #[error("type nesting exceeds {} levels at offset {offset} in mangled name '{input}'", crate::codec::MAX_NESTING)]
    NestingTooDeep { input: String, offset: usize },

    /// A complete type was parsed but input remains
    #[error("trailing input at offset {offset} in mangled name '{input}'")]
    TrailingInput { input: String, offset: usize },
}

/// Result type for decoding operations
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Result type for demangling operations
pub type DemangleResult<T> = Result<T, DemangleError>;
