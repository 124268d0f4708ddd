//! # cinterop ABI encoding layer
//!
//! Describes native (C-ABI) types and the symbols that use them in a form that
//! independently compiled modules can exchange and agree on.
//!
//! ## Features
//!
//! - **Type model**: builtin, array, struct, reference and generic-application
//!   (`Cone`) shapes with derived size and alignment
//! - **Symbol model**: functions, classes and structs with source locations,
//!   collected into a [`SymbolTable`]
//! - **Binary format**: compact, self-describing, big-endian encoding with an
//!   optional DEFLATE pass over whole payloads
//! - **Mangling**: a deterministic string grammar used as the cross-module
//!   lookup key for types and function signatures
//!
//! ## Quick Start
//!
//! ```rust
//! use cinterop_abi::{Decode, Encode, Mangle, SymbolName, Type};
//!
//! let woof = Type::reference(SymbolName::new("dog.Woof", "Woof").unwrap());
//! assert_eq!(woof.mangled_name(), "C$dog_Woof$C");
//!
//! let bytes = woof.to_bytes();
//! assert_eq!(Type::from_bytes(&bytes).unwrap(), woof);
//! ```
//!
//! ## Binary Layout
//!
//! Every value starts with a one-byte kind tag:
//!
//! ```text
//! Type:   Builtin=0 Array=1 Struct=2 Reference=3 Cone=4
//! Symbol: Function=0 Class=1 Struct=2
//! ```
//!
//! Lists are a `u32` count followed by the elements, optionals a presence byte
//! followed by the payload, strings a `u32` byte length followed by UTF-8.

pub mod codec;
pub mod error;
pub mod mangle;
pub mod name;
pub mod symbol;
pub mod types;

pub use codec::{ByteReader, ByteWriter, Compressor, Decode, DeflateCompressor, Encode, MAX_NESTING};
pub use error::{DecodeError, DemangleError, NameError};
pub use mangle::{demangle, demangle_list, mangle_list, mangle_signature, Mangle};
pub use name::SymbolName;
pub use symbol::{FunctionSignature, Symbol, SymbolId, SymbolInfo, SymbolKind, SymbolTable};
pub use types::{BuiltinKind, Type, TypeArgument, POINTER_SIZE};
