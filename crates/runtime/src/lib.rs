//! # cinterop native call runtime
//!
//! Turns typed values into native calls and back.
//!
//! - [`MemoryStack`]: per-thread bump allocator with frame checkpoints
//! - [`FfiArgBuffer`]: packed, type-tagged argument buffer living in one stack frame
//! - [`Ffi`]: downcalls through libffi and upcall trampolines for callbacks
//! - [`SharedLibrary`]: cached dynamic library loading and symbol lookup
//!
//! ## Example
//!
//! ```rust,no_run
//! use cinterop_runtime::{CallingConvention, Ffi, FfiDescriptor, FfiType, LinkMode, SharedLibrary};
//!
//! # fn main() -> Result<(), cinterop_runtime::RuntimeError> {
//! let libm = SharedLibrary::open(&["libm.so.6", "libm.dylib"], LinkMode::Lazy, true)?;
//! let cos = libm.get_function_address("cos")?;
//! let descriptor = FfiDescriptor::new(FfiType::F64, vec![FfiType::F64]);
//!
//! let one = unsafe {
//!     Ffi::invoke_f64(cos, &descriptor, CallingConvention::Default, |args| {
//!         args.put_f64(0.0);
//!         Ok(())
//!     })?
//! };
//! assert_eq!(one, 1.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! The crate logs through the `log` facade and installs no logger.

pub mod arg_buffer;
pub mod config;
pub mod error;
pub mod ffi;
pub mod library;
pub mod memory;
pub mod shutdown;
pub mod stack;
pub mod value;

pub use arg_buffer::{ArgTag, FfiArgBuffer, BUFFER_ALIGNMENT};
pub use config::RuntimeConfig;
pub use error::{RuntimeError, RuntimeResult};
pub use ffi::{CallingConvention, Ffi, FfiDescriptor, FfiType, UpcallStub};
pub use library::{c_runtime_names, LinkMode, SharedLibrary};
pub use memory::{align, Allocator, Memory, NativeMemory};
pub use shutdown::{
    pending_shutdown_hooks, register_shutdown_hook, run_shutdown_hooks, unregister_shutdown_hook, HookId,
};
pub use stack::{MemoryStack, StackScope};
pub use value::{NativeChar, NativeFloat, NativeValue, Primitive};
