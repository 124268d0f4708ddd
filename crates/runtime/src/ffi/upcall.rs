//! Native-to-Rust callbacks

use std::ffi::c_void;
use std::fmt;
use std::mem::ManuallyDrop;
use std::panic::{self, AssertUnwindSafe};

use libffi::middle::Closure;
use libffi::raw;

use super::{build_cif, CallingConvention, FfiDescriptor, FfiType};
use crate::arg_buffer::FfiArgBuffer;
use crate::stack::MemoryStack;
use crate::value::NativeValue;

type UpcallFn = dyn Fn(&mut FfiArgBuffer<'_>) -> NativeValue + Send + Sync + 'static;

struct UpcallState {
    descriptor: FfiDescriptor,
    callback: Box<UpcallFn>,
}

/// Owner of a libffi closure that forwards native calls to a Rust callback
///
/// The function pointer from [`code_ptr`](Self::code_ptr) is valid until the
/// stub is dropped.
pub struct UpcallStub {
    closure: ManuallyDrop<Closure<'static>>,
    state: *mut UpcallState,
}

impl UpcallStub {
    pub(super) fn new(descriptor: FfiDescriptor, convention: CallingConvention, callback: Box<UpcallFn>) -> Self {
        let cif = build_cif(&descriptor, convention);
        let state = Box::into_raw(Box::new(UpcallState { descriptor, callback }));
        // SAFETY: state stays allocated until after the closure is dropped
        let userdata: &'static UpcallState = unsafe { &*state };
        let closure = Closure::new(cif, upcall_entry, userdata);
        log::debug!("Created upcall stub for {}", userdata.descriptor);
        Self {
            closure: ManuallyDrop::new(closure),
            state,
        }
    }

    /// C function pointer invoking the callback
    pub fn code_ptr(&self) -> *const c_void {
        *self.closure.code_ptr() as *const c_void
    }

    pub fn descriptor(&self) -> &FfiDescriptor {
        // SAFETY: state is live for the stub's lifetime
        unsafe { &(*self.state).descriptor }
    }
}

impl fmt::Debug for UpcallStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpcallStub")
            .field("descriptor", self.descriptor())
            .field("code_ptr", &self.code_ptr())
            .finish()
    }
}

impl Drop for UpcallStub {
    fn drop(&mut self) {
        // SAFETY: the closure borrows state, so it goes first
        unsafe {
            ManuallyDrop::drop(&mut self.closure);
            drop(Box::from_raw(self.state));
        }
    }
}

unsafe extern "C" fn upcall_entry(
    _cif: &raw::ffi_cif,
    result: &mut raw::ffi_arg,
    args: *const *const c_void,
    state: &UpcallState,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        MemoryStack::with_current(|stack| {
            let mut buffer = FfiArgBuffer::acquire(stack);
            for (i, kind) in state.descriptor.parameter_types.iter().enumerate() {
                buffer.put_raw(*kind, *args.add(i) as *const u8);
            }
            (state.callback)(&mut buffer)
        })
    }));

    match outcome {
        Ok(value) => write_return(state.descriptor.return_type, value, result),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            log::error!(
                "Upcall for {} panicked: {}; aborting",
                state.descriptor,
                message
            );
            std::process::abort();
        }
    }
}

/// Store `value` where libffi expects a closure's return value
unsafe fn write_return(kind: FfiType, value: NativeValue, result: &mut raw::ffi_arg) {
    if kind == FfiType::Void {
        return;
    }
    let value = match value.cast(kind) {
        Some(value) => value,
        None => {
            log::error!("Upcall returned {:?} where {} was declared; returning zero", value, kind);
            *result = 0;
            return;
        }
    };

    // Narrow integral returns are widened to a full ffi_arg
    *result = match value {
        NativeValue::I8(v) => v as raw::ffi_arg,
        NativeValue::I16(v) => v as raw::ffi_arg,
        NativeValue::I32(v) => v as raw::ffi_arg,
        NativeValue::U8(v) => v as raw::ffi_arg,
        NativeValue::U16(v) => v as raw::ffi_arg,
        NativeValue::U32(v) => v as raw::ffi_arg,
        NativeValue::Bool(v) => v as raw::ffi_arg,
        NativeValue::Char(v) => v.0 as raw::ffi_arg,
        other => {
            other.write_raw(result as *mut raw::ffi_arg as *mut u8);
            return;
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::Ffi;

    #[test]
    fn test_upcall_through_downcall() {
        let descriptor = FfiDescriptor::new(FfiType::I32, vec![FfiType::I32, FfiType::I32]);
        let stub = Ffi::create_upcall_stub(descriptor.clone(), CallingConvention::Default, |buffer| {
            let a = buffer.get_i32();
            let b = buffer.get_i32();
            NativeValue::I32(a * b)
        });

        let result = unsafe {
            Ffi::invoke_i32(stub.code_ptr(), &descriptor, CallingConvention::Default, |buffer| {
                buffer.put_i32(6);
                buffer.put_i32(7);
                Ok(())
            })
        };
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_upcall_return_is_converted() {
        let descriptor = FfiDescriptor::new(FfiType::F64, vec![FfiType::U8]);
        let stub = Ffi::create_upcall_stub(descriptor.clone(), CallingConvention::Default, |buffer| {
            NativeValue::I32(buffer.get_u8() as i32 * 2)
        });
        let result = unsafe {
            Ffi::invoke_f64(stub.code_ptr(), &descriptor, CallingConvention::Default, |buffer| {
                buffer.put_u8(21);
                Ok(())
            })
        };
        assert_eq!(result.unwrap(), 42.0);
    }

    #[test]
    fn test_negative_narrow_return() {
        let descriptor = FfiDescriptor::new(FfiType::I16, vec![]);
        let stub = Ffi::create_upcall_stub(descriptor.clone(), CallingConvention::Default, |_| NativeValue::I16(-5));
        let result = unsafe { Ffi::invoke_i16(stub.code_ptr(), &descriptor, CallingConvention::Default, |_| Ok(())) };
        assert_eq!(result.unwrap(), -5);
    }

    #[test]
    fn test_mismatched_return_yields_zero() {
        let descriptor = FfiDescriptor::new(FfiType::Pointer, vec![]);
        let stub =
            Ffi::create_upcall_stub(descriptor.clone(), CallingConvention::Default, |_| NativeValue::F32(1.0));
        let result =
            unsafe { Ffi::invoke_pointer(stub.code_ptr(), &descriptor, CallingConvention::Default, |_| Ok(())) };
        assert!(result.unwrap().is_null());
        assert_eq!(stub.descriptor(), &descriptor);
    }
}
