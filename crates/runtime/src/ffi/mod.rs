//! Native call dispatch
//!
//! Downcalls take a function address, an [`FfiDescriptor`] and a filled
//! [`FfiArgBuffer`]; the buffer's entries are passed by pointer to libffi and
//! the raw return bits are decoded into the requested kind. Call interfaces
//! are built once per descriptor and cached per thread.
//!
//! Upcalls go the other way: [`Ffi::create_upcall_stub`] wraps a closure in a
//! libffi trampoline that native code can call through a plain C function
//! pointer.

mod descriptor;
mod types;
mod upcall;

pub use descriptor::{CallingConvention, FfiDescriptor};
pub use types::FfiType;
pub use upcall::UpcallStub;

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::rc::Rc;

use libffi::middle::{Cif, CodePtr};
use libffi::raw;

use crate::arg_buffer::FfiArgBuffer;
use crate::error::{RuntimeError, RuntimeResult};
use crate::value::{NativeChar, NativeFloat, NativeValue, Primitive};

type CifKey = (FfiDescriptor, CallingConvention);

thread_local! {
    // Rc so a callback re-entering the dispatcher can borrow the cache again
    static CIF_CACHE: RefCell<HashMap<CifKey, Rc<Cif>>> = RefCell::new(HashMap::new());
}

pub(crate) fn build_cif(descriptor: &FfiDescriptor, convention: CallingConvention) -> Cif {
    let mut cif = Cif::new(
        descriptor.parameter_types.iter().map(|kind| kind.to_libffi()),
        descriptor.return_type.to_libffi(),
    );
    cif.set_abi(convention.abi());
    cif
}

fn cached_cif(descriptor: &FfiDescriptor, convention: CallingConvention) -> Rc<Cif> {
    CIF_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if let Some(cif) = cache.get(&(descriptor.clone(), convention)) {
            return Rc::clone(cif);
        }
        log::debug!("Building call interface for {}", descriptor);
        let cif = Rc::new(build_cif(descriptor, convention));
        cache.insert((descriptor.clone(), convention), Rc::clone(&cif));
        cif
    })
}

/// Storage for a raw return value; wide enough for any scalar kind
#[repr(C, align(16))]
struct ReturnSlot([u8; 16]);

impl ReturnSlot {
    fn new() -> Self {
        ReturnSlot([0; 16])
    }

    fn as_mut_ptr(&mut self) -> *mut c_void {
        self.0.as_mut_ptr() as *mut c_void
    }

    /// Interpret the slot as a value of `kind`
    ///
    /// libffi widens integral returns narrower than a register to `ffi_arg`.
    fn decode(&self, kind: FfiType) -> NativeValue {
        let ptr = self.0.as_ptr();
        if kind.is_widened_return() {
            // SAFETY: the slot is aligned and large enough for ffi_arg
            let raw = unsafe { std::ptr::read(ptr as *const raw::ffi_arg) };
            return match kind {
                FfiType::I8 => NativeValue::I8(raw as i8),
                FfiType::I16 => NativeValue::I16(raw as i16),
                FfiType::I32 => NativeValue::I32(raw as i32),
                FfiType::U8 => NativeValue::U8(raw as u8),
                FfiType::U16 => NativeValue::U16(raw as u16),
                FfiType::U32 => NativeValue::U32(raw as u32),
                FfiType::Bool => NativeValue::Bool(raw as u8 != 0),
                _ => NativeValue::Char(NativeChar(raw as u16)),
            };
        }
        // SAFETY: the slot holds at least kind.size() initialized bytes
        unsafe { NativeValue::read_raw(kind, ptr) }
    }
}

/// Native call entry points
pub struct Ffi;

impl Ffi {
    fn check_signature(descriptor: &FfiDescriptor, buffer: &FfiArgBuffer<'_>) -> RuntimeResult<()> {
        let tags = buffer.tags();
        if tags.len() != descriptor.parameter_types.len() {
            return Err(RuntimeError::SignatureMismatch(format!(
                "{} arguments supplied for {}",
                tags.len(),
                descriptor
            )));
        }
        for (index, (tag, expected)) in tags.iter().zip(&descriptor.parameter_types).enumerate() {
            if tag.count != 1 {
                return Err(RuntimeError::SignatureMismatch(format!(
                    "argument {} is an array of {} {} values; pass arrays by pointer",
                    index, tag.count, tag.kind
                )));
            }
            if tag.kind != *expected {
                return Err(RuntimeError::SignatureMismatch(format!(
                    "argument {} is {} but {} expects {}",
                    index, tag.kind, descriptor, expected
                )));
            }
        }
        Ok(())
    }

    /// Call `address` and return its result as a [`NativeValue`]
    ///
    /// # Safety
    /// `address` must be a function whose C signature matches `descriptor`.
    pub unsafe fn call_value(
        address: *const c_void,
        descriptor: &FfiDescriptor,
        convention: CallingConvention,
        buffer: &FfiArgBuffer<'_>,
    ) -> RuntimeResult<NativeValue> {
        assert!(!address.is_null(), "native call through a null function address");
        Self::check_signature(descriptor, buffer)?;

        let cif = cached_cif(descriptor, convention);
        let code = CodePtr(address as *mut c_void);
        let mut arguments = buffer.argument_pointers();
        let mut slot = ReturnSlot::new();

        raw::ffi_call(
            cif.as_raw_ptr(),
            Some(*code.as_safe_fun()),
            slot.as_mut_ptr(),
            arguments.as_mut_ptr(),
        );

        Ok(slot.decode(descriptor.return_type))
    }

    /// Call `address`, requiring the descriptor to return `T`
    ///
    /// # Safety
    /// `address` must be a function whose C signature matches `descriptor`.
    pub unsafe fn call<T: Primitive>(
        address: *const c_void,
        descriptor: &FfiDescriptor,
        convention: CallingConvention,
        buffer: &FfiArgBuffer<'_>,
    ) -> RuntimeResult<T> {
        let mismatch = || RuntimeError::ReturnKindMismatch {
            requested: T::KIND,
            declared: descriptor.return_type,
        };
        if descriptor.return_type != T::KIND {
            return Err(mismatch());
        }
        let value = Self::call_value(address, descriptor, convention, buffer)?;
        T::from_value(value).ok_or_else(mismatch)
    }

    /// Fill a fresh buffer with `populate`, call, and release the buffer
    ///
    /// # Safety
    /// `address` must be a function whose C signature matches `descriptor`.
    pub unsafe fn invoke<T, F>(
        address: *const c_void,
        descriptor: &FfiDescriptor,
        convention: CallingConvention,
        populate: F,
    ) -> RuntimeResult<T>
    where
        T: Primitive,
        F: FnOnce(&mut FfiArgBuffer<'_>) -> RuntimeResult<()>,
    {
        FfiArgBuffer::with(|buffer| {
            populate(buffer)?;
            Self::call::<T>(address, descriptor, convention, buffer)
        })
    }

    /// Like [`invoke`](Self::invoke) for any return kind
    ///
    /// # Safety
    /// `address` must be a function whose C signature matches `descriptor`.
    pub unsafe fn invoke_value<F>(
        address: *const c_void,
        descriptor: &FfiDescriptor,
        convention: CallingConvention,
        populate: F,
    ) -> RuntimeResult<NativeValue>
    where
        F: FnOnce(&mut FfiArgBuffer<'_>) -> RuntimeResult<()>,
    {
        FfiArgBuffer::with(|buffer| {
            populate(buffer)?;
            Self::call_value(address, descriptor, convention, buffer)
        })
    }

    /// Wrap `callback` in a native-callable trampoline
    pub fn create_upcall_stub<F>(descriptor: FfiDescriptor, convention: CallingConvention, callback: F) -> UpcallStub
    where
        F: Fn(&mut FfiArgBuffer<'_>) -> NativeValue + Send + Sync + 'static,
    {
        UpcallStub::new(descriptor, convention, Box::new(callback))
    }
}

macro_rules! typed_calls {
    ($($call:ident, $invoke:ident => $ty:ty;)*) => {
        impl Ffi {
            $(
                /// # Safety
                /// `address` must be a function whose C signature matches `descriptor`.
                pub unsafe fn $call(
                    address: *const c_void,
                    descriptor: &FfiDescriptor,
                    convention: CallingConvention,
                    buffer: &FfiArgBuffer<'_>,
                ) -> RuntimeResult<$ty> {
                    Self::call::<$ty>(address, descriptor, convention, buffer)
                }

                /// # Safety
                /// `address` must be a function whose C signature matches `descriptor`.
                pub unsafe fn $invoke<F>(
                    address: *const c_void,
                    descriptor: &FfiDescriptor,
                    convention: CallingConvention,
                    populate: F,
                ) -> RuntimeResult<$ty>
                where
                    F: FnOnce(&mut FfiArgBuffer<'_>) -> RuntimeResult<()>,
                {
                    Self::invoke::<$ty, F>(address, descriptor, convention, populate)
                }
            )*
        }
    };
}

typed_calls! {
    call_void, invoke_void => ();
    call_i8, invoke_i8 => i8;
    call_i16, invoke_i16 => i16;
    call_i32, invoke_i32 => i32;
    call_i64, invoke_i64 => i64;
    call_isize, invoke_isize => isize;
    call_u8, invoke_u8 => u8;
    call_u16, invoke_u16 => u16;
    call_u32, invoke_u32 => u32;
    call_u64, invoke_u64 => u64;
    call_usize, invoke_usize => usize;
    call_f32, invoke_f32 => f32;
    call_f64, invoke_f64 => f64;
    call_native_float, invoke_native_float => NativeFloat;
    call_bool, invoke_bool => bool;
    call_char, invoke_char => NativeChar;
    call_pointer, invoke_pointer => *mut c_void;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::MemoryStack;

    extern "C" fn negate(x: i32) -> i32 {
        -x
    }

    extern "C" fn is_even(x: u16) -> bool {
        x % 2 == 0
    }

    extern "C" fn mix(a: i8, b: f64, c: u64) -> f64 {
        a as f64 + b + c as f64
    }

    extern "C" fn narrow(x: i64) -> i8 {
        x as i8
    }

    #[test]
    fn test_call_rust_function() {
        let descriptor = FfiDescriptor::new(FfiType::I32, vec![FfiType::I32]);
        let stack = MemoryStack::new(256);
        let mut buffer = FfiArgBuffer::acquire(&stack);
        buffer.put_i32(41);
        let result =
            unsafe { Ffi::call_i32(negate as *const c_void, &descriptor, CallingConvention::Default, &buffer) };
        assert_eq!(result.unwrap(), -41);
    }

    #[test]
    fn test_widened_returns() {
        let descriptor = FfiDescriptor::new(FfiType::Bool, vec![FfiType::U16]);
        let even = unsafe {
            Ffi::invoke_bool(is_even as *const c_void, &descriptor, CallingConvention::Default, |buffer| {
                buffer.put_u16(10);
                Ok(())
            })
        };
        assert!(even.unwrap());

        let descriptor = FfiDescriptor::new(FfiType::I8, vec![FfiType::I64]);
        let value = unsafe {
            Ffi::invoke_value(narrow as *const c_void, &descriptor, CallingConvention::Cdecl, |buffer| {
                buffer.put_i64(-1 - 256);
                Ok(())
            })
        };
        assert_eq!(value.unwrap(), NativeValue::I8(-1));
    }

    #[test]
    fn test_unaligned_packed_arguments() {
        let descriptor = FfiDescriptor::new(FfiType::F64, vec![FfiType::I8, FfiType::F64, FfiType::U64]);
        let result = unsafe {
            Ffi::invoke_f64(mix as *const c_void, &descriptor, CallingConvention::Default, |buffer| {
                buffer.put_all(&[&1i8, &0.5f64, &2u64])
            })
        };
        assert_eq!(result.unwrap(), 3.5);
    }

    #[test]
    fn test_signature_checks() {
        let descriptor = FfiDescriptor::new(FfiType::I32, vec![FfiType::I32]);
        let address = negate as *const c_void;

        let err = unsafe {
            Ffi::invoke_i32(address, &descriptor, CallingConvention::Default, |buffer| {
                buffer.put_i64(1);
                Ok(())
            })
        };
        assert!(matches!(err, Err(RuntimeError::SignatureMismatch(_))));

        let err = unsafe { Ffi::invoke_i32(address, &descriptor, CallingConvention::Default, |_| Ok(())) };
        assert!(matches!(err, Err(RuntimeError::SignatureMismatch(_))));

        let err = unsafe {
            Ffi::invoke_i64(address, &descriptor, CallingConvention::Default, |buffer| {
                buffer.put_i32(1);
                Ok(())
            })
        };
        assert!(matches!(
            err,
            Err(RuntimeError::ReturnKindMismatch {
                requested: FfiType::I64,
                declared: FfiType::I32
            })
        ));
    }

    #[test]
    fn test_failed_population_releases_frame() {
        let depth = MemoryStack::with_current(|stack| stack.depth());
        let descriptor = FfiDescriptor::new(FfiType::Void, vec![]);
        let result = unsafe {
            Ffi::invoke_void(negate as *const c_void, &descriptor, CallingConvention::Default, |buffer| {
                buffer.put_value(NativeValue::Void)
            })
        };
        assert!(result.is_err());
        assert_eq!(MemoryStack::with_current(|stack| stack.depth()), depth);
    }

    #[test]
    fn test_cif_cache_reuses_interfaces() {
        let descriptor = FfiDescriptor::new(FfiType::I32, vec![FfiType::I32, FfiType::I32]);
        let a = cached_cif(&descriptor, CallingConvention::Default);
        let b = cached_cif(&descriptor, CallingConvention::Default);
        assert!(Rc::ptr_eq(&a, &b));
    }
}
