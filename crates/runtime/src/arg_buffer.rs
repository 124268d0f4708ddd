//! Argument marshaling buffer
//!
//! An [`FfiArgBuffer`] owns one [`MemoryStack`] frame for its lifetime.
//! Entries are written back to back with no padding, starting at a 16-byte
//! aligned base; each entry is described by an [`ArgTag`].
//!
//! ```text
//! base
//!  |  i32  | f64          | u8 | [i16; 3]        |
//!  0       4              12   13                19
//! ```

use std::any::{Any, TypeId};
use std::ffi::c_void;

use crate::error::{RuntimeError, RuntimeResult};
use crate::ffi::FfiType;
use crate::memory::Allocator;
use crate::stack::{MemoryStack, StackScope};
use crate::value::{NativeChar, NativeFloat, NativeValue, Primitive};

/// Alignment of the first entry
pub const BUFFER_ALIGNMENT: usize = 16;

/// Kind and element count of one buffer entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgTag {
    pub kind: FfiType,
    /// Greater than one only for arrays
    pub count: usize,
}

impl ArgTag {
    pub fn scalar(kind: FfiType) -> Self {
        Self { kind, count: 1 }
    }

    /// Bytes occupied by the entry
    pub fn size(&self) -> usize {
        self.kind.size() * self.count
    }
}

/// Frame-scoped, type-tagged argument buffer
pub struct FfiArgBuffer<'s> {
    scope: StackScope<'s>,
    base: *mut u8,
    tags: Vec<ArgTag>,
    size: usize,
    read_index: usize,
    read_offset: usize,
}

impl<'s> FfiArgBuffer<'s> {
    /// Open a frame on `stack` and start an empty buffer in it
    pub fn acquire(stack: &'s MemoryStack) -> Self {
        let scope = stack.scope();
        let base = stack.allocate(0, BUFFER_ALIGNMENT);
        Self {
            scope,
            base,
            tags: Vec::new(),
            size: 0,
            read_index: 0,
            read_offset: 0,
        }
    }

    /// Run `f` with a buffer on the calling thread's stack
    pub fn with<R>(f: impl FnOnce(&mut FfiArgBuffer<'_>) -> R) -> R {
        MemoryStack::with_current(|stack| {
            let mut buffer = FfiArgBuffer::acquire(stack);
            f(&mut buffer)
        })
    }

    pub fn base_address(&self) -> *mut u8 {
        self.base
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size
    }

    pub fn tags(&self) -> &[ArgTag] {
        &self.tags
    }

    /// Address of entry `index`: the base plus the sizes of all earlier entries
    ///
    /// # Panics
    /// Panics if `index > len()`.
    pub fn address(&self, index: usize) -> *mut u8 {
        assert!(
            index <= self.tags.len(),
            "argument index {} out of range for {} entries",
            index,
            self.tags.len()
        );
        let offset: usize = self.tags[..index].iter().map(ArgTag::size).sum();
        // SAFETY: offset lies within the bytes reserved for this buffer
        unsafe { self.base.add(offset) }
    }

    /// Reserve the next `size` bytes of the frame
    fn reserve(&mut self, tag: ArgTag) -> *mut u8 {
        assert!(
            self.scope.is_innermost(),
            "argument buffer written while a nested stack frame is open"
        );
        let size = tag.size();
        let address = self.scope.stack().allocate(size, 1);
        debug_assert_eq!(address as usize, self.base as usize + self.size);
        self.tags.push(tag);
        self.size += size;
        address
    }

    pub fn put<T: Primitive>(&mut self, value: T) {
        let address = self.reserve(ArgTag::scalar(T::KIND));
        // SAFETY: reserve returned T::KIND.size() writable bytes
        unsafe { value.write_raw(address) };
    }

    /// Write all of `values` as one entry
    pub fn put_array<T: Primitive>(&mut self, values: &[T]) {
        let address = self.reserve(ArgTag {
            kind: T::KIND,
            count: values.len(),
        });
        let size = T::KIND.size();
        for (i, value) in values.iter().enumerate() {
            // SAFETY: the entry spans values.len() elements
            unsafe { value.write_raw(address.add(i * size)) };
        }
    }

    /// Write a dynamically typed scalar
    pub fn put_value(&mut self, value: NativeValue) -> RuntimeResult<()> {
        if value.kind() == FfiType::Void {
            return Err(RuntimeError::UnsupportedValue {
                index: self.len(),
                type_name: "void".to_string(),
            });
        }
        let address = self.reserve(ArgTag::scalar(value.kind()));
        // SAFETY: reserve returned kind.size() writable bytes
        unsafe { value.write_raw(address) };
        Ok(())
    }

    /// Copy one native value of `kind` from `src`
    ///
    /// # Safety
    /// `src` must be valid for reads of `kind.size()` bytes.
    pub(crate) unsafe fn put_raw(&mut self, kind: FfiType, src: *const u8) {
        let address = self.reserve(ArgTag::scalar(kind));
        std::ptr::copy_nonoverlapping(src, address, kind.size());
    }

    /// Write heterogeneous values, dispatching on their runtime type
    ///
    /// Accepts the primitive scalars, raw pointers, [`NativeValue`], and
    /// `Vec`s or boxed slices of scalars. Values are checked before anything
    /// is written, so a failure leaves the buffer unchanged.
    pub fn put_all(&mut self, values: &[&dyn Any]) -> RuntimeResult<()> {
        let entries = values
            .iter()
            .enumerate()
            .map(|(index, value)| classify(index, *value))
            .collect::<RuntimeResult<Vec<_>>>()?;

        for entry in entries {
            match entry {
                Classified::Scalar(value) => self.put_value(value)?,
                Classified::Array { kind, bytes, count } => {
                    let address = self.reserve(ArgTag { kind, count });
                    // SAFETY: reserve returned bytes.len() writable bytes
                    unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), address, bytes.len()) };
                }
            }
        }
        Ok(())
    }

    /// Reset the read cursor to the first entry
    pub fn rewind(&mut self) {
        self.read_index = 0;
        self.read_offset = 0;
    }

    fn next_entry(&mut self, expected: FfiType) -> (ArgTag, *const u8) {
        let tag = *self
            .tags
            .get(self.read_index)
            .unwrap_or_else(|| panic!("read past the last of {} arguments", self.tags.len()));
        assert_eq!(
            tag.kind, expected,
            "argument {} is {} but {} was read",
            self.read_index, tag.kind, expected
        );
        // SAFETY: read_offset is the prefix sum of the entries already read
        let address = unsafe { self.base.add(self.read_offset) } as *const u8;
        self.read_index += 1;
        self.read_offset += tag.size();
        (tag, address)
    }

    /// Read the next entry as a scalar
    ///
    /// # Panics
    /// Panics when no entry is left or its kind is not `T`'s.
    pub fn get<T: Primitive>(&mut self) -> T {
        let (tag, address) = self.next_entry(T::KIND);
        assert_eq!(tag.count, 1, "argument {} is an array", self.read_index - 1);
        // SAFETY: the entry holds one T
        unsafe { T::read_raw(address) }
    }

    /// Read the next entry as an array
    pub fn get_array<T: Primitive>(&mut self) -> Vec<T> {
        let (tag, address) = self.next_entry(T::KIND);
        let size = T::KIND.size();
        // SAFETY: the entry holds tag.count elements of T
        (0..tag.count)
            .map(|i| unsafe { T::read_raw(address.add(i * size)) })
            .collect()
    }

    /// Read scalar entry `index` without moving the cursor
    pub fn get_value(&self, index: usize) -> Option<NativeValue> {
        let tag = self.tags.get(index)?;
        if tag.count != 1 {
            return None;
        }
        // SAFETY: address(index) points at one value of tag.kind
        Some(unsafe { NativeValue::read_raw(tag.kind, self.address(index)) })
    }

    /// Pointers to each entry, in order, as a native argument vector
    pub(crate) fn argument_pointers(&self) -> Vec<*mut c_void> {
        let mut offset = 0;
        self.tags
            .iter()
            .map(|tag| {
                // SAFETY: offset stays within the buffer
                let address = unsafe { self.base.add(offset) } as *mut c_void;
                offset += tag.size();
                address
            })
            .collect()
    }
}

macro_rules! typed_accessors {
    ($($put:ident, $get:ident => $ty:ty;)*) => {
        impl FfiArgBuffer<'_> {
            $(
                #[inline]
                pub fn $put(&mut self, value: $ty) {
                    self.put::<$ty>(value)
                }

                #[inline]
                pub fn $get(&mut self) -> $ty {
                    self.get::<$ty>()
                }
            )*
        }
    };
}

typed_accessors! {
    put_i8, get_i8 => i8;
    put_i16, get_i16 => i16;
    put_i32, get_i32 => i32;
    put_i64, get_i64 => i64;
    put_isize, get_isize => isize;
    put_u8, get_u8 => u8;
    put_u16, get_u16 => u16;
    put_u32, get_u32 => u32;
    put_u64, get_u64 => u64;
    put_usize, get_usize => usize;
    put_f32, get_f32 => f32;
    put_f64, get_f64 => f64;
    put_native_float, get_native_float => NativeFloat;
    put_bool, get_bool => bool;
    put_char, get_char => NativeChar;
    put_pointer, get_pointer => *mut c_void;
}

/// A `put_all` input after its type has been recognized
enum Classified {
    Scalar(NativeValue),
    Array { kind: FfiType, bytes: Vec<u8>, count: usize },
}

fn array_bytes<T: Primitive>(values: &[T]) -> Classified {
    let size = T::KIND.size();
    let mut bytes = vec![0u8; size * values.len()];
    for (i, value) in values.iter().enumerate() {
        // SAFETY: bytes holds values.len() elements of T
        unsafe { value.write_raw(bytes.as_mut_ptr().add(i * size)) };
    }
    Classified::Array {
        kind: T::KIND,
        bytes,
        count: values.len(),
    }
}

fn classify(index: usize, value: &dyn Any) -> RuntimeResult<Classified> {
    macro_rules! try_types {
        ($($ty:ty),*) => {
            $(
                if let Some(v) = value.downcast_ref::<$ty>() {
                    return Ok(Classified::Scalar(v.into_value()));
                }
                if let Some(v) = value.downcast_ref::<Vec<$ty>>() {
                    return Ok(array_bytes(v));
                }
                if let Some(v) = value.downcast_ref::<Box<[$ty]>>() {
                    return Ok(array_bytes(v));
                }
            )*
        };
    }

    try_types!(
        i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, NativeFloat, bool, NativeChar,
        *mut c_void, *const c_void
    );

    if let Some(v) = value.downcast_ref::<NativeValue>() {
        if v.kind() == FfiType::Void {
            return Err(RuntimeError::UnsupportedValue {
                index,
                type_name: "void".to_string(),
            });
        }
        return Ok(Classified::Scalar(*v));
    }
    if let Some(v) = value.downcast_ref::<*mut u8>() {
        return Ok(Classified::Scalar(NativeValue::Pointer(*v as *mut c_void)));
    }
    if let Some(v) = value.downcast_ref::<*const u8>() {
        return Ok(Classified::Scalar(NativeValue::Pointer(*v as *mut c_void)));
    }

    Err(RuntimeError::UnsupportedValue {
        index,
        type_name: describe(value),
    })
}

/// Best-effort name of a value's type for error messages
fn describe(value: &dyn Any) -> String {
    let id = value.type_id();
    if id == TypeId::of::<String>() {
        "String".to_string()
    } else if id == TypeId::of::<&str>() {
        "&str".to_string()
    } else if id == TypeId::of::<char>() {
        "char".to_string()
    } else if id == TypeId::of::<i128>() || id == TypeId::of::<u128>() {
        "128-bit integer".to_string()
    } else if id == TypeId::of::<()>() {
        "()".to_string()
    } else {
        format!("{:?}", id)
    }
}
