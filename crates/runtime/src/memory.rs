//! Raw memory access
//!
//! [`Allocator`] is the allocation contract shared by the heap
//! ([`NativeMemory`]) and the per-thread arena
//! ([`MemoryStack`](crate::MemoryStack)). [`Memory`] layers typed reads and
//! writes and the C string/byte primitives on top; every method has a default
//! so implementors only provide allocation.

use std::alloc::{handle_alloc_error, Layout};
use std::cmp::Ordering;
use std::ffi::c_void;
use std::ptr;

use crate::value::Primitive;

/// Round `value` up to a multiple of `alignment` (a power of two)
#[inline]
pub const fn align(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Allocation contract
///
/// `allocate` never returns null: exhaustion ends the process through
/// [`handle_alloc_error`] (heap) or a panic (arena).
pub trait Allocator {
    fn allocate(&self, size: usize, alignment: usize) -> *mut u8;

    /// Resize a block, possibly moving it
    ///
    /// # Safety
    /// `address` must be null or a live block from this allocator.
    unsafe fn reallocate(&self, address: *mut u8, size: usize, alignment: usize) -> *mut u8;

    /// # Safety
    /// `address` must be null or a live block from this allocator.
    unsafe fn free(&self, address: *mut u8);
}

/// Typed access to raw memory
///
/// All reads and writes are unaligned-safe. Every method is `unsafe`: the
/// caller vouches that the addressed ranges are valid.
pub trait Memory: Allocator {
    /// # Safety
    /// `address` must be valid for `T::KIND.size()` bytes.
    #[inline]
    unsafe fn read<T: Primitive>(&self, address: *const u8) -> T {
        T::read_raw(address)
    }

    /// # Safety
    /// `address` must be valid for `T::KIND.size()` bytes.
    #[inline]
    unsafe fn write<T: Primitive>(&self, address: *mut u8, value: T) {
        value.write_raw(address)
    }

    /// Read `end - start` consecutive values into `array[start..end]`
    ///
    /// # Safety
    /// `address` must be valid for `(end - start) * T::KIND.size()` bytes.
    unsafe fn read_array<T: Primitive>(&self, address: *const u8, array: &mut [T], start: usize, end: usize) {
        let size = T::KIND.size();
        for (i, slot) in array[start..end].iter_mut().enumerate() {
            *slot = T::read_raw(address.add(i * size));
        }
    }

    /// Write `array[start..end]` as consecutive values
    ///
    /// # Safety
    /// `address` must be valid for `(end - start) * T::KIND.size()` bytes.
    unsafe fn write_array<T: Primitive>(&self, address: *mut u8, array: &[T], start: usize, end: usize) {
        let size = T::KIND.size();
        for (i, value) in array[start..end].iter().enumerate() {
            value.write_raw(address.add(i * size));
        }
    }

    /// Fill `size` bytes with `value`
    ///
    /// # Safety
    /// `address` must be valid for `size` bytes.
    unsafe fn set(&self, address: *mut u8, value: u8, size: usize) {
        ptr::write_bytes(address, value, size);
    }

    /// Copy between ranges that do not overlap
    ///
    /// # Safety
    /// Both ranges must be valid for `size` bytes and disjoint.
    unsafe fn copy(&self, dst: *mut u8, src: *const u8, size: usize) {
        ptr::copy_nonoverlapping(src, dst, size);
    }

    /// # Safety
    /// Both ranges must be valid for `size` bytes.
    unsafe fn copy_overlapping(&self, dst: *mut u8, src: *const u8, size: usize) {
        ptr::copy(src, dst, size);
    }

    /// Lexicographic byte comparison
    ///
    /// # Safety
    /// Both ranges must be valid for `size` bytes.
    unsafe fn compare(&self, a: *const u8, b: *const u8, size: usize) -> Ordering {
        libc::memcmp(a as *const c_void, b as *const c_void, size).cmp(&0)
    }

    /// Length of a NUL-terminated string
    ///
    /// # Safety
    /// `s` must point to a NUL-terminated string.
    unsafe fn strlen(&self, s: *const u8) -> usize {
        libc::strlen(s as *const libc::c_char)
    }

    /// Copy a NUL-terminated string including its terminator
    ///
    /// # Safety
    /// `dst` must hold `strlen(src) + 1` bytes and not overlap `src`.
    unsafe fn strcpy(&self, dst: *mut u8, src: *const u8) {
        libc::strcpy(dst as *mut libc::c_char, src as *const libc::c_char);
    }

    /// # Safety
    /// Both pointers must be NUL-terminated strings.
    unsafe fn strcmp(&self, a: *const u8, b: *const u8) -> Ordering {
        libc::strcmp(a as *const libc::c_char, b as *const libc::c_char).cmp(&0)
    }
}

/// Process heap through the C allocator
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeMemory;

#[cfg(windows)]
extern "C" {
    fn _aligned_malloc(size: usize, alignment: usize) -> *mut c_void;
    fn _aligned_realloc(address: *mut c_void, size: usize, alignment: usize) -> *mut c_void;
    fn _aligned_free(address: *mut c_void);
}

fn exhausted(size: usize, alignment: usize) -> ! {
    match Layout::from_size_align(size.max(1), alignment) {
        Ok(layout) => handle_alloc_error(layout),
        Err(_) => panic!("invalid allocation request: {} bytes aligned to {}", size, alignment),
    }
}

impl Allocator for NativeMemory {
    #[cfg(unix)]
    fn allocate(&self, size: usize, alignment: usize) -> *mut u8 {
        assert!(alignment.is_power_of_two(), "alignment {} is not a power of two", alignment);
        let mut address: *mut c_void = ptr::null_mut();
        let alignment = alignment.max(std::mem::size_of::<*const c_void>());
        // SAFETY: alignment is a power of two multiple of the pointer size
        let status = unsafe { libc::posix_memalign(&mut address, alignment, size.max(1)) };
        if status != 0 || address.is_null() {
            exhausted(size, alignment);
        }
        address as *mut u8
    }

    #[cfg(windows)]
    fn allocate(&self, size: usize, alignment: usize) -> *mut u8 {
        assert!(alignment.is_power_of_two(), "alignment {} is not a power of two", alignment);
        let address = unsafe { _aligned_malloc(size.max(1), alignment) };
        if address.is_null() {
            exhausted(size, alignment);
        }
        address as *mut u8
    }

    #[cfg(unix)]
    unsafe fn reallocate(&self, address: *mut u8, size: usize, alignment: usize) -> *mut u8 {
        if address.is_null() {
            return self.allocate(size, alignment);
        }
        let resized = libc::realloc(address as *mut c_void, size.max(1)) as *mut u8;
        if resized.is_null() {
            exhausted(size, alignment);
        }
        if resized as usize % alignment == 0 {
            return resized;
        }
        // realloc only guarantees malloc alignment
        let aligned = self.allocate(size, alignment);
        ptr::copy_nonoverlapping(resized, aligned, size);
        libc::free(resized as *mut c_void);
        aligned
    }

    #[cfg(windows)]
    unsafe fn reallocate(&self, address: *mut u8, size: usize, alignment: usize) -> *mut u8 {
        let resized = _aligned_realloc(address as *mut c_void, size.max(1), alignment);
        if resized.is_null() {
            exhausted(size, alignment);
        }
        resized as *mut u8
    }

    #[cfg(unix)]
    unsafe fn free(&self, address: *mut u8) {
        libc::free(address as *mut c_void);
    }

    #[cfg(windows)]
    unsafe fn free(&self, address: *mut u8) {
        _aligned_free(address as *mut c_void);
    }
}

impl Memory for NativeMemory {}
