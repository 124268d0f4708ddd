//! Per-thread bump allocator
//!
//! A [`MemoryStack`] hands out increasing addresses from one fixed extent.
//! Frames checkpoint the bump pointer: [`push`](MemoryStack::push) saves it
//! and [`pop`](MemoryStack::pop) rewinds to it, releasing everything
//! allocated in between at once.
//!
//! Each thread lazily gets its own stack through
//! [`MemoryStack::with_current`]. Its extent is released by whichever runs
//! first: the thread-local destructor or the process shutdown hooks.

use std::cell::{Cell, RefCell};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::memory::{align, Allocator, Memory, NativeMemory};
use crate::shutdown::{register_shutdown_hook, unregister_shutdown_hook, HookId};

/// Alignment of the extent itself
const EXTENT_ALIGNMENT: usize = 16;

/// Backing block, releasable from any thread exactly once
struct Extent {
    base: AtomicPtr<u8>,
}

impl Extent {
    fn is_live(&self) -> bool {
        !self.base.load(Ordering::Acquire).is_null()
    }

    fn release(&self) {
        let base = self.base.swap(ptr::null_mut(), Ordering::AcqRel);
        if !base.is_null() {
            // SAFETY: base came from NativeMemory and the swap hands it out once
            unsafe { NativeMemory.free(base) };
        }
    }
}

thread_local! {
    static CURRENT: MemoryStack = MemoryStack::for_current_thread();
}

/// Bump allocator with frame checkpoints
///
/// Not `Sync`: a stack belongs to the thread that uses it.
pub struct MemoryStack {
    extent: Arc<Extent>,
    base: usize,
    capacity: usize,
    top: Cell<usize>,
    frames: RefCell<Vec<usize>>,
    exit_hook: Option<HookId>,
}

impl MemoryStack {
    /// Create a stack with its own extent of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        let base = NativeMemory.allocate(capacity, EXTENT_ALIGNMENT);
        Self {
            extent: Arc::new(Extent {
                base: AtomicPtr::new(base),
            }),
            base: base as usize,
            capacity,
            top: Cell::new(base as usize),
            frames: RefCell::new(Vec::new()),
            exit_hook: None,
        }
    }

    fn for_current_thread() -> Self {
        let capacity = RuntimeConfig::global().stack_size;
        let mut stack = Self::new(capacity);
        let extent = Arc::clone(&stack.extent);
        stack.exit_hook = Some(register_shutdown_hook(move || extent.release()));
        log::debug!(
            "Created {} byte memory stack for thread {:?}",
            capacity,
            std::thread::current().id()
        );
        stack
    }

    /// Run `f` with the calling thread's stack
    ///
    /// # Panics
    /// Panics if called while the thread's locals are being destroyed.
    pub fn with_current<R>(f: impl FnOnce(&MemoryStack) -> R) -> R {
        CURRENT.with(f)
    }

    pub fn base_address(&self) -> *mut u8 {
        self.base as *mut u8
    }

    /// Current bump pointer
    pub fn frame_address(&self) -> *mut u8 {
        self.top.get() as *mut u8
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.top.get() - self.base
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.used()
    }

    /// Number of open frames
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Whether the backing extent is still allocated
    pub fn is_live(&self) -> bool {
        self.extent.is_live()
    }

    /// Save the bump pointer
    pub fn push(&self) {
        self.frames.borrow_mut().push(self.top.get());
    }

    /// Rewind to the most recent [`push`](Self::push)
    ///
    /// # Panics
    /// Panics if no frame is open.
    pub fn pop(&self) {
        let saved = self
            .frames
            .borrow_mut()
            .pop()
            .unwrap_or_else(|| panic!("MemoryStack::pop without a matching push"));
        self.top.set(saved);
    }

    /// Open a frame that is popped when the guard drops
    pub fn scope(&self) -> StackScope<'_> {
        self.push();
        StackScope {
            stack: self,
            depth: self.depth(),
        }
    }
}

impl Allocator for MemoryStack {
    /// # Panics
    /// Panics when the extent cannot hold the request or has been released.
    fn allocate(&self, size: usize, alignment: usize) -> *mut u8 {
        assert!(self.extent.is_live(), "MemoryStack used after its extent was released");
        assert!(alignment.is_power_of_two(), "alignment {} is not a power of two", alignment);

        let start = align(self.top.get(), alignment);
        let end = start.checked_add(size).unwrap_or(usize::MAX);
        let limit = self.base + self.capacity;
        if end > limit {
            panic!(
                "MemoryStack overflow: requested {} bytes aligned to {}, {} of {} bytes remaining",
                size,
                alignment,
                limit.saturating_sub(start.min(limit)),
                self.capacity
            );
        }
        self.top.set(end);
        start as *mut u8
    }

    /// Always moves: allocates fresh space and copies what fits
    unsafe fn reallocate(&self, address: *mut u8, size: usize, alignment: usize) -> *mut u8 {
        let available = self.top.get().saturating_sub(address as usize);
        let fresh = self.allocate(size, alignment);
        if !address.is_null() {
            ptr::copy_nonoverlapping(address, fresh, size.min(available));
        }
        fresh
    }

    /// Individual blocks are released by popping their frame
    unsafe fn free(&self, _address: *mut u8) {}
}

impl Memory for MemoryStack {}

impl Drop for MemoryStack {
    fn drop(&mut self) {
        if let Some(hook) = self.exit_hook.take() {
            unregister_shutdown_hook(hook);
        }
        self.extent.release();
    }
}

/// Frame guard returned by [`MemoryStack::scope`]
pub struct StackScope<'s> {
    stack: &'s MemoryStack,
    depth: usize,
}

impl<'s> StackScope<'s> {
    pub fn stack(&self) -> &'s MemoryStack {
        self.stack
    }

    /// Depth of the stack while this frame is the innermost one
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether no frame was pushed after this one
    pub fn is_innermost(&self) -> bool {
        self.stack.depth() == self.depth
    }
}

impl Drop for StackScope<'_> {
    fn drop(&mut self) {
        let depth = self.stack.depth();
        if depth != self.depth {
            if std::thread::panicking() {
                log::error!(
                    "Stack frame at depth {} released out of order (depth is {})",
                    self.depth,
                    depth
                );
                return;
            }
            panic!(
                "stack frame at depth {} released out of order (depth is {})",
                self.depth, depth
            );
        }
        self.stack.pop();
    }
}
