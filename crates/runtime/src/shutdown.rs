//! Process shutdown hooks
//!
//! Thread-local stacks and libraries opened with `close_on_exit` release
//! their native resources here when the process exits. Hooks run once, in
//! registration order, either from an `atexit` handler installed on first
//! registration or from an explicit [`run_shutdown_hooks`] call.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

/// Handle for removing a registered hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

type Hook = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct HookRegistry {
    hooks: VecDeque<(HookId, Hook)>,
    next_id: u64,
    atexit_installed: bool,
}

static REGISTRY: OnceLock<Mutex<HookRegistry>> = OnceLock::new();

fn registry() -> MutexGuard<'static, HookRegistry> {
    REGISTRY
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

extern "C" fn run_at_exit() {
    run_shutdown_hooks();
}

/// Register `hook` to run at process exit
pub fn register_shutdown_hook<F>(hook: F) -> HookId
where
    F: FnOnce() + Send + 'static,
{
    let mut registry = registry();
    if !registry.atexit_installed {
        registry.atexit_installed = true;
        // SAFETY: run_at_exit is a plain extern "C" function that never unwinds
        if unsafe { libc::atexit(run_at_exit) } != 0 {
            log::warn!("Failed to install atexit handler; shutdown hooks will only run on request");
        }
    }
    let id = HookId(registry.next_id);
    registry.next_id += 1;
    registry.hooks.push_back((id, Box::new(hook)));
    id
}

/// Remove a hook that has not run yet; returns whether it was found
pub fn unregister_shutdown_hook(id: HookId) -> bool {
    let mut registry = registry();
    match registry.hooks.iter().position(|(hook_id, _)| *hook_id == id) {
        Some(index) => {
            registry.hooks.remove(index);
            true
        }
        None => false,
    }
}

/// Number of hooks waiting to run
pub fn pending_shutdown_hooks() -> usize {
    registry().hooks.len()
}

/// Drain and run every registered hook, returning how many ran
///
/// The registry lock is released while a hook runs, so hooks may register or
/// unregister others. A panicking hook is logged and skipped.
pub fn run_shutdown_hooks() -> usize {
    let mut ran = 0;
    loop {
        let next = registry().hooks.pop_front();
        let Some((id, hook)) = next else { break };
        if panic::catch_unwind(AssertUnwindSafe(hook)).is_err() {
            log::warn!("Shutdown hook {:?} panicked", id);
        }
        ran += 1;
    }
    if ran > 0 {
        log::info!("Ran {} shutdown hooks", ran);
    }
    ran
}
