//! Shared library loading
//!
//! Libraries are loaded through `libloading` and cached in a process-wide
//! registry keyed by the name that loaded them, so opening the same name twice
//! yields the same [`SharedLibrary`].

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use crate::error::{RuntimeError, RuntimeResult};
use crate::shutdown::{register_shutdown_hook, unregister_shutdown_hook, HookId};

/// When symbol references are resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LinkMode {
    /// On first use
    #[default]
    Lazy,
    /// At load time
    Now,
}

type Registry = HashMap<String, Arc<SharedLibrary>>;

static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();

fn registry() -> MutexGuard<'static, Registry> {
    REGISTRY
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Platform names of the C runtime library, in preference order
pub fn c_runtime_names() -> &'static [&'static str] {
    if cfg!(windows) {
        &["msvcrt.dll"]
    } else if cfg!(target_vendor = "apple") {
        &["libSystem.dylib", "libSystem.B.dylib"]
    } else {
        &["libc.so.6", "libc.so"]
    }
}

#[cfg(unix)]
fn load(name: &str, mode: LinkMode) -> Result<libloading::Library, libloading::Error> {
    use libloading::os::unix::{Library, RTLD_LAZY, RTLD_LOCAL, RTLD_NOW};

    let flags = match mode {
        LinkMode::Lazy => RTLD_LAZY,
        LinkMode::Now => RTLD_NOW,
    };
    // SAFETY: running a library's initializers is inherent to loading it
    unsafe { Library::open(Some(name), flags | RTLD_LOCAL) }.map(Into::into)
}

#[cfg(windows)]
fn load(name: &str, _mode: LinkMode) -> Result<libloading::Library, libloading::Error> {
    // SAFETY: running a library's initializers is inherent to loading it
    unsafe { libloading::Library::new(name) }
}

/// A loaded dynamic library
pub struct SharedLibrary {
    name: String,
    library: Mutex<Option<libloading::Library>>,
    exit_hook: Mutex<Option<HookId>>,
}

impl SharedLibrary {
    /// Load the first candidate that succeeds
    ///
    /// A candidate already in the registry is returned without reloading.
    /// With `close_on_exit` the returned library is closed at shutdown, even
    /// when it came from the registry.
    pub fn open<S: AsRef<str>>(
        candidates: &[S],
        link_mode: LinkMode,
        close_on_exit: bool,
    ) -> RuntimeResult<Arc<SharedLibrary>> {
        let mut reasons = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let name = candidate.as_ref();
            let cached = registry().get(name).cloned();
            if let Some(existing) = cached {
                return Ok(Self::finish_open(existing, close_on_exit));
            }
            if name.contains('\0') {
                reasons.push(format!("{}: contains a NUL byte", name.escape_default()));
                continue;
            }

            // Not under the registry lock: initializers may open libraries themselves
            match load(name, link_mode) {
                Ok(library) => {
                    let library = Self::register(name, library, link_mode);
                    return Ok(Self::finish_open(library, close_on_exit));
                }
                Err(e) => {
                    log::warn!("Failed to load shared library '{}': {}", name, e);
                    reasons.push(format!("{}: {}", name, e));
                }
            }
        }

        Err(RuntimeError::LibraryNotFound {
            candidates: candidates.iter().map(|c| c.as_ref().to_string()).collect(),
            reasons,
        })
    }

    /// Insert a freshly loaded library, or return the entry another thread
    /// registered first
    fn register(name: &str, library: libloading::Library, link_mode: LinkMode) -> Arc<SharedLibrary> {
        let mut registry = registry();
        if let Some(existing) = registry.get(name) {
            log::debug!("Shared library '{}' was registered concurrently", name);
            // Dropping the duplicate handle only decrements the loader's count
            drop(library);
            return Arc::clone(existing);
        }
        log::debug!("Loaded shared library '{}' ({:?})", name, link_mode);
        let library = Arc::new(SharedLibrary {
            name: name.to_string(),
            library: Mutex::new(Some(library)),
            exit_hook: Mutex::new(None),
        });
        registry.insert(name.to_string(), Arc::clone(&library));
        library
    }

    fn finish_open(library: Arc<SharedLibrary>, close_on_exit: bool) -> Arc<SharedLibrary> {
        if close_on_exit {
            library.close_on_exit();
        }
        library
    }

    /// Like [`open`](Self::open), returning `None` when nothing loads
    pub fn try_open<S: AsRef<str>>(
        candidates: &[S],
        link_mode: LinkMode,
        close_on_exit: bool,
    ) -> Option<Arc<SharedLibrary>> {
        Self::open(candidates, link_mode, close_on_exit).ok()
    }

    /// Open the platform C runtime
    pub fn open_c_runtime() -> RuntimeResult<Arc<SharedLibrary>> {
        Self::open(c_runtime_names(), LinkMode::Lazy, false)
    }

    /// Candidate name that loaded this library
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.library
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Address of an exported symbol, or `None` if it is not exported
    pub fn find_function_address(&self, symbol: &str) -> RuntimeResult<Option<*const c_void>> {
        if symbol.contains('\0') {
            return Err(RuntimeError::InvalidName(symbol.escape_default().to_string()));
        }
        let guard = self.library.lock().unwrap_or_else(PoisonError::into_inner);
        let library = guard
            .as_ref()
            .ok_or_else(|| RuntimeError::LibraryClosed(self.name.clone()))?;

        // SAFETY: the symbol is only read as an address, never called here
        match unsafe { library.get::<*mut c_void>(symbol.as_bytes()) } {
            Ok(address) => {
                log::debug!("Resolved '{}' in '{}' at {:p}", symbol, self.name, *address);
                Ok(Some(*address as *const c_void))
            }
            Err(e) => {
                log::debug!("Symbol '{}' not found in '{}': {}", symbol, self.name, e);
                Ok(None)
            }
        }
    }

    /// Address of an exported symbol that must exist
    pub fn get_function_address(&self, symbol: &str) -> RuntimeResult<*const c_void> {
        self.find_function_address(symbol)?
            .ok_or_else(|| RuntimeError::SymbolNotFound {
                library: self.name.clone(),
                symbol: symbol.to_string(),
            })
    }

    /// Close this library when the process exits
    ///
    /// Calling it again has no effect.
    pub fn close_on_exit(self: &Arc<Self>) {
        let mut hook = self.exit_hook.lock().unwrap_or_else(PoisonError::into_inner);
        if hook.is_some() || !self.is_open() {
            return;
        }
        let weak: Weak<SharedLibrary> = Arc::downgrade(self);
        *hook = Some(register_shutdown_hook(move || {
            if let Some(library) = weak.upgrade() {
                library.close();
            }
        }));
    }

    /// Unload the library and drop it from the registry
    ///
    /// Only the first call does anything.
    pub fn close(&self) {
        let library = self
            .library
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(library) = library else { return };

        {
            let mut registry = registry();
            if registry
                .get(&self.name)
                .is_some_and(|entry| std::ptr::eq(Arc::as_ptr(entry), self))
            {
                registry.remove(&self.name);
            }
        }

        if let Some(hook) = self
            .exit_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            unregister_shutdown_hook(hook);
        }

        if let Err(e) = library.close() {
            log::warn!("Failed to unload shared library '{}': {}", self.name, e);
        } else {
            log::debug!("Closed shared library '{}'", self.name);
        }
    }
}

impl std::fmt::Debug for SharedLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedLibrary")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}
