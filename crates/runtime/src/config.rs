//! Runtime configuration
//!
//! Settings are read once from the environment:
//!
//! - `CINTEROP_STACK_SIZE`: size of each thread's argument stack in bytes,
//!   with an optional `k` or `m` suffix (`16k`, `1m`)

use std::sync::OnceLock;

/// Environment variable overriding the per-thread stack size
pub const STACK_SIZE_VAR: &str = "CINTEROP_STACK_SIZE";

/// Default per-thread stack size
pub const DEFAULT_STACK_SIZE: usize = 8 * 1024;

/// Smallest accepted stack size
pub const MIN_STACK_SIZE: usize = 256;

static GLOBAL: OnceLock<RuntimeConfig> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Bytes reserved for each thread's [`MemoryStack`](crate::MemoryStack)
    pub stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl RuntimeConfig {
    /// Process-wide configuration, read from the environment on first use
    pub fn global() -> &'static RuntimeConfig {
        GLOBAL.get_or_init(RuntimeConfig::from_env)
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(STACK_SIZE_VAR) {
            match parse_size(&raw) {
                Some(size) if size >= MIN_STACK_SIZE => config.stack_size = size,
                Some(size) => log::warn!(
                    "{}={} is below the minimum of {} bytes; using {}",
                    STACK_SIZE_VAR,
                    size,
                    MIN_STACK_SIZE,
                    DEFAULT_STACK_SIZE
                ),
                None => log::warn!(
                    "Ignoring invalid {}='{}'; using {} bytes",
                    STACK_SIZE_VAR,
                    raw,
                    DEFAULT_STACK_SIZE
                ),
            }
        }
        config
    }
}

/// Parse `1234`, `16k` or `2m` (case-insensitive) into bytes
pub fn parse_size(raw: &str) -> Option<usize> {
    let raw = raw.trim();
    let (digits, multiplier) = match raw.char_indices().last()? {
        (i, 'k' | 'K') => (&raw[..i], 1024),
        (i, 'm' | 'M') => (&raw[..i], 1024 * 1024),
        _ => (raw, 1),
    };
    digits.parse::<usize>().ok()?.checked_mul(multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("8192"), Some(8192));
        assert_eq!(parse_size("16k"), Some(16 * 1024));
        assert_eq!(parse_size(" 2M "), Some(2 * 1024 * 1024));
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("k"), None);
        assert_eq!(parse_size("12kb"), None);
        assert_eq!(parse_size("-4"), None);
    }

    #[test]
    fn test_default() {
        assert_eq!(RuntimeConfig::default().stack_size, DEFAULT_STACK_SIZE);
    }
}
