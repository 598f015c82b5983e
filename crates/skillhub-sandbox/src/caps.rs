//! Resource caps applied to a single guest execution.

/// Default cap on the bytes a guest may write to stdout.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Default wall-clock deadline in seconds.
pub const DEFAULT_MAX_WALL_SECONDS: u64 = 30;

/// Limits enforced on one guest process.
#[derive(Debug, Clone)]
pub struct ResourceCaps {
    /// Hard wall-clock deadline in seconds.
    pub max_wall_seconds: u64,
    /// Maximum bytes the guest may emit on stdout; the result is discarded
    /// once exceeded.
    pub max_output_bytes: usize,
    /// Address-space limit in bytes, enforced via rlimit where supported.
    pub max_memory_bytes: Option<u64>,
    /// Whether the guest may open network sockets. Denied by default;
    /// relaxing this drops kernel-level enforcement entirely.
    pub allow_network: bool,
}

impl Default for ResourceCaps {
    fn default() -> Self {
        Self {
            max_wall_seconds: DEFAULT_MAX_WALL_SECONDS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            max_memory_bytes: Some(512 * 1024 * 1024),
            allow_network: false,
        }
    }
}

impl ResourceCaps {
    /// Caps with a specific deadline and defaults for everything else.
    pub fn with_deadline(max_wall_seconds: u64) -> Self {
        Self {
            max_wall_seconds,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_caps_deny_network() {
        let caps = ResourceCaps::default();
        assert!(!caps.allow_network);
        assert_eq!(caps.max_output_bytes, DEFAULT_MAX_OUTPUT_BYTES);
    }

    #[test]
    fn with_deadline_overrides_wall_clock_only() {
        let caps = ResourceCaps::with_deadline(5);
        assert_eq!(caps.max_wall_seconds, 5);
        assert_eq!(caps.max_output_bytes, DEFAULT_MAX_OUTPUT_BYTES);
    }
}
