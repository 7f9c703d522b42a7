use crate::core::domain::Limits;

pub const STDIN_FILE: &str = "__data.in";
pub const STDOUT_FILE: &str = "__data.out";
pub const META_FILE: &str = "__test.meta";

/// The only environment a confined program gets.
pub const SANDBOX_PATH_ENV: &str = "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Seconds a confined program may overrun its time limit before it is killed.
pub const EXTRA_TIME_SECS: u64 = 1;

/// Used for compilation and for confined runs that come without limits.
/// Far above any single test limit.
pub const DEFAULT_LIMITS: Limits = Limits {
    time_ms: 15_000,
    memory_kb: 512 * 1024,
    real_time_ms: 30_000,
};

pub const DEFAULT_RUN_COMMAND: &str = "{0} {1}";
pub const ARTIFACT_EXTENSION: &str = "out";
pub const TRUSTED_DIR_PREFIX: &str = "trusted-";
