use std::path::{Path, PathBuf};

use crate::core::{
    domain::{Limits, Metrics},
    errors::SandboxError,
};

/// Result of a sandboxed run as seen by callers that only need to know
/// whether the program terminated normally.
pub trait RunOutcome: std::fmt::Debug + Send + Sync {
    fn status(&self) -> &'static str;

    fn is_ok(&self) -> bool {
        self.status() == "ok"
    }
}

impl RunOutcome for Metrics {
    fn status(&self) -> &'static str {
        self.status.as_str()
    }
}

/// Raw exit code of an unconfined run.
impl RunOutcome for i32 {
    fn status(&self) -> &'static str {
        if *self == 0 { "ok" } else { "re" }
    }
}

/// One ephemeral execution context. Supports a single `run` between
/// `acquire` and `release`.
#[async_trait::async_trait]
pub trait Sandbox: Send {
    type Outcome: RunOutcome;

    /// Resets stale state and allocates a fresh, empty scratch directory.
    async fn acquire(&mut self) -> Result<(), SandboxError>;

    fn box_path(&self) -> Result<&Path, SandboxError>;

    async fn run(
        &mut self,
        command: &str,
        stdin: Option<&[u8]>,
        stdout: Option<&mut Vec<u8>>,
        limits: Option<&Limits>,
    ) -> Result<Self::Outcome, SandboxError>;

    /// Destroys the scratch directory. Safe to call more than once.
    async fn release(&mut self) -> Result<(), SandboxError>;
}

/// Capability to create sandboxes. Implementations hold configuration
/// only, so one instance can be shared by every executable of a session.
pub trait Isolation: std::fmt::Debug + Send + Sync + 'static {
    type Sandbox: Sandbox;

    /// Creates an unacquired sandbox exposing `files` under their base names.
    fn sandbox(&self, files: Vec<PathBuf>) -> Self::Sandbox;
}
