use std::path::PathBuf;

use crate::sandbox::{Isolate, IsolateConfig, Trusted};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot split isolate command {0:?}")]
    InvalidIsolateCommand(String),
}

/// Where sandboxes come from. Every option can also be set through the
/// environment.
#[derive(clap::Args, Clone, Debug)]
pub struct SandboxConfig {
    /// Command line that starts isolate, e.g. "sudo -n isolate".
    #[arg(long, env = "ISOLATE_COMMAND", default_value = "isolate")]
    pub isolate_command: String,

    /// Isolate box reserved for this worker. Workers running side by side
    /// need distinct ids.
    #[arg(long, env = "ISOLATE_BOX_ID", default_value_t = 0)]
    pub box_id: u32,

    /// Directory holding scratch directories of trusted programs.
    #[arg(long, env = "TRUSTED_ROOT")]
    pub trusted_root: Option<PathBuf>,
}

impl SandboxConfig {
    pub fn isolate(&self) -> Result<Isolate, ConfigError> {
        let command = shlex::split(&self.isolate_command)
            .filter(|command| !command.is_empty())
            .ok_or_else(|| ConfigError::InvalidIsolateCommand(self.isolate_command.clone()))?;
        Ok(Isolate::new(IsolateConfig {
            command,
            box_id: self.box_id,
        }))
    }

    pub fn trusted(&self) -> Trusted {
        self.trusted_root
            .as_ref()
            .map(Trusted::new)
            .unwrap_or_default()
    }
}
