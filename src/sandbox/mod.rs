/// Sandbox module contains the two implementations of the sandbox
/// capability: a confined one delegating to the `isolate` tool and an
/// unconfined one for trusted programs.
pub mod isolate;
pub mod report;
pub mod trusted;

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::{
    constants::{STDIN_FILE, STDOUT_FILE},
    core::errors::SandboxError,
};

pub use isolate::{Isolate, IsolateBox, IsolateConfig};
pub use trusted::{Trusted, TrustedBox};

/// Writes the fixed-name input file, empty when there is no stdin.
async fn write_stdin(box_path: &Path, stdin: Option<&[u8]>) -> Result<(), SandboxError> {
    fs::write(box_path.join(STDIN_FILE), stdin.unwrap_or_default()).await?;
    Ok(())
}

async fn read_stdout(box_path: &Path, stdout: Option<&mut Vec<u8>>) -> Result<(), SandboxError> {
    let Some(stdout) = stdout else {
        return Ok(());
    };
    match fs::read(box_path.join(STDOUT_FILE)).await {
        Ok(data) => stdout.extend_from_slice(&data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("Program produced no output file");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Exposes every file in the scratch directory under its base name.
pub(crate) async fn link_files(box_path: &Path, files: &[PathBuf]) -> Result<(), SandboxError> {
    for file in files {
        let name = file.file_name().ok_or_else(|| {
            SandboxError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} has no file name", file.display()),
            ))
        })?;
        let target = box_path.join(name);
        if let Err(e) = fs::hard_link(file, &target).await {
            // Hard links cannot cross filesystems.
            if e.kind() == std::io::ErrorKind::CrossesDevices {
                tracing::debug!(file = %file.display(), "Copying file into sandbox");
                fs::copy(file, &target).await?;
            } else {
                return Err(e.into());
            }
        }
    }
    Ok(())
}

/// Splits a command line into argv. A program name that exists in the
/// scratch directory is rewritten by `locate`, since the program may see
/// that directory under a different path than the host does.
fn split_command(
    box_path: &Path,
    command: &str,
    locate: impl FnOnce(&str) -> String,
) -> Result<Vec<String>, SandboxError> {
    let invalid = || SandboxError::InvalidCommand {
        command: command.to_string(),
    };
    let mut argv = shlex::split(command).ok_or_else(invalid)?;
    let program = argv.first_mut().ok_or_else(invalid)?;
    if !program.contains('/') && box_path.join(&*program).is_file() {
        *program = locate(program.as_str());
    }
    Ok(argv)
}
