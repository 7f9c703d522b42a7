use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::{fs, process::Command};
use uuid::Uuid;

use crate::{
    constants::{STDIN_FILE, STDOUT_FILE, TRUSTED_DIR_PREFIX},
    core::{
        domain::Limits,
        errors::SandboxError,
        traits::sandbox::{Isolation, Sandbox},
    },
    sandbox::{link_files, read_stdout, split_command, write_stdin},
};

/// Unconfined sandboxes for programs shipped with the problem, such as
/// checkers. Each sandbox is a plain directory under `root`.
#[derive(Clone, Debug)]
pub struct Trusted {
    root: PathBuf,
}

impl Trusted {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().into(),
        }
    }
}

impl Default for Trusted {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("isolate-judge"))
    }
}

impl Isolation for Trusted {
    type Sandbox = TrustedBox;

    fn sandbox(&self, files: Vec<PathBuf>) -> TrustedBox {
        TrustedBox {
            path: self
                .root
                .join(format!("{}{}", TRUSTED_DIR_PREFIX, Uuid::new_v4())),
            files,
            acquired: false,
        }
    }
}

#[derive(Debug)]
pub struct TrustedBox {
    path: PathBuf,
    files: Vec<PathBuf>,
    acquired: bool,
}

#[async_trait::async_trait]
impl Sandbox for TrustedBox {
    type Outcome = i32;

    async fn acquire(&mut self) -> Result<(), SandboxError> {
        self.release().await?;
        if fs::try_exists(&self.path).await? {
            fs::remove_dir_all(&self.path).await?;
        }
        fs::create_dir_all(&self.path).await?;
        self.acquired = true;
        tracing::debug!(box_path = %self.path.display(), "Trusted sandbox acquired");
        Ok(())
    }

    fn box_path(&self) -> Result<&Path, SandboxError> {
        if self.acquired {
            Ok(&self.path)
        } else {
            Err(SandboxError::NotAcquired)
        }
    }

    #[tracing::instrument(skip(self, stdin, stdout))]
    async fn run(
        &mut self,
        command: &str,
        stdin: Option<&[u8]>,
        stdout: Option<&mut Vec<u8>>,
        limits: Option<&Limits>,
    ) -> Result<i32, SandboxError> {
        let box_path = self.box_path()?;
        if let Some(limits) = limits {
            tracing::warn!(?limits, "Limits are not supported for trusted sandboxes, ignoring them");
        }

        write_stdin(box_path, stdin).await?;
        link_files(box_path, &self.files).await?;
        let argv = split_command(box_path, command, |name| {
            box_path.join(name).to_string_lossy().into_owned()
        })?;

        let stdin_file = fs::File::open(box_path.join(STDIN_FILE)).await?.into_std().await;
        let stdout_file = fs::File::create(box_path.join(STDOUT_FILE)).await?.into_std().await;
        // `output()` would replace the file redirections with pipes.
        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(box_path)
            .stdin(stdin_file)
            .stdout(stdout_file)
            .stderr(Stdio::piped())
            .spawn()?
            .wait_with_output()
            .await?;
        let exit_code = output.status.code().unwrap_or(-1);
        tracing::debug!(
            exit_code,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "Trusted program finished"
        );

        read_stdout(box_path, stdout).await?;
        Ok(exit_code)
    }

    async fn release(&mut self) -> Result<(), SandboxError> {
        if std::mem::take(&mut self.acquired) {
            fs::remove_dir_all(&self.path).await?;
        }
        Ok(())
    }
}

impl Drop for TrustedBox {
    fn drop(&mut self) {
        if !self.acquired {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            tracing::error!(box_path = %self.path.display(), error = %e, "Failed to remove trusted sandbox");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_before_acquire() {
        let root = tempfile::tempdir().unwrap();
        let mut sandbox = Trusted::new(root.path()).sandbox(vec![]);

        let result = sandbox.run("true", None, None, None).await;

        assert!(matches!(result, Err(SandboxError::NotAcquired)));
    }

    #[tokio::test]
    async fn test_run_returns_exit_code_and_stdout() {
        let root = tempfile::tempdir().unwrap();
        let files = tempfile::tempdir().unwrap();
        let script = files.path().join("sum.sh");
        std::fs::write(&script, "read a b\necho $((a + b))\nexit 7\n").unwrap();

        let mut sandbox = Trusted::new(root.path()).sandbox(vec![script]);
        sandbox.acquire().await.unwrap();
        let box_path = sandbox.box_path().unwrap().to_path_buf();

        let mut stdout = Vec::new();
        let exit_code = sandbox
            .run(
                "sh sum.sh",
                Some(b"2 40\n"),
                Some(&mut stdout),
                Some(&Limits::new(1, 1, 1)),
            )
            .await
            .unwrap();

        assert_eq!(exit_code, 7);
        assert_eq!(String::from_utf8(stdout).unwrap(), "42\n");

        sandbox.release().await.unwrap();
        assert!(!box_path.exists());
    }

    #[tokio::test]
    async fn test_sandboxes_do_not_share_directories() {
        let root = tempfile::tempdir().unwrap();
        let trusted = Trusted::new(root.path());
        let mut first = trusted.sandbox(vec![]);
        let mut second = trusted.sandbox(vec![]);
        first.acquire().await.unwrap();
        second.acquire().await.unwrap();

        assert_ne!(first.box_path().unwrap(), second.box_path().unwrap());
    }

    #[tokio::test]
    async fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let box_path = {
            let mut sandbox = Trusted::new(root.path()).sandbox(vec![]);
            sandbox.acquire().await.unwrap();
            sandbox.box_path().unwrap().to_path_buf()
        };

        assert!(!box_path.exists());
    }
}
