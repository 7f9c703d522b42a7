use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::{
    core::{
        domain::{Limits, Metrics, Status},
        errors::SandboxError,
        traits::sandbox::{Isolation, Sandbox},
    },
    sandbox::link_files,
};

/// What a stub sandbox was asked to do.
#[derive(Clone, Debug)]
pub struct StubRun {
    pub command: String,
    pub files: Vec<PathBuf>,
    pub stdin: Option<Vec<u8>>,
    pub limits: Option<Limits>,
    pub box_path: PathBuf,
}

/// Isolation that never starts a process: every run reports the same
/// metrics and output. Scratch directories are real, so teardown can be
/// observed.
#[derive(Clone, Debug)]
pub struct StubIsolation {
    metrics: Metrics,
    stdout: Vec<u8>,
    runs: Arc<Mutex<Vec<StubRun>>>,
}

impl StubIsolation {
    pub fn new(metrics: Metrics, stdout: Vec<u8>) -> Self {
        Self {
            metrics,
            stdout,
            runs: Arc::default(),
        }
    }

    pub fn runs(&self) -> Vec<StubRun> {
        self.runs.lock().map(|runs| runs.clone()).unwrap_or_default()
    }
}

impl Default for StubIsolation {
    fn default() -> Self {
        Self::new(Metrics::new(0, 0, 0, Status::Ok), Vec::new())
    }
}

impl Isolation for StubIsolation {
    type Sandbox = StubBox;

    fn sandbox(&self, files: Vec<PathBuf>) -> StubBox {
        StubBox {
            isolation: self.clone(),
            files,
            dir: None,
        }
    }
}

#[derive(Debug)]
pub struct StubBox {
    isolation: StubIsolation,
    files: Vec<PathBuf>,
    dir: Option<tempfile::TempDir>,
}

#[async_trait::async_trait]
impl Sandbox for StubBox {
    type Outcome = Metrics;

    async fn acquire(&mut self) -> Result<(), SandboxError> {
        self.dir = Some(tempfile::tempdir()?);
        Ok(())
    }

    fn box_path(&self) -> Result<&Path, SandboxError> {
        self.dir
            .as_ref()
            .map(|dir| dir.path())
            .ok_or(SandboxError::NotAcquired)
    }

    #[tracing::instrument(skip(self, stdout))]
    async fn run(
        &mut self,
        command: &str,
        stdin: Option<&[u8]>,
        stdout: Option<&mut Vec<u8>>,
        limits: Option<&Limits>,
    ) -> Result<Metrics, SandboxError> {
        let box_path = self.box_path()?.to_path_buf();
        link_files(&box_path, &self.files).await?;

        if let Ok(mut runs) = self.isolation.runs.lock() {
            runs.push(StubRun {
                command: command.to_string(),
                files: self.files.clone(),
                stdin: stdin.map(<[u8]>::to_vec),
                limits: limits.cloned(),
                box_path,
            });
        }
        if let Some(stdout) = stdout {
            stdout.extend_from_slice(&self.isolation.stdout);
        }

        tracing::debug!("Stub run result: {:?}", self.isolation.metrics);
        Ok(self.isolation.metrics.clone())
    }

    async fn release(&mut self) -> Result<(), SandboxError> {
        self.dir = None;
        Ok(())
    }
}
