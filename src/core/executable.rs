use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use itertools::Itertools;

use crate::{
    constants::{ARTIFACT_EXTENSION, DEFAULT_LIMITS, DEFAULT_RUN_COMMAND},
    core::{
        domain::Limits,
        errors::{CompileError, SandboxError},
        traits::sandbox::{Isolation, RunOutcome, Sandbox},
    },
};

type Outcome<I> = <<I as Isolation>::Sandbox as Sandbox>::Outcome;

/// Substitutes `{0}` and `{1}` in a command template.
pub fn format_command(template: &str, first: &str, second: &str) -> String {
    template
        .replace("{0}", first)
        .replace("{1}", second)
        .trim()
        .to_string()
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Everything one run of an executable needs besides the executable itself.
#[derive(Clone, Debug, Default)]
pub struct Invocation {
    pub stdin: Option<Vec<u8>>,
    pub capture_stdout: bool,
    pub files: Vec<PathBuf>,
    pub args: Vec<String>,
    pub limits: Option<Limits>,
    /// Scratch directory entries to read back before the sandbox is released.
    pub collect: Vec<String>,
}

impl Invocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdin(mut self, stdin: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn capture_stdout(mut self) -> Self {
        self.capture_stdout = true;
        self
    }

    pub fn files(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
        self.files.extend(files);
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn collect(mut self, name: impl Into<String>) -> Self {
        self.collect.push(name.into());
        self
    }
}

#[derive(Debug)]
pub struct Finished<O> {
    pub outcome: O,
    pub stdout: Vec<u8>,
    /// Collected files that existed after the run, by name.
    pub collected: HashMap<String, Vec<u8>>,
}

/// Runs `command` in a fresh sandbox exposing `files`. The sandbox is
/// released on every path before the result is returned.
async fn run_scoped<I: Isolation>(
    isolation: &I,
    files: Vec<PathBuf>,
    command: &str,
    invocation: &Invocation,
) -> Result<Finished<Outcome<I>>, SandboxError> {
    let mut sandbox = isolation.sandbox(files);
    let result = run_acquired(&mut sandbox, command, invocation).await;
    let released = sandbox.release().await;

    let finished = result?;
    released?;
    Ok(finished)
}

async fn run_acquired<S: Sandbox>(
    sandbox: &mut S,
    command: &str,
    invocation: &Invocation,
) -> Result<Finished<S::Outcome>, SandboxError> {
    sandbox.acquire().await?;

    let mut stdout = Vec::new();
    let outcome = sandbox
        .run(
            command,
            invocation.stdin.as_deref(),
            invocation.capture_stdout.then_some(&mut stdout),
            invocation.limits.as_ref(),
        )
        .await?;

    let box_path = sandbox.box_path()?;
    let mut collected = HashMap::new();
    for name in &invocation.collect {
        match tokio::fs::read(box_path.join(name)).await {
            Ok(data) => {
                collected.insert(name.clone(), data);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(file = %name, "Collected file does not exist");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(Finished {
        outcome,
        stdout,
        collected,
    })
}

/// A runnable artifact. Holds no sandbox: every run gets a fresh one.
#[derive(Debug)]
pub struct Executable<I: Isolation> {
    main_file: PathBuf,
    files: Vec<PathBuf>,
    run_command: String,
    isolation: Arc<I>,
}

impl<I: Isolation> Clone for Executable<I> {
    fn clone(&self) -> Self {
        Self {
            main_file: self.main_file.clone(),
            files: self.files.clone(),
            run_command: self.run_command.clone(),
            isolation: self.isolation.clone(),
        }
    }
}

impl<I: Isolation> Executable<I> {
    /// Wraps `main_file`, marking it executable.
    pub fn new(
        main_file: impl AsRef<Path>,
        files: Vec<PathBuf>,
        run_command: impl Into<String>,
        isolation: Arc<I>,
    ) -> std::io::Result<Self> {
        let main_file = main_file.as_ref().to_path_buf();
        let mut permissions = std::fs::metadata(&main_file)?.permissions();
        permissions.set_mode(permissions.mode() | 0o111);
        std::fs::set_permissions(&main_file, permissions)?;

        Ok(Self {
            main_file,
            files,
            run_command: run_command.into(),
            isolation,
        })
    }

    /// Adds auxiliary files exposed to every run.
    pub fn with_files(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
        self.files.extend(files);
        self
    }

    pub fn main_file(&self) -> &Path {
        &self.main_file
    }

    pub fn command(&self, args: &[String]) -> String {
        format_command(
            &self.run_command,
            &base_name(&self.main_file),
            &args.iter().join(" "),
        )
    }

    #[tracing::instrument(skip(self, invocation), fields(main_file = %self.main_file.display()))]
    pub async fn run(
        &self,
        invocation: Invocation,
    ) -> Result<Finished<Outcome<I>>, SandboxError> {
        let files = std::iter::once(self.main_file.clone())
            .chain(invocation.files.iter().cloned())
            .chain(self.files.iter().cloned())
            .collect();
        let command = self.command(&invocation.args);
        tracing::debug!(command = %command, "Running executable");

        run_scoped(self.isolation.as_ref(), files, &command, &invocation).await
    }
}

/// A source file plus the commands to build and run it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Compilable {
    pub file: PathBuf,
    /// `{0}` is the source base name, `{1}` the artifact base name.
    /// Empty when the source runs as is.
    pub compile_command: Option<String>,
    pub run_command: String,
}

impl Compilable {
    pub fn new(
        file: impl AsRef<Path>,
        compile_command: Option<String>,
        run_command: Option<String>,
    ) -> Self {
        Self {
            file: file.as_ref().into(),
            compile_command: compile_command.filter(|command| !command.trim().is_empty()),
            run_command: run_command.unwrap_or_else(|| DEFAULT_RUN_COMMAND.to_string()),
        }
    }

    pub fn default_artifact_path(&self) -> PathBuf {
        let mut path = self.file.clone().into_os_string();
        path.push(".");
        path.push(ARTIFACT_EXTENSION);
        path.into()
    }

    pub async fn compile<I: Isolation>(
        &self,
        isolation: Arc<I>,
    ) -> Result<Executable<I>, CompileError> {
        self.compile_to(isolation, self.default_artifact_path()).await
    }

    #[tracing::instrument(skip(self, isolation), fields(file = %self.file.display()))]
    pub async fn compile_to<I: Isolation>(
        &self,
        isolation: Arc<I>,
        artifact_path: impl AsRef<Path> + std::fmt::Debug,
    ) -> Result<Executable<I>, CompileError> {
        let Some(compile_command) = &self.compile_command else {
            tracing::debug!("No compile command, source runs as is");
            return Ok(Executable::new(
                &self.file,
                Vec::new(),
                self.run_command.clone(),
                isolation,
            )?);
        };

        let artifact_path = artifact_path.as_ref();
        let artifact_name = base_name(artifact_path);
        let command = format_command(compile_command, &base_name(&self.file), &artifact_name);
        tracing::info!(command = %command, "Compiling");

        let invocation = Invocation::new()
            .limits(DEFAULT_LIMITS)
            .collect(artifact_name.clone());
        let finished = run_scoped(
            isolation.as_ref(),
            vec![self.file.clone()],
            &command,
            &invocation,
        )
        .await?;

        if !finished.outcome.is_ok() {
            tracing::info!(outcome = ?finished.outcome, "Compilation failed");
            return Err(CompileError::Failed {
                status: finished.outcome.status().to_string(),
            });
        }

        let Some(artifact) = finished.collected.get(&artifact_name) else {
            return Err(CompileError::MissingArtifact {
                path: artifact_path.to_path_buf(),
            });
        };
        tokio::fs::write(artifact_path, artifact).await?;
        tracing::info!(artifact = %artifact_path.display(), "Compilation succeeded");

        Ok(Executable::new(
            artifact_path,
            Vec::new(),
            self.run_command.clone(),
            isolation,
        )?)
    }
}
