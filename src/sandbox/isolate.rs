use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::{
    constants::{DEFAULT_LIMITS, EXTRA_TIME_SECS, META_FILE, SANDBOX_PATH_ENV, STDIN_FILE, STDOUT_FILE},
    core::{
        domain::{Limits, Metrics},
        errors::SandboxError,
        traits::sandbox::{Isolation, Sandbox},
    },
    sandbox::{link_files, read_stdout, report::parse_usage_report, split_command, write_stdin},
};

#[derive(Clone, Debug)]
pub struct IsolateConfig {
    /// Command line that starts isolate, e.g. `isolate` or `sudo -n isolate`.
    pub command: Vec<String>,
    /// Box id reserved for this worker. Concurrent workers must use distinct ids.
    pub box_id: u32,
}

impl Default for IsolateConfig {
    fn default() -> Self {
        Self {
            command: vec!["isolate".to_string()],
            box_id: 0,
        }
    }
}

/// Confined sandboxes backed by the `isolate` command line tool.
#[derive(Clone, Debug, Default)]
pub struct Isolate {
    config: IsolateConfig,
}

impl Isolate {
    pub fn new(config: IsolateConfig) -> Self {
        Self { config }
    }
}

impl Isolation for Isolate {
    type Sandbox = IsolateBox;

    fn sandbox(&self, files: Vec<PathBuf>) -> IsolateBox {
        IsolateBox {
            config: self.config.clone(),
            files,
            state: None,
        }
    }
}

#[derive(Debug)]
struct Acquired {
    box_path: PathBuf,
    /// Holds the usage report outside the confined tree.
    meta_dir: tempfile::TempDir,
}

#[derive(Debug)]
pub struct IsolateBox {
    config: IsolateConfig,
    files: Vec<PathBuf>,
    state: Option<Acquired>,
}

impl IsolateConfig {
    fn program(&self) -> (&str, &[String]) {
        match self.command.split_first() {
            Some((program, args)) => (program.as_str(), args),
            None => ("isolate", &[]),
        }
    }
}

impl IsolateBox {
    fn command(&self) -> Command {
        let (program, args) = self.config.program();
        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(format!("--box-id={}", self.config.box_id));
        cmd
    }

    async fn cleanup(&self) -> Result<(), SandboxError> {
        let status = self
            .command()
            .arg("--cleanup")
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;
        if !status.status.success() {
            tracing::warn!(
                box_id = self.config.box_id,
                stderr = %String::from_utf8_lossy(&status.stderr),
                "isolate cleanup failed"
            );
        }
        Ok(())
    }

    fn run_args(meta_path: &Path, limits: &Limits) -> Vec<String> {
        vec![
            "--run".to_string(),
            format!("--stdin={}", STDIN_FILE),
            format!("--stdout={}", STDOUT_FILE),
            format!("--time={}", ms_to_seconds(limits.time_ms)),
            format!("--mem={}", limits.memory_kb),
            format!("--wall-time={}", ms_to_seconds(limits.real_time_ms)),
            format!("--extra-time={}", EXTRA_TIME_SECS),
            format!("--meta={}", meta_path.display()),
            format!("--env={}", SANDBOX_PATH_ENV),
            "--processes".to_string(),
            "--".to_string(),
        ]
    }

    async fn read_metrics(meta_path: &Path) -> Metrics {
        let report = match tokio::fs::read_to_string(meta_path).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "Usage report is unreadable");
                return Metrics::failed();
            }
        };
        parse_usage_report(&report).unwrap_or_else(|| {
            tracing::error!(report = %report, "Usage report is incomplete");
            Metrics::failed()
        })
    }
}

fn ms_to_seconds(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

#[async_trait::async_trait]
impl Sandbox for IsolateBox {
    type Outcome = Metrics;

    #[tracing::instrument(skip(self), fields(box_id = self.config.box_id))]
    async fn acquire(&mut self) -> Result<(), SandboxError> {
        self.cleanup().await?;

        let output = self
            .command()
            .arg("--init")
            .stderr(Stdio::piped())
            .output()
            .await?;
        if !output.status.success() {
            return Err(SandboxError::Init {
                msg: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if root.is_empty() {
            return Err(SandboxError::Init {
                msg: "isolate printed no box path".to_string(),
            });
        }

        let box_path = Path::new(&root).join("box");
        tracing::debug!(box_path = %box_path.display(), "Sandbox acquired");
        self.state = Some(Acquired {
            box_path,
            meta_dir: tempfile::tempdir()?,
        });
        Ok(())
    }

    fn box_path(&self) -> Result<&Path, SandboxError> {
        self.state
            .as_ref()
            .map(|state| state.box_path.as_path())
            .ok_or(SandboxError::NotAcquired)
    }

    #[tracing::instrument(skip(self, stdin, stdout), fields(box_id = self.config.box_id))]
    async fn run(
        &mut self,
        command: &str,
        stdin: Option<&[u8]>,
        stdout: Option<&mut Vec<u8>>,
        limits: Option<&Limits>,
    ) -> Result<Metrics, SandboxError> {
        let state = self.state.as_ref().ok_or(SandboxError::NotAcquired)?;
        let box_path = state.box_path.as_path();
        let meta_path = state.meta_dir.path().join(META_FILE);
        let limits = limits.unwrap_or(&DEFAULT_LIMITS);

        write_stdin(box_path, stdin).await?;
        link_files(box_path, &self.files).await?;
        // Isolate runs the program with the box as its working directory.
        let argv = split_command(box_path, command, |name| format!("./{}", name))?;

        let output = self
            .command()
            .args(Self::run_args(&meta_path, limits))
            .args(&argv)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;
        // Exit status of isolate reflects the confined program as well;
        // the usage report decides the outcome.
        tracing::debug!(
            exit_status = ?output.status,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "isolate finished"
        );

        let metrics = Self::read_metrics(&meta_path).await;
        read_stdout(box_path, stdout).await?;

        tracing::debug!(?metrics, "Run finished");
        Ok(metrics)
    }

    async fn release(&mut self) -> Result<(), SandboxError> {
        if self.state.take().is_some() {
            self.cleanup().await?;
        }
        Ok(())
    }
}

impl Drop for IsolateBox {
    fn drop(&mut self) {
        if self.state.take().is_none() {
            return;
        }
        // Best effort cleanup when the box was not released explicitly.
        let (program, args) = self.config.program();
        let result = std::process::Command::new(program)
            .args(args)
            .arg(format!("--box-id={}", self.config.box_id))
            .arg("--cleanup")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = result {
            tracing::error!(box_id = self.config.box_id, error = %e, "isolate cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::Status;

    /// Mimics the isolate command line: boxes are directories under
    /// `root`, `--run` executes the command inside the box and writes a
    /// usage report.
    const FAKE_ISOLATE: &str = r#"
root="$FAKE_ROOT"
mode=""; box=0; meta=""; stdin=""; stdout=""; wall=""
while [ $# -gt 0 ]; do
    case "$1" in
        --init) mode=init ;;
        --cleanup) mode=cleanup ;;
        --run) mode=run ;;
        --box-id=*) box="${1#--box-id=}" ;;
        --meta=*) meta="${1#--meta=}" ;;
        --stdin=*) stdin="${1#--stdin=}" ;;
        --stdout=*) stdout="${1#--stdout=}" ;;
        --wall-time=*) wall="${1#--wall-time=}" ;;
        --) shift; break ;;
    esac
    shift
done
dir="$root/$box"
case "$mode" in
    init) mkdir -p "$dir/box" && echo "$dir" ;;
    cleanup) rm -rf "$dir" ;;
    run)
        cd "$dir/box" || exit 2
        echo "$wall" > "$root/last-wall-time"
        echo "$1" > "$root/last-program"
        case "$1" in
            # Host paths do not exist inside the real box.
            "$root"/*) echo "no such file: $1" >&2; exit 2 ;;
            # Box files are shell scripts here.
            ./*) set -- sh "$@" ;;
        esac
        "$@" < "$stdin" > "$stdout"
        code=$?
        printf 'time:0.012\ntime-wall:0.034\nmax-rss:2048\n' > "$meta"
        if [ "$code" -ne 0 ]; then
            printf 'status:RE\nexitcode:%s\n' "$code" >> "$meta"
        fi
        exit 1
        ;;
esac
"#;

    struct FakeIsolate {
        root: tempfile::TempDir,
        isolate: Isolate,
    }

    fn fake_isolate(box_id: u32) -> FakeIsolate {
        let root = tempfile::tempdir().unwrap();
        let script = root.path().join("isolate.sh");
        let body = FAKE_ISOLATE.replace("$FAKE_ROOT", &root.path().join("boxes").to_string_lossy());
        std::fs::write(&script, body).unwrap();
        let isolate = Isolate::new(IsolateConfig {
            command: vec!["sh".to_string(), script.to_string_lossy().into_owned()],
            box_id,
        });
        FakeIsolate { root, isolate }
    }

    #[test]
    fn test_run_args_convert_units() {
        let args = IsolateBox::run_args(Path::new("/tmp/meta"), &Limits::new(1500, 65536, 3000));

        assert!(args.contains(&"--time=1.500".to_string()));
        assert!(args.contains(&"--wall-time=3.000".to_string()));
        assert!(args.contains(&"--mem=65536".to_string()));
        assert!(args.contains(&"--extra-time=1".to_string()));
        assert!(args.contains(&"--meta=/tmp/meta".to_string()));
        assert_eq!(args.last().unwrap(), "--");
    }

    #[tokio::test]
    async fn test_run_before_acquire() {
        let mut sandbox = Isolate::default().sandbox(vec![]);

        let result = sandbox.run("true", None, None, None).await;

        assert!(matches!(result, Err(SandboxError::NotAcquired)));
        assert!(matches!(sandbox.box_path(), Err(SandboxError::NotAcquired)));
    }

    #[tokio::test]
    async fn test_run_echo_program() {
        let fake = fake_isolate(3);
        let program = fake.root.path().join("cat.sh");
        std::fs::write(&program, "cat\n").unwrap();

        let mut sandbox = fake.isolate.sandbox(vec![program]);
        sandbox.acquire().await.unwrap();
        let box_path = sandbox.box_path().unwrap().to_path_buf();
        assert!(box_path.ends_with("3/box"));

        let mut stdout = Vec::new();
        let metrics = sandbox
            .run(
                "sh cat.sh",
                Some(b"1 2\n"),
                Some(&mut stdout),
                Some(&Limits::new(1000, 1024, 2500)),
            )
            .await
            .unwrap();

        assert_eq!(metrics, Metrics::new(12, 2048, 34, Status::Ok));
        assert_eq!(stdout, b"1 2\n");
        let wall = std::fs::read_to_string(fake.root.path().join("boxes/last-wall-time")).unwrap();
        assert_eq!(wall.trim(), "2.500");

        sandbox.release().await.unwrap();
        assert!(!box_path.exists());
    }

    #[tokio::test]
    async fn test_box_programs_are_addressed_inside_the_box() {
        let fake = fake_isolate(9);
        let artifact = fake.root.path().join("main.cpp.out");
        std::fs::write(&artifact, "echo compiled \"$@\"\n").unwrap();

        let mut sandbox = fake.isolate.sandbox(vec![artifact]);
        sandbox.acquire().await.unwrap();
        let mut stdout = Vec::new();
        let metrics = sandbox
            .run("main.cpp.out 1 2", None, Some(&mut stdout), None)
            .await
            .unwrap();
        sandbox.release().await.unwrap();

        let program = std::fs::read_to_string(fake.root.path().join("boxes/last-program")).unwrap();
        assert_eq!(program.trim(), "./main.cpp.out");
        assert_eq!(metrics.status, Status::Ok);
        assert_eq!(stdout, b"compiled 1 2\n");
    }

    #[tokio::test]
    async fn test_runtime_error_is_data() {
        let fake = fake_isolate(4);
        let mut sandbox = fake.isolate.sandbox(vec![]);
        sandbox.acquire().await.unwrap();

        let metrics = sandbox.run("sh -c 'exit 3'", None, None, None).await.unwrap();

        assert_eq!(metrics.status, Status::Re);
        sandbox.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_report_is_system_failure() {
        let dir = tempfile::tempdir().unwrap();
        let meta_path = dir.path().join(META_FILE);

        assert_eq!(IsolateBox::read_metrics(&meta_path).await, Metrics::failed());

        std::fs::write(&meta_path, "time:0.100\nstatus:SG\n").unwrap();
        assert_eq!(IsolateBox::read_metrics(&meta_path).await.status, Status::Cf);
    }

    #[tokio::test]
    async fn test_drop_cleans_up_unreleased_box() {
        let fake = fake_isolate(6);
        let box_path = {
            let mut sandbox = fake.isolate.sandbox(vec![]);
            sandbox.acquire().await.unwrap();
            sandbox.box_path().unwrap().to_path_buf()
        };

        assert!(!box_path.exists());
    }
}
