use std::panic;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use isolate_judge::{
    config::SandboxConfig,
    core::{
        errors::SubmitError, executable::Compilable, pipeline::worker::Worker,
        traits::job::JobSource, verdict::Report,
    },
    package::PackageLoader,
};

const SUBMISSION_ID: &str = "local";

/// Judges one submission against a local problem package and prints the
/// report as JSON.
#[derive(Parser, Debug)]
#[command(name = "isolate-judge", version)]
struct Cli {
    /// Path to the package's problem.json.
    #[arg(long)]
    manifest: PathBuf,

    /// Submission source file.
    #[arg(long)]
    source: PathBuf,

    /// Compile command template, `{0}` is the source and `{1}` the artifact.
    #[arg(long)]
    compile_command: Option<String>,

    /// Run command template, `{0}` is the program and `{1}` its arguments.
    #[arg(long)]
    run_command: Option<String>,

    #[command(flatten)]
    sandbox: SandboxConfig,
}

/// Hands out a single submission and prints whatever is reported for it.
#[derive(Debug)]
struct SingleJob {
    pending: Mutex<Option<String>>,
}

#[async_trait::async_trait]
impl JobSource for SingleJob {
    async fn next_job(&self) -> Option<String> {
        self.pending.lock().ok().and_then(|mut pending| pending.take())
    }

    async fn submit(&self, submission_id: &str, report: &Report) -> Result<(), SubmitError> {
        let json = report.to_json().map_err(|e| SubmitError {
            submission_id: submission_id.to_string(),
            msg: e.to_string(),
        })?;
        println!("{}", json);
        Ok(())
    }
}

#[tokio::main]
#[tracing::instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    set_panic_hook();

    let cli = Cli::parse();
    let isolate = Arc::new(cli.sandbox.isolate()?);
    let trusted = Arc::new(cli.sandbox.trusted());

    let mut loader = PackageLoader::new(cli.manifest, trusted);
    loader.add_submission(
        SUBMISSION_ID,
        Compilable::new(cli.source, cli.compile_command, cli.run_command),
    );
    let source = Arc::new(SingleJob {
        pending: Mutex::new(Some(SUBMISSION_ID.to_string())),
    });

    let worker = Worker::new(source, loader, isolate);
    let processed = worker.run().await;
    tracing::debug!(processed, "Worker finished");

    Ok(())
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
