use std::path::PathBuf;

/// Failures of the sandboxing infrastructure itself. Outcomes of the
/// confined program are never reported through this type.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox used before it was acquired")]
    NotAcquired,

    #[error("failed to initialise sandbox: {msg}")]
    Init { msg: String },

    #[error("invalid command {command:?}")]
    InvalidCommand { command: String },

    #[error("sandbox io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("compilation finished with status {status}")]
    Failed { status: String },

    #[error("compiler did not produce {}", path.display())]
    MissingArtifact { path: PathBuf },

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("failed to store artifact: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum TestSetError {
    #[error("test {number} has no verdict recorded")]
    NoVerdict { number: u32 },

    #[error("test {number} already has a verdict")]
    VerdictAlreadyRecorded { number: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("malformed judgement: {msg}")]
    MalformedJudgement { msg: String },

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    TestSet(#[from] TestSetError),

    #[error("checker io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Any fault that aborts judging of a submission.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Check(#[from] CheckError),

    #[error(transparent)]
    TestSet(#[from] TestSetError),

    #[error("failed to load job {submission_id}: {msg}")]
    Load { submission_id: String, msg: String },

    #[error("test set finished without an aggregate verdict")]
    Unfinished,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to submit report for {submission_id}: {msg}")]
pub struct SubmitError {
    pub submission_id: String,
    pub msg: String,
}
