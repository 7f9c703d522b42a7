use crate::core::{
    errors::{JudgeError, SubmitError},
    executable::Compilable,
    pipeline::judging::Problem,
    traits::sandbox::Isolation,
    verdict::Report,
};

/// Queue side of the worker: hands out submission ids and accepts reports.
#[mockall::automock]
#[async_trait::async_trait]
pub trait JobSource: std::fmt::Debug + Send + Sync {
    /// `None` once there is nothing more to judge.
    async fn next_job(&self) -> Option<String>;

    async fn submit(&self, submission_id: &str, report: &Report) -> Result<(), SubmitError>;
}

/// Everything needed to judge one submission.
#[derive(Debug)]
pub struct Job<C: Isolation> {
    pub submission: Compilable,
    pub problem: Problem<C>,
}

#[async_trait::async_trait]
pub trait ProblemLoader: std::fmt::Debug + Send + Sync {
    /// Isolation the problem's checker runs under.
    type Checking: Isolation;

    async fn load(&self, submission_id: &str) -> Result<Job<Self::Checking>, JudgeError>;
}
