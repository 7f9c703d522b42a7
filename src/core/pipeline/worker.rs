use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::core::{
    domain::Metrics,
    errors::JudgeError,
    pipeline::judging::judge_submission,
    traits::{
        job::{Job, JobSource, ProblemLoader},
        sandbox::{Isolation, Sandbox},
    },
    verdict::Report,
};

/// Consumes jobs one at a time until the source runs dry. A failing or
/// panicking job is reported as a judge error and never stops the loop.
#[derive(Debug)]
pub struct Worker<L, S> {
    source: Arc<dyn JobSource>,
    loader: L,
    isolation: Arc<S>,
}

impl<L, S> Worker<L, S>
where
    L: ProblemLoader,
    S: Isolation,
    S::Sandbox: Sandbox<Outcome = Metrics>,
{
    pub fn new(source: Arc<dyn JobSource>, loader: L, isolation: Arc<S>) -> Self {
        Self {
            source,
            loader,
            isolation,
        }
    }

    /// Returns the number of jobs processed.
    #[tracing::instrument(skip_all)]
    pub async fn run(&self) -> usize {
        let mut processed = 0;
        while let Some(submission_id) = self.source.next_job().await {
            let report = self.judge(&submission_id).await;
            if let Err(e) = self.source.submit(&submission_id, &report).await {
                tracing::error!(error = %e, "Failed to submit report");
            }
            processed += 1;
        }
        tracing::info!(processed, "Job source exhausted");
        processed
    }

    #[tracing::instrument(skip(self))]
    async fn judge(&self, submission_id: &str) -> Report {
        match AssertUnwindSafe(self.try_judge(submission_id))
            .catch_unwind()
            .await
        {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Judging failed");
                Report::JudgeError
            }
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|msg| msg.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                tracing::error!(panic = %msg, "Judging panicked");
                Report::JudgeError
            }
        }
    }

    async fn try_judge(&self, submission_id: &str) -> Result<Report, JudgeError> {
        let Job {
            submission,
            mut problem,
        } = self.loader.load(submission_id).await?;
        judge_submission(&submission, &mut problem, self.isolation.clone()).await
    }
}
