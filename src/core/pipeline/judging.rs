use std::sync::Arc;

use crate::core::{
    checker::Checker,
    domain::{Limits, Metrics},
    errors::JudgeError,
    executable::Compilable,
    testset::{IcpcTestSet, TestSet, TestSuite},
    traits::sandbox::{Isolation, Sandbox},
    verdict::{Report, Verdict},
};

/// Grading rules of a problem's tests.
#[derive(Debug)]
pub enum Suite {
    /// Every test is judged, verdicts are reported one per test.
    Plain(TestSet),
    Icpc(IcpcTestSet),
}

impl Suite {
    fn tests_mut(&mut self) -> &mut dyn TestSuite {
        match self {
            Suite::Plain(tests) => tests,
            Suite::Icpc(tests) => tests,
        }
    }

    /// Report of a fully iterated suite.
    fn report(&self) -> Option<Report> {
        match self {
            Suite::Plain(tests) => Some(Report::PerTest(tests.verdicts())),
            Suite::Icpc(tests) => tests
                .verdict()
                .map(|verdict| Report::Verdict(Verdict::Icpc(verdict.clone()))),
        }
    }
}

#[derive(Debug)]
pub struct Problem<C: Isolation> {
    pub suite: Suite,
    pub checker: Checker<C>,
    pub limits: Limits,
}

/// Compiles `submission` under `isolation` and judges it on every test of
/// `problem`, one test at a time.
#[tracing::instrument(skip_all, fields(file = %submission.file.display()))]
pub async fn judge_submission<S, C>(
    submission: &Compilable,
    problem: &mut Problem<C>,
    isolation: Arc<S>,
) -> Result<Report, JudgeError>
where
    S: Isolation,
    S::Sandbox: Sandbox<Outcome = Metrics>,
    C: Isolation,
{
    let executable = submission.compile(isolation).await?;

    let Problem {
        suite,
        checker,
        limits,
    } = problem;
    let tests = suite.tests_mut();
    tests.rewind();
    while let Some(test) = tests.advance()? {
        checker.eval(&executable, test, limits).await?;
    }

    let report = suite.report().ok_or(JudgeError::Unfinished)?;
    match &report {
        Report::Verdict(verdict) => tracing::info!(status = verdict.status(), "Submission judged"),
        _ => tracing::info!(report = ?report, "Submission judged"),
    }
    Ok(report)
}
