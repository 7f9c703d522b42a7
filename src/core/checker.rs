use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use uuid::Uuid;

use crate::core::{
    domain::{CheckerJudgement, Limits, Metrics},
    errors::CheckError,
    executable::{Executable, Invocation},
    testset::Test,
    traits::sandbox::{Isolation, RunOutcome, Sandbox},
    verdict::TestVerdict,
};

/// How a checker reports its decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckerProtocol {
    /// The judgement file carries a `status` line.
    Custom,
    /// The checker's own termination decides; the judgement file is only
    /// a message.
    Testlib,
}

/// Parses newline separated `key: value` pairs.
fn parse_judgement(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

#[derive(Debug)]
pub struct Checker<I: Isolation> {
    executable: Executable<I>,
    protocol: CheckerProtocol,
}

impl<I: Isolation> Checker<I> {
    pub fn new(executable: Executable<I>, protocol: CheckerProtocol) -> Self {
        Self {
            executable,
            protocol,
        }
    }

    pub fn protocol(&self) -> CheckerProtocol {
        self.protocol
    }

    /// Judges `output` against `answer` for the given `input`.
    #[tracing::instrument(skip_all, fields(protocol = ?self.protocol))]
    pub async fn check(
        &self,
        input: &[u8],
        output: &[u8],
        answer: &[u8],
    ) -> Result<CheckerJudgement, CheckError> {
        let dir = tempfile::tempdir()?;
        let prefix = Uuid::new_v4().simple().to_string();
        let names = ["input", "output", "answer", "judgement"]
            .map(|role| format!("{}-{}.txt", prefix, role));
        let paths: Vec<PathBuf> = names.iter().map(|name| dir.path().join(name)).collect();

        let empty: &[u8] = &[];
        for (path, data) in paths.iter().zip([input, output, answer, empty]) {
            tokio::fs::write(path, data).await?;
        }

        let judgement_name = names[3].clone();
        let finished = self
            .executable
            .run(
                Invocation::new()
                    .files(paths)
                    .args(names)
                    .collect(judgement_name.clone()),
            )
            .await?;
        let contents = finished
            .collected
            .get(&judgement_name)
            .map(|data| String::from_utf8_lossy(data).into_owned());

        let judgement = match self.protocol {
            CheckerProtocol::Custom => {
                let contents = contents.ok_or_else(|| CheckError::MalformedJudgement {
                    msg: "checker removed its judgement file".to_string(),
                })?;
                let mut properties = parse_judgement(&contents);
                let status = properties.remove("status").ok_or_else(|| {
                    CheckError::MalformedJudgement {
                        msg: format!("no status in {:?}", contents),
                    }
                })?;
                CheckerJudgement::new(status.to_lowercase(), properties.remove("message"))
            }
            CheckerProtocol::Testlib => {
                let status = if finished.outcome.is_ok() { "ok" } else { "wa" };
                CheckerJudgement::new(status, Some(contents.unwrap_or_default()))
            }
        };

        tracing::debug!(?judgement, outcome = ?finished.outcome, "Checker finished");
        Ok(judgement)
    }

    /// Runs `submission` on `test` under `limits`, judges its output and
    /// records the verdict on the test. A submission that does not
    /// terminate normally is never checked.
    #[tracing::instrument(skip_all, fields(test = test.number))]
    pub async fn eval<S>(
        &self,
        submission: &Executable<S>,
        test: &mut Test,
        limits: &Limits,
    ) -> Result<(), CheckError>
    where
        S: Isolation,
        S::Sandbox: Sandbox<Outcome = Metrics>,
    {
        let input = test.input.read().await?;
        let finished = submission
            .run(
                Invocation::new()
                    .stdin(input.clone())
                    .capture_stdout()
                    .limits(limits.clone()),
            )
            .await?;
        let metrics = finished.outcome;

        if !metrics.is_ok() {
            tracing::info!(status = %metrics.status, "Submission did not terminate normally");
            test.record_verdict(TestVerdict::new(metrics.status.as_str(), metrics))?;
            return Ok(());
        }

        let answer = test.answer.read().await?;
        let judgement = self.check(&input, &finished.stdout, &answer).await?;
        tracing::info!(status = %judgement.status, "Test judged");
        test.record_verdict(TestVerdict::new(judgement.status, metrics))?;
        Ok(())
    }
}
