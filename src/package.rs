//! Problem packages on the local filesystem.
//!
//! A package is a directory with a `problem.json` manifest:
//!
//! ```json
//! {
//!   "limits": {"time_ms": 1000, "memory_kb": 262144, "real_time_ms": 2000},
//!   "checker": {"protocol": "testlib", "source": "check.cpp",
//!               "compile_command": "g++ -O2 -o {1} {0}", "run_command": "{0} {1}"},
//!   "testset": {"rules": "icpc", "tests": [
//!     {"number": 1, "input": {"file": "tests/01"}, "answer": {"text": "3"}}
//!   ]}
//! }
//! ```
//!
//! Relative paths are resolved against the manifest's directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::{
    core::{
        checker::{Checker, CheckerProtocol},
        domain::{Limits, TestData},
        errors::{CompileError, JudgeError},
        executable::Compilable,
        pipeline::judging::{Problem, Suite},
        testset::{IcpcTestSet, Test, TestSet},
        traits::job::{Job, ProblemLoader},
    },
    sandbox::Trusted,
};

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("failed to build checker: {0}")]
    Checker(#[from] CompileError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rules {
    Icpc,
    Plain,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CheckerManifest {
    pub protocol: CheckerProtocol,
    pub source: PathBuf,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub compile_command: Option<String>,
    #[serde(default)]
    pub run_command: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TestManifest {
    pub number: u32,
    pub input: TestData,
    pub answer: TestData,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TestSetManifest {
    pub rules: Rules,
    pub tests: Vec<TestManifest>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Manifest {
    pub limits: Limits,
    pub checker: CheckerManifest,
    pub testset: TestSetManifest,
}

impl Manifest {
    pub async fn read(path: &Path) -> Result<Self, PackageError> {
        let contents = tokio::fs::read(path)
            .await
            .map_err(|source| PackageError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(serde_json::from_slice(&contents)?)
    }
}

fn resolve_data(dir: &Path, data: TestData) -> TestData {
    match data {
        TestData::File(path) => TestData::File(dir.join(path)),
        text => text,
    }
}

/// Reads the manifest at `path` and builds the problem, compiling its
/// checker under `trusted`.
#[tracing::instrument(skip(trusted))]
pub async fn load_problem(
    path: &Path,
    trusted: Arc<Trusted>,
) -> Result<Problem<Trusted>, PackageError> {
    let manifest = Manifest::read(path).await?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let checker = manifest.checker;
    let executable = Compilable::new(
        dir.join(&checker.source),
        checker.compile_command,
        checker.run_command,
    )
    .compile(trusted)
    .await?
    .with_files(checker.files.iter().map(|file| dir.join(file)));

    let tests = manifest
        .testset
        .tests
        .into_iter()
        .map(|test| {
            Test::new(
                test.number,
                resolve_data(dir, test.input),
                resolve_data(dir, test.answer),
            )
        })
        .collect();
    let suite = match manifest.testset.rules {
        Rules::Icpc => Suite::Icpc(IcpcTestSet::new(tests)),
        Rules::Plain => Suite::Plain(TestSet::new(tests)),
    };

    tracing::info!(rules = ?manifest.testset.rules, "Problem loaded");
    Ok(Problem {
        suite,
        checker: Checker::new(executable, checker.protocol),
        limits: manifest.limits,
    })
}

/// Serves submissions registered up front against one local package.
#[derive(Debug)]
pub struct PackageLoader {
    manifest: PathBuf,
    trusted: Arc<Trusted>,
    submissions: HashMap<String, Compilable>,
}

impl PackageLoader {
    pub fn new(manifest: impl Into<PathBuf>, trusted: Arc<Trusted>) -> Self {
        Self {
            manifest: manifest.into(),
            trusted,
            submissions: HashMap::new(),
        }
    }

    pub fn add_submission(&mut self, submission_id: impl Into<String>, submission: Compilable) {
        self.submissions.insert(submission_id.into(), submission);
    }
}

#[async_trait::async_trait]
impl ProblemLoader for PackageLoader {
    type Checking = Trusted;

    async fn load(&self, submission_id: &str) -> Result<Job<Trusted>, JudgeError> {
        let load_error = |msg: String| JudgeError::Load {
            submission_id: submission_id.to_string(),
            msg,
        };
        let submission = self
            .submissions
            .get(submission_id)
            .cloned()
            .ok_or_else(|| load_error("unknown submission".to_string()))?;
        let problem = load_problem(&self.manifest, self.trusted.clone())
            .await
            .map_err(|e| load_error(e.to_string()))?;
        Ok(Job {
            submission,
            problem,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::{
        domain::{Metrics, Status},
        pipeline::judging::judge_submission,
        verdict::{Report, Verdict},
    };
    use crate::stubs::sandbox::StubIsolation;

    const CHECKER: &str = r#"
expected=$(cat "$3")
if [ "$(cat "$2")" = "$expected" ]; then
    echo "ok" > "$4"
    exit 0
fi
echo "expected $expected" > "$4"
exit 1
"#;

    fn package(rules: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("tests")).unwrap();
        std::fs::write(dir.path().join("tests/01"), "1 2").unwrap();
        std::fs::write(dir.path().join("check.sh"), CHECKER).unwrap();
        let manifest = json!({
            "limits": {"time_ms": 1000, "memory_kb": 65536, "real_time_ms": 2000},
            "checker": {"protocol": "testlib", "source": "check.sh", "run_command": "sh {0} {1}"},
            "testset": {"rules": rules, "tests": [
                {"number": 1, "input": {"file": "tests/01"}, "answer": {"text": "3"}},
                {"number": 2, "input": {"text": "1 -1"}, "answer": {"text": "0"}},
            ]},
        });
        std::fs::write(dir.path().join("problem.json"), manifest.to_string()).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_load_problem_resolves_paths() {
        let dir = package("icpc");
        let root = tempfile::tempdir().unwrap();

        let problem = load_problem(
            &dir.path().join("problem.json"),
            Arc::new(Trusted::new(root.path())),
        )
        .await
        .unwrap();

        assert_eq!(problem.limits, Limits::new(1000, 65536, 2000));
        assert_eq!(problem.checker.protocol(), CheckerProtocol::Testlib);
        let Suite::Icpc(tests) = &problem.suite else {
            panic!("expected icpc rules");
        };
        assert_eq!(
            tests.tests()[0].input,
            TestData::File(dir.path().join("tests/01"))
        );
        assert_eq!(tests.tests()[1].input, TestData::from("1 -1"));
    }

    #[tokio::test]
    async fn test_plain_rules() {
        let dir = package("plain");

        let problem = load_problem(&dir.path().join("problem.json"), Arc::new(Trusted::default()))
            .await
            .unwrap();

        assert!(matches!(problem.suite, Suite::Plain(ref tests) if tests.len() == 2));
    }

    #[tokio::test]
    async fn test_invalid_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("problem.json");

        let missing = load_problem(&path, Arc::new(Trusted::default())).await;
        assert!(matches!(missing, Err(PackageError::Read { .. })));

        std::fs::write(&path, r#"{"limits": {}}"#).unwrap();
        let invalid = load_problem(&path, Arc::new(Trusted::default())).await;
        assert!(matches!(invalid, Err(PackageError::Manifest(_))));
    }

    #[tokio::test]
    async fn test_loader_judges_registered_submission() {
        let dir = package("icpc");
        let root = tempfile::tempdir().unwrap();
        let source = dir.path().join("solution.py");
        std::fs::write(&source, "").unwrap();
        let mut loader =
            PackageLoader::new(dir.path().join("problem.json"), Arc::new(Trusted::new(root.path())));
        loader.add_submission("42", Compilable::new(&source, None, None));

        let unknown = loader.load("43").await;
        assert!(matches!(unknown, Err(JudgeError::Load { .. })));

        let Job {
            submission,
            mut problem,
        } = loader.load("42").await.unwrap();
        let stub = Arc::new(StubIsolation::new(
            Metrics::new(1, 2, 3, Status::Ok),
            b"3".to_vec(),
        ));
        let report = judge_submission(&submission, &mut problem, stub).await.unwrap();

        let Report::Verdict(Verdict::Icpc(verdict)) = report else {
            panic!("expected icpc report, got {:?}", report);
        };
        assert_eq!(verdict.status, "wa");
        assert_eq!(verdict.first_test_failed, Some(2));
    }
}
