use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Resource constraints for one sandboxed execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub time_ms: u64,
    pub memory_kb: u64,
    pub real_time_ms: u64,
}

impl Limits {
    pub fn new(time_ms: u64, memory_kb: u64, real_time_ms: u64) -> Self {
        Self {
            time_ms,
            memory_kb,
            real_time_ms,
        }
    }
}

/// Outcome classification of a confined run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    /// Runtime error or non-zero exit.
    Re,
    /// Killed by a signal, reported as memory limit exceeded.
    Ml,
    /// CPU or wall time limit exceeded.
    Tl,
    /// Sandbox or system failure.
    Cf,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Re => "re",
            Status::Ml => "ml",
            Status::Tl => "tl",
            Status::Cf => "cf",
        }
    }

    /// Maps a `status` designation of the isolate usage report.
    pub fn from_report(designation: &str) -> Self {
        match designation {
            "RE" => Status::Re,
            "SG" => Status::Ml,
            "TO" => Status::Tl,
            _ => Status::Cf,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measured resource usage of one sandboxed run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub time_ms: u64,
    pub memory_kb: u64,
    pub real_time_ms: u64,
    pub status: Status,
}

impl Metrics {
    pub fn new(time_ms: u64, memory_kb: u64, real_time_ms: u64, status: Status) -> Self {
        Self {
            time_ms,
            memory_kb,
            real_time_ms,
            status,
        }
    }

    /// Metrics of a run whose usage could not be measured.
    pub fn failed() -> Self {
        Self::new(0, 0, 0, Status::Cf)
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckerJudgement {
    pub status: String,
    pub message: Option<String>,
}

impl CheckerJudgement {
    pub fn new(status: impl Into<String>, message: Option<String>) -> Self {
        Self {
            status: status.into(),
            message,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.to_lowercase() == "ok"
    }
}

/// Input or answer of a test: inline text or a file of the problem package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestData {
    Text(String),
    File(PathBuf),
}

impl TestData {
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        match self {
            TestData::Text(text) => Ok(text.clone().into_bytes()),
            TestData::File(path) => tokio::fs::read(path).await,
        }
    }
}

impl From<&str> for TestData {
    fn from(text: &str) -> Self {
        TestData::Text(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_designations() {
        assert_eq!(Status::from_report("RE"), Status::Re);
        assert_eq!(Status::from_report("SG"), Status::Ml);
        assert_eq!(Status::from_report("TO"), Status::Tl);
        assert_eq!(Status::from_report("XX"), Status::Cf);
        assert_eq!(Status::from_report("??"), Status::Cf);
    }

    #[test]
    fn test_judgement_status_is_case_insensitive() {
        assert!(CheckerJudgement::new("OK", None).is_ok());
        assert!(CheckerJudgement::new("ok", None).is_ok());
        assert!(!CheckerJudgement::new("wa", None).is_ok());
    }

    #[tokio::test]
    async fn test_read_test_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.in");
        tokio::fs::write(&path, "1 2\n").await.unwrap();

        assert_eq!(TestData::File(path).read().await.unwrap(), b"1 2\n");
        assert_eq!(TestData::from("3").read().await.unwrap(), b"3");
    }
}
