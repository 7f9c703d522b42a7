use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::core::domain::Metrics;

/// Verdict of one judged test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TestVerdict {
    pub status: String,
    pub metrics: Metrics,
}

impl TestVerdict {
    pub fn new(status: impl Into<String>, metrics: Metrics) -> Self {
        Self {
            status: status.into().to_lowercase(),
            metrics,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Aggregate verdict of a test set graded by ICPC rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IcpcVerdict {
    pub status: String,
    pub per_test_verdicts: Vec<TestVerdict>,
    /// Ordinal of the first failing test, absent when every test passed.
    pub first_test_failed: Option<u32>,
}

impl IcpcVerdict {
    pub fn accepted(per_test_verdicts: Vec<TestVerdict>) -> Self {
        Self {
            status: "ok".to_string(),
            per_test_verdicts,
            first_test_failed: None,
        }
    }

    pub fn failed(status: &str, per_test_verdicts: Vec<TestVerdict>, test_number: u32) -> Self {
        Self {
            status: status.to_string(),
            per_test_verdicts,
            first_test_failed: Some(test_number),
        }
    }
}

impl Serialize for IcpcVerdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("IcpcVerdict", 3)?;
        state.serialize_field("format", "icpc")?;
        state.serialize_field("first_test_failed", &self.first_test_failed)?;
        state.serialize_field("per_test_metrics", &self.per_test_verdicts)?;
        state.end()
    }
}

/// Closed set of verdict kinds handed to the serializer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Test(TestVerdict),
    Icpc(IcpcVerdict),
}

impl Verdict {
    pub fn status(&self) -> &str {
        match self {
            Verdict::Test(verdict) => &verdict.status,
            Verdict::Icpc(verdict) => &verdict.status,
        }
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Verdict::Test(verdict) => verdict.serialize(serializer),
            Verdict::Icpc(verdict) => verdict.serialize(serializer),
        }
    }
}

impl From<TestVerdict> for Verdict {
    fn from(verdict: TestVerdict) -> Self {
        Verdict::Test(verdict)
    }
}

impl From<IcpcVerdict> for Verdict {
    fn from(verdict: IcpcVerdict) -> Self {
        Verdict::Icpc(verdict)
    }
}

/// What a worker reports back for one submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Report {
    Verdict(Verdict),
    PerTest(Vec<TestVerdict>),
    JudgeError,
}

impl Report {
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Report::Verdict(verdict) => verdict.serialize(serializer),
            Report::PerTest(verdicts) => verdicts.serialize(serializer),
            Report::JudgeError => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("format", "judge_error")?;
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::domain::Status;

    fn ok_verdict() -> TestVerdict {
        TestVerdict::new("ok", Metrics::new(10, 1, 1, Status::Ok))
    }

    #[test]
    fn test_serialize_test_verdict() {
        let value = serde_json::to_value(Verdict::Test(ok_verdict())).unwrap();

        assert_eq!(
            value,
            json!({
                "status": "ok",
                "metrics": {"time_ms": 10, "memory_kb": 1, "real_time_ms": 1, "status": "ok"}
            })
        );
    }

    #[test]
    fn test_serialize_icpc_verdict() {
        let failed = TestVerdict::new("WA", Metrics::new(20, 2, 3, Status::Ok));
        let verdict = IcpcVerdict::failed("wa", vec![ok_verdict(), failed], 2);

        let value = serde_json::to_value(Verdict::Icpc(verdict)).unwrap();

        assert_eq!(value["format"], "icpc");
        assert_eq!(value["first_test_failed"], 2);
        assert_eq!(value["per_test_metrics"].as_array().unwrap().len(), 2);
        assert_eq!(value["per_test_metrics"][1]["status"], "wa");
        assert_eq!(value["per_test_metrics"][1]["metrics"]["real_time_ms"], 3);
    }

    #[test]
    fn test_verdict_status() {
        let failed = TestVerdict::new("TL", Metrics::new(20, 2, 3, Status::Tl));

        assert_eq!(Verdict::from(failed.clone()).status(), "tl");
        assert_eq!(
            Verdict::from(IcpcVerdict::failed("tl", vec![failed], 1)).status(),
            "tl"
        );
        assert_eq!(Verdict::from(IcpcVerdict::accepted(vec![])).status(), "ok");
    }

    #[test]
    fn test_accepted_icpc_verdict_has_null_failure() {
        let value = serde_json::to_value(IcpcVerdict::accepted(vec![ok_verdict()])).unwrap();

        assert!(value["first_test_failed"].is_null());
    }

    #[test]
    fn test_serialize_reports() {
        assert_eq!(
            Report::JudgeError.to_json().unwrap(),
            json!({"format": "judge_error"})
        );

        let per_test = Report::PerTest(vec![ok_verdict(), ok_verdict()])
            .to_json()
            .unwrap();
        assert_eq!(per_test.as_array().unwrap().len(), 2);
        assert_eq!(per_test[0]["metrics"]["time_ms"], 10);
    }
}
