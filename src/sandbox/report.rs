use std::collections::HashMap;

use crate::core::domain::{Metrics, Status};

/// Parses the `key:value` usage report isolate writes with `--meta`.
///
/// Returns `None` when a required key is missing or malformed; the caller
/// classifies that as a sandbox failure.
pub fn parse_usage_report(report: &str) -> Option<Metrics> {
    let properties: HashMap<&str, &str> = report
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect();

    let time_ms = seconds_to_ms(properties.get("time")?)?;
    let real_time_ms = seconds_to_ms(properties.get("time-wall")?)?;
    let memory_kb = properties.get("max-rss")?.parse().ok()?;
    let status = properties
        .get("status")
        .map(|designation| Status::from_report(designation))
        .unwrap_or(Status::Ok);

    Some(Metrics::new(time_ms, memory_kb, real_time_ms, status))
}

fn seconds_to_ms(value: &str) -> Option<u64> {
    let seconds: f64 = value.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some((seconds * 1000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_successful_run() {
        let report = "time:0.011\ntime-wall:0.052\nmax-rss:3320\ncsw-voluntary:3\nexitcode:0\n";

        let metrics = parse_usage_report(report).unwrap();

        assert_eq!(metrics, Metrics::new(11, 3320, 52, Status::Ok));
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_parse_abnormal_statuses() {
        let cases = [
            ("RE", Status::Re),
            ("SG", Status::Ml),
            ("TO", Status::Tl),
            ("XX", Status::Cf),
        ];

        for (designation, expected) in cases {
            let report = format!(
                "time:1.000\ntime-wall:1.500\nmax-rss:100\nstatus:{}\nmessage:Something\n",
                designation
            );
            let metrics = parse_usage_report(&report).unwrap();
            assert_eq!(metrics.status, expected);
            assert_eq!(metrics.time_ms, 1000);
            assert_eq!(metrics.real_time_ms, 1500);
        }
    }

    #[test]
    fn test_parse_missing_required_key() {
        assert!(parse_usage_report("time:0.1\nmax-rss:10\n").is_none());
        assert!(parse_usage_report("").is_none());
        assert!(parse_usage_report("time:abc\ntime-wall:0.1\nmax-rss:10\n").is_none());
    }
}
