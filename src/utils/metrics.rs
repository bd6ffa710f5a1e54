use std::collections::BTreeMap;
use std::time::Instant;
use serde::{Serialize, Deserialize};

use crate::probe::target::CategoryResult;

/// Aggregate fetch metrics for one run
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RunMetrics {
    /// Targets attempted
    pub total_requests: usize,

    /// Bytes received across all bodies
    pub bytes_downloaded: usize,

    /// Wall time spent on targets, pacing included
    pub total_elapsed_ms: u64,

    /// Slowest target and its time
    pub slowest: Option<(String, u64)>,

    /// HTTP status code counts, for targets where the server answered
    pub status_codes: BTreeMap<u16, usize>,
}

impl RunMetrics {
    /// Record one finished target
    pub fn record(&mut self, result: &CategoryResult) {
        self.total_requests += 1;
        self.bytes_downloaded += result.body_bytes.unwrap_or(0);
        self.total_elapsed_ms += result.elapsed_ms;

        let slower = self.slowest
            .as_ref()
            .map_or(true, |(_, ms)| result.elapsed_ms > *ms);
        if slower {
            self.slowest = Some((result.category.clone(), result.elapsed_ms));
        }

        if let Some(code) = result.status_code {
            *self.status_codes.entry(code).or_default() += 1;
        }
    }

    pub fn from_results(results: &[CategoryResult]) -> Self {
        let mut metrics = Self::default();
        for result in results {
            metrics.record(result);
        }
        metrics
    }
}

/// Request timer for measuring target durations
pub struct RequestTimer {
    /// Start time of the request
    start: Instant,
}

impl RequestTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// End timing and get the duration in milliseconds
    pub fn end(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::discovery::DiscoveryReport;
    use crate::probe::fetcher::FetchError;
    use crate::probe::target::CategoryOutcome;

    fn result(category: &str, elapsed_ms: u64, outcome: CategoryOutcome, body_bytes: Option<usize>) -> CategoryResult {
        let status_code = match &outcome {
            CategoryOutcome::Succeeded(_) => Some(200),
            CategoryOutcome::Failed(reason) => reason.status_code,
        };
        CategoryResult {
            status_code,
            category: category.to_string(),
            url: format!("https://example.com/{}/", category),
            timestamp: Utc::now(),
            elapsed_ms,
            body_bytes,
            outcome,
        }
    }

    #[test]
    fn metrics_aggregate_results() {
        let results = vec![
            result("circulares", 2500, CategoryOutcome::Succeeded(DiscoveryReport::default()), Some(40_000)),
            result("oficios", 4100, CategoryOutcome::Failed(FetchError::Http { status_code: 403 }.into()), None),
            result("dictamenes", 3000, CategoryOutcome::Failed(FetchError::TooSmall { body_bytes: 500, min_bytes: 1000 }.into()), Some(500)),
            result("jurisprudencia", 1200, CategoryOutcome::Failed(FetchError::Connection("refused".into()).into()), None),
        ];
        let metrics = RunMetrics::from_results(&results);

        assert_eq!(metrics.total_requests, 4);
        assert_eq!(metrics.bytes_downloaded, 40_500);
        assert_eq!(metrics.total_elapsed_ms, 10_800);
        assert_eq!(metrics.slowest, Some(("oficios".to_string(), 4100)));
        assert_eq!(metrics.status_codes.get(&200), Some(&2));
        assert_eq!(metrics.status_codes.get(&403), Some(&1));
        assert_eq!(metrics.status_codes.len(), 2);
    }

    #[test]
    fn timer_measures_elapsed_time() {
        let timer = RequestTimer::start();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.end() >= 5);
    }
}
