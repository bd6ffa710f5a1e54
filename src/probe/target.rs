use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::discovery::DiscoveryReport;
use crate::probe::fetcher::{FailureKind, FetchError};
use crate::utils::metrics::RunMetrics;

/// One listing page to probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Category name, unique within a run
    pub category: String,

    /// Listing page URL
    pub url: String,
}

/// Why a target could not be analysed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,

    /// HTTP status code, when the server answered
    pub status_code: Option<u16>,

    pub message: String,
}

impl From<&FetchError> for FailureReason {
    fn from(error: &FetchError) -> Self {
        let status_code = match error {
            FetchError::Http { status_code } => Some(*status_code),
            // Only a 200 response is ever checked for size
            FetchError::TooSmall { .. } => Some(200),
            _ => None,
        };

        Self {
            kind: error.kind(),
            status_code,
            message: error.to_string(),
        }
    }
}

impl From<FetchError> for FailureReason {
    fn from(error: FetchError) -> Self {
        Self::from(&error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CategoryOutcome {
    Succeeded(DiscoveryReport),
    Failed(FailureReason),
}

/// Outcome of probing one target. Built once by the runner and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryResult {
    pub category: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,

    /// Time spent on pacing, fetch, validation and discovery
    pub elapsed_ms: u64,

    /// HTTP status the server answered with, when it answered
    pub status_code: Option<u16>,

    /// Size of the fetched body, when one was received
    pub body_bytes: Option<usize>,

    pub outcome: CategoryOutcome,
}

impl CategoryResult {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, CategoryOutcome::Succeeded(_))
    }

    #[cfg(test)]
    pub fn report(&self) -> Option<&DiscoveryReport> {
        match &self.outcome {
            CategoryOutcome::Succeeded(report) => Some(report),
            CategoryOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.outcome {
            CategoryOutcome::Succeeded(_) => None,
            CategoryOutcome::Failed(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStatus {
    pub category: String,
    pub succeeded: bool,
    pub failure: Option<FailureKind>,
}

/// Counts derived from the results of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub per_category_status: Vec<CategoryStatus>,
}

impl RunSummary {
    pub fn from_results(results: &[CategoryResult]) -> Self {
        let per_category_status: Vec<CategoryStatus> = results.iter()
            .map(|result| CategoryStatus {
                category: result.category.clone(),
                succeeded: result.succeeded(),
                failure: result.failure().map(|reason| reason.kind),
            })
            .collect();

        let succeeded_count = per_category_status.iter().filter(|s| s.succeeded).count();

        Self {
            succeeded_count,
            failed_count: per_category_status.len() - succeeded_count,
            per_category_status,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded_count + self.failed_count
    }

    /// True when there was at least one target and none succeeded
    pub fn all_failed(&self) -> bool {
        self.total() > 0 && self.succeeded_count == 0
    }
}

/// Everything a run hands to the reporting sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<CategoryResult>,
    pub summary: RunSummary,
    pub metrics: RunMetrics,
}
