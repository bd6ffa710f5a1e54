use tracing::debug;

use crate::probe::fetcher::{FetchError, FetchOutcome};

/// Rejects pages too small to be a real listing
#[derive(Debug, Clone, Copy)]
pub struct ContentValidator {
    min_body_bytes: usize,
}

impl ContentValidator {
    pub fn new(min_body_bytes: usize) -> Self {
        Self { min_body_bytes }
    }

    /// A 200 with a tiny body is treated as a soft block (challenge page, empty shell).
    /// Every other outcome passes through untouched.
    pub fn validate(&self, outcome: FetchOutcome) -> FetchOutcome {
        match outcome {
            Ok(page) if page.status_code == 200 && page.body_bytes() < self.min_body_bytes => {
                debug!(
                    "Body of {} is {} bytes, below the {} byte minimum",
                    page.final_url,
                    page.body_bytes(),
                    self.min_body_bytes
                );
                Err(FetchError::TooSmall {
                    body_bytes: page.body_bytes(),
                    min_bytes: self.min_body_bytes,
                })
            }
            other => other,
        }
    }
}
