use chrono::Utc;
use tracing::{info, info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

use crate::cli::config::ProbeConfig;
use crate::discovery::{DiscoveryEngine, DiscoveryReport, HtmlPage};
use crate::probe::fetcher::{FetchError, FetchedPage, Fetcher};
use crate::probe::target::{CategoryOutcome, CategoryResult, FailureReason, ProbeRun, RunSummary, TargetSpec};
use crate::probe::validator::ContentValidator;
use crate::utils::metrics::{RequestTimer, RunMetrics};

/// Probes targets one after another: fetch, validate, discover.
///
/// A failing target is recorded and the run moves on; `run` always returns a
/// result per target, in input order.
pub struct ProbeRunner<F> {
    fetcher: F,
    validator: ContentValidator,
    engine: DiscoveryEngine,
}

impl<F: Fetcher> ProbeRunner<F> {
    pub fn new(fetcher: F, validator: ContentValidator, engine: DiscoveryEngine) -> Self {
        Self {
            fetcher,
            validator,
            engine,
        }
    }

    /// Runner with validator and engine configured from `config`
    pub fn from_config(fetcher: F, config: &ProbeConfig) -> Self {
        Self::new(
            fetcher,
            ContentValidator::new(config.validation.min_body_bytes),
            DiscoveryEngine::new(&config.discovery),
        )
    }

    pub async fn run(&self, targets: &[TargetSpec]) -> ProbeRun {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Starting probe run {} over {} targets", run_id, targets.len());

        let mut results = Vec::with_capacity(targets.len());

        // Sequential on purpose: the pacing delay only means something if requests never overlap
        for target in targets {
            let span = info_span!("target", run = %run_id, category = %target.category);
            results.push(self.probe_target(target).instrument(span).await);
        }

        let summary = RunSummary::from_results(&results);
        let metrics = RunMetrics::from_results(&results);
        info!(
            "Probe run {} finished: {} succeeded, {} failed",
            run_id, summary.succeeded_count, summary.failed_count
        );

        ProbeRun {
            run_id,
            started_at,
            finished_at: Utc::now(),
            results,
            summary,
            metrics,
        }
    }

    async fn probe_target(&self, target: &TargetSpec) -> CategoryResult {
        info!("Probing {}", target.url);
        let timer = RequestTimer::start();

        let fetched = self.fetcher.fetch(&target.url).await;
        let body_bytes = fetched.as_ref().ok().map(FetchedPage::body_bytes);
        let status_code = match &fetched {
            Ok(page) => Some(page.status_code),
            Err(FetchError::Http { status_code }) => Some(*status_code),
            Err(_) => None,
        };

        let outcome = match self.validator.validate(fetched) {
            Ok(page) => {
                let report = self.analyse(target, &page);
                info!(
                    "Found {} repeated elements ({}), {} links, {} PDFs",
                    report.repeated_element_count,
                    report.repeated_element_kind,
                    report.total_links,
                    report.pdf_links.len()
                );
                CategoryOutcome::Succeeded(report)
            }
            Err(error) => {
                warn!("{} failed: {}", target.category, error);
                CategoryOutcome::Failed(FailureReason::from(error))
            }
        };

        CategoryResult {
            category: target.category.clone(),
            url: target.url.clone(),
            timestamp: Utc::now(),
            elapsed_ms: timer.end(),
            status_code,
            body_bytes,
            outcome,
        }
    }

    /// Parse and analyse synchronously; the parsed tree never crosses an await
    fn analyse(&self, target: &TargetSpec, page: &FetchedPage) -> DiscoveryReport {
        let page_url = Url::parse(&page.final_url)
            .or_else(|_| Url::parse(&target.url))
            .ok();
        let document = HtmlPage::parse(&page.body_text());
        self.engine.discover(&document, page_url.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::engine::RepeatedElementKind;
    use crate::probe::fetcher::{FailureKind, MockFetcher};
    use mockall::Sequence;

    fn targets(categories: &[&str]) -> Vec<TargetSpec> {
        categories.iter()
            .map(|category| TargetSpec {
                category: category.to_string(),
                url: format!("https://www.supereduc.cl/categoria-normativa/{}/", category),
            })
            .collect()
    }

    fn article_page(url: &str) -> FetchedPage {
        let filler = "<p>Listado de documentos normativos vigentes.</p>".repeat(30);
        let html = format!(
            "<html><head><title>Normativa</title></head><body>{}<article><h2>Documento</h2><a href=\"/doc.pdf\">PDF</a></article></body></html>",
            filler
        );
        FetchedPage {
            status_code: 200,
            final_url: url.to_string(),
            body: html.into_bytes(),
        }
    }

    fn runner(fetcher: MockFetcher) -> ProbeRunner<MockFetcher> {
        ProbeRunner::from_config(fetcher, &ProbeConfig::default())
    }

    #[tokio::test]
    async fn mixed_run_matches_expected_summary() {
        let categories = ["circulares", "oficios", "dictamenes", "jurisprudencia", "resoluciones"];
        let failing = ["oficios", "jurisprudencia"];

        let mut fetcher = MockFetcher::new();
        let mut seq = Sequence::new();
        for target in targets(&categories) {
            let expected = target.url.clone();
            let connection_error = failing.iter().any(|c| *c == target.category);
            fetcher.expect_fetch()
                .withf(move |url| url == expected)
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |url| {
                    if connection_error {
                        Err(FetchError::Connection("connection refused".to_string()))
                    } else {
                        Ok(article_page(url))
                    }
                });
        }

        let run = runner(fetcher).run(&targets(&categories)).await;

        assert_eq!(run.summary.succeeded_count, 3);
        assert_eq!(run.summary.failed_count, 2);
        assert_eq!(run.results.len(), 5);

        let order: Vec<_> = run.results.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(order, categories.to_vec());

        for result in &run.results {
            match &result.outcome {
                CategoryOutcome::Succeeded(report) => {
                    assert_eq!(report.repeated_element_kind, RepeatedElementKind::Article);
                    assert_eq!(report.repeated_element_count, 1);
                    assert_eq!(report.pdf_links.len(), 1);
                    assert!(result.body_bytes.unwrap() >= 1000);
                }
                CategoryOutcome::Failed(reason) => {
                    assert!(failing.contains(&result.category.as_str()));
                    assert_eq!(reason.kind, FailureKind::Connection);
                    assert_eq!(result.body_bytes, None);
                }
            }
        }

        assert_eq!(run.metrics.total_requests, 5);
        assert_eq!(run.metrics.status_codes.get(&200), Some(&3));
    }

    #[tokio::test]
    async fn small_body_is_reported_as_too_small() {
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch()
            .times(1)
            .returning(|url| Ok(FetchedPage {
                status_code: 200,
                final_url: url.to_string(),
                body: vec![b' '; 500],
            }));

        let run = runner(fetcher).run(&targets(&["circulares"])).await;
        let reason = run.results[0].failure().unwrap();

        assert_eq!(reason.kind, FailureKind::TooSmall);
        assert_eq!(run.results[0].body_bytes, Some(500));
        assert!(run.summary.all_failed());
    }

    #[tokio::test]
    async fn every_failure_kind_is_isolated() {
        let errors = vec![
            FetchError::Timeout { timeout_secs: 30 },
            FetchError::Tls("invalid peer certificate".to_string()),
            FetchError::Http { status_code: 503 },
            FetchError::Unknown { type_name: "reqwest::Error".to_string(), message: "boom".to_string() },
        ];
        let categories = ["a", "b", "c", "d"];

        let mut fetcher = MockFetcher::new();
        let mut seq = Sequence::new();
        for error in errors {
            fetcher.expect_fetch()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_| Err(error.clone()));
        }

        let run = runner(fetcher).run(&targets(&categories)).await;

        assert_eq!(run.results.len(), 4);
        assert_eq!(run.summary.succeeded_count + run.summary.failed_count, 4);
        let kinds: Vec<_> = run.summary.per_category_status.iter().map(|s| s.failure).collect();
        assert_eq!(kinds, vec![
            Some(FailureKind::Timeout),
            Some(FailureKind::Tls),
            Some(FailureKind::Http),
            Some(FailureKind::Unknown),
        ]);
        assert_eq!(run.results[2].failure().unwrap().status_code, Some(503));
    }

    #[tokio::test]
    async fn metrics_use_the_status_the_server_sent() {
        let mut fetcher = MockFetcher::new();
        let mut seq = Sequence::new();
        fetcher.expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|url| Ok(FetchedPage { status_code: 203, ..article_page(url) }));
        fetcher.expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(FetchError::Http { status_code: 503 }));
        fetcher.expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(FetchError::Timeout { timeout_secs: 30 }));

        let run = runner(fetcher).run(&targets(&["circulares", "oficios", "dictamenes"])).await;

        let statuses: Vec<_> = run.results.iter().map(|r| r.status_code).collect();
        assert_eq!(statuses, vec![Some(203), Some(503), None]);
        assert!(run.results[0].succeeded());
        assert_eq!(run.metrics.status_codes.get(&203), Some(&1));
        assert_eq!(run.metrics.status_codes.get(&503), Some(&1));
        assert_eq!(run.metrics.status_codes.get(&200), None);
    }

    #[tokio::test]
    async fn empty_target_list_yields_empty_summary() {
        let run = runner(MockFetcher::new()).run(&[]).await;
        assert!(run.results.is_empty());
        assert_eq!(run.summary.total(), 0);
        assert!(!run.summary.all_failed());
    }

    #[tokio::test]
    async fn internal_links_resolve_against_final_url() {
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch()
            .times(1)
            .returning(|_| Ok(article_page("https://www.supereduc.cl/normativa/circulares/")));

        let run = runner(fetcher).run(&targets(&["circulares"])).await;
        let report = run.results[0].report().unwrap();
        assert_eq!(report.internal_links.len(), 1);
        assert_eq!(report.internal_links[0].href, "https://www.supereduc.cl/doc.pdf");
    }
}
