use anyhow::Result;
use std::io::Write;

use crate::cli::config::DiscoverySettings;
use crate::discovery::{DiscoveryReport, LinkSample};
use crate::probe::target::{CategoryOutcome, CategoryResult, ProbeRun};
use crate::report::ReportSink;

const RULE_WIDTH: usize = 70;
const PDF_SAMPLES: usize = 5;
const INTERNAL_SAMPLES: usize = 3;

/// Human-readable report, one section per category and a closing summary
pub struct TextReport<W: Write> {
    writer: W,
    markup_chars: usize,
    link_text_chars: usize,
}

/// Cut `text` to at most `max` characters, marking the cut
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}

impl<W: Write> TextReport<W> {
    pub fn new(writer: W, settings: &DiscoverySettings) -> Self {
        Self {
            writer,
            markup_chars: settings.sample_markup_chars,
            link_text_chars: settings.link_text_chars,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn rule(&mut self, c: char) -> Result<()> {
        writeln!(self.writer, "{}", c.to_string().repeat(RULE_WIDTH))?;
        Ok(())
    }

    fn header(&mut self, run: &ProbeRun) -> Result<()> {
        writeln!(self.writer)?;
        self.rule('=')?;
        writeln!(self.writer, "PAGE STRUCTURE PROBE")?;
        writeln!(self.writer, "Run {} started {}", run.run_id, run.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        self.rule('=')?;
        Ok(())
    }

    fn category(&mut self, result: &CategoryResult) -> Result<()> {
        writeln!(self.writer)?;
        self.rule('=')?;
        writeln!(self.writer, "Category: {}", result.category.to_uppercase())?;
        writeln!(self.writer, "URL: {}", result.url)?;
        self.rule('=')?;

        match &result.outcome {
            CategoryOutcome::Succeeded(report) => self.discovery(report)?,
            CategoryOutcome::Failed(reason) => {
                writeln!(self.writer, "✗ Failed ({}): {}", reason.kind, reason.message)?;
            }
        }

        writeln!(self.writer, "  ({} ms)", result.elapsed_ms)?;
        Ok(())
    }

    fn discovery(&mut self, report: &DiscoveryReport) -> Result<()> {
        if report.repeated_element_count > 0 {
            writeln!(
                self.writer,
                "✓ Found {} repeated elements: {}",
                report.repeated_element_count, report.repeated_element_kind
            )?;
        } else {
            writeln!(self.writer, "- No repeated content elements recognised")?;
        }

        if let Some(markup) = &report.sample_markup {
            writeln!(self.writer, "\nFirst element:")?;
            self.rule('-')?;
            writeln!(self.writer, "{}", truncate(markup, self.markup_chars))?;
            self.rule('-')?;
        }

        if report.repeated_element_count > 0 {
            writeln!(self.writer, "\nSample extraction:")?;
            let not_found = "not found";
            writeln!(self.writer, "  Title: {}", report.sample_title.as_deref().unwrap_or(not_found))?;
            writeln!(self.writer, "  Link:  {}", report.sample_link.as_deref().unwrap_or(not_found))?;
            writeln!(self.writer, "  Date:  {}", report.sample_date.as_deref().unwrap_or(not_found))?;
        }

        writeln!(self.writer, "\nGeneral statistics:")?;
        writeln!(self.writer, "  Page title: {}", report.page_title.as_deref().unwrap_or("none"))?;
        writeln!(self.writer, "  Total links: {}", report.total_links)?;
        writeln!(self.writer, "  PDF links: {}", report.pdf_links.len())?;
        writeln!(self.writer, "  Relevant internal links: {}", report.internal_links.len())?;

        if !report.pdf_links.is_empty() {
            writeln!(self.writer, "\nPDF samples:")?;
            self.links(&report.pdf_links, PDF_SAMPLES)?;
        }

        if !report.internal_links.is_empty() {
            writeln!(self.writer, "\nInternal link samples:")?;
            self.links(&report.internal_links, INTERNAL_SAMPLES)?;
        }

        if report.pagination_detected {
            writeln!(self.writer, "\nPagination detected ({} elements)", report.pagination_elements)?;
        }

        Ok(())
    }

    fn links(&mut self, links: &[LinkSample], limit: usize) -> Result<()> {
        for (i, link) in links.iter().take(limit).enumerate() {
            writeln!(self.writer, "  {}. {}", i + 1, truncate(&link.text, self.link_text_chars))?;
            writeln!(self.writer, "     -> {}", link.href)?;
        }
        Ok(())
    }

    fn summary(&mut self, run: &ProbeRun) -> Result<()> {
        let summary = &run.summary;

        writeln!(self.writer)?;
        self.rule('=')?;
        writeln!(self.writer, "PROBE SUMMARY")?;
        self.rule('=')?;
        writeln!(self.writer, "✓ Categories probed successfully: {}/{}", summary.succeeded_count, summary.total())?;
        writeln!(self.writer, "✗ Categories with errors: {}", summary.failed_count)?;

        for status in &summary.per_category_status {
            match status.failure {
                Some(kind) => writeln!(self.writer, "  ✗ {} ({})", status.category, kind)?,
                None => writeln!(self.writer, "  ✓ {}", status.category)?,
            }
        }

        writeln!(
            self.writer,
            "\nDownloaded {} bytes in {} ms",
            run.metrics.bytes_downloaded, run.metrics.total_elapsed_ms
        )?;

        writeln!(self.writer)?;
        self.rule('=')?;
        if summary.all_failed() {
            writeln!(self.writer, "Every category failed. Likely causes:")?;
            writeln!(self.writer, "  - network filtering or a firewall between this host and the site")?;
            writeln!(self.writer, "  - content that only appears after running JavaScript")?;
            writeln!(self.writer, "  - rate limiting or anti-bot protection")?;
        } else {
            writeln!(self.writer, "Next step: use the structures above to write the extraction selectors")?;
        }
        self.rule('=')?;

        Ok(())
    }
}

impl<W: Write> ReportSink for TextReport<W> {
    fn render(&mut self, run: &ProbeRun) -> Result<()> {
        self.header(run)?;
        for result in &run.results {
            self.category(result)?;
        }
        self.summary(run)?;
        self.writer.flush()?;
        Ok(())
    }
}
