pub mod json;
pub mod text;

use anyhow::Result;

use crate::probe::target::ProbeRun;

// Re-export common types
pub use json::JsonReport;
pub use text::TextReport;

/// Renders a finished run somewhere a person or another tool can read it
pub trait ReportSink {
    fn render(&mut self, run: &ProbeRun) -> Result<()>;
}
