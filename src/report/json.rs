use anyhow::{Context, Result};
use std::io::Write;

use crate::probe::target::ProbeRun;
use crate::report::ReportSink;

/// The whole run as pretty-printed JSON
pub struct JsonReport<W: Write> {
    writer: W,
}

impl<W: Write> JsonReport<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for JsonReport<W> {
    fn render(&mut self, run: &ProbeRun) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.writer, run)
            .context("Failed to serialize probe run")?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}
