use anyhow::Result;
use orchestra_core::Config;
use orchestra_core::sync::{self, ExtractReport, SyncContext};
use std::io::{self, Write};

use super::coded;
use crate::output::{OutputMode, pretty_kv, render_mode};

fn render_human(report: &ExtractReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_kv(w, "headings", report.headings.to_string())?;
    pretty_kv(w, "rituals", report.rituals.to_string())?;
    pretty_kv(w, "acts", report.acts.to_string())?;
    pretty_kv(w, "written", report.path.display().to_string())
}

/// Rebuild the ritual document from the local snapshot. No network access.
pub fn run_extract(config: Config, output: OutputMode) -> Result<()> {
    let ctx = SyncContext::new(config).map_err(coded)?;
    let report = sync::extract_only(&ctx).map_err(coded)?;
    render_mode(output, &report, render_human)
}
