use anyhow::Result;
use clap::Args;
use orchestra_core::Config;
use orchestra_core::sync::{self, SyncContext, SyncReport, TableMerge};
use std::io::{self, Write};

use super::coded;
use crate::output::{OutputMode, pretty_kv, render_mode};

/// Arguments for `orchestra sync`.
#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Ignore the local snapshot and pull every resource.
    #[arg(long)]
    pub full: bool,

    /// Merge and extract without advancing the stored sync cursor.
    #[arg(long)]
    pub dry_run: bool,
}

fn table_line(stats: &TableMerge) -> String {
    format!(
        "+{} ~{} -{} ({} ignored)",
        stats.added, stats.replaced, stats.deleted, stats.ignored_deletes
    )
}

fn render_human(report: &SyncReport, w: &mut dyn Write) -> io::Result<()> {
    let pull = match report.pull {
        sync::PullKind::Full => "full",
        sync::PullKind::Incremental => "incremental",
    };
    pretty_kv(w, "pull", if report.dry_run { format!("{pull} (dry run)") } else { pull.to_string() })?;
    pretty_kv(w, "cursor", report.cursor_before.as_deref().unwrap_or("-"))?;
    pretty_kv(w, "now", &report.cursor_after)?;
    pretty_kv(w, "projects", table_line(&report.merge.projects))?;
    pretty_kv(w, "sections", table_line(&report.merge.sections))?;
    pretty_kv(w, "items", table_line(&report.merge.items))?;
    pretty_kv(
        w,
        "rituals",
        format!(
            "{} rituals, {} acts, {} headings → {}",
            report.extract.rituals,
            report.extract.acts,
            report.extract.headings,
            report.extract.path.display()
        ),
    )
}

/// Run the sync pipeline against the Todoist API.
pub fn run_sync(args: &SyncArgs, mut config: Config, output: OutputMode) -> Result<()> {
    config.force_sync |= args.full;
    config.dry_run |= args.dry_run;

    let client = sync::client_for(&config).map_err(coded)?;
    let ctx = SyncContext::new(config).map_err(coded)?;
    let report = sync::run_sync(&ctx, &client).map_err(coded)?;

    render_mode(output, &report, render_human)
}
