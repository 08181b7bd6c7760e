use anyhow::Result;
use chrono::Local;
use clap::Args;
use orchestra_core::Config;
use orchestra_core::alarm::{self, AlarmLedger, AlarmReport, CommandSink};
use serde::Serialize;
use std::io::{self, Write};

use super::coded;
use crate::output::{OutputMode, pretty_kv, render_mode};

/// Arguments for `orchestra alarms`.
#[derive(Args, Debug, Default)]
pub struct AlarmArgs {
    /// Print the remaining plan for today without setting anything.
    #[arg(long)]
    pub plan: bool,
}

#[derive(Debug, Serialize)]
struct PlanView {
    date: String,
    title: String,
    times: Vec<String>,
    already_set: Vec<String>,
}

fn render_plan(plan: &PlanView, w: &mut dyn Write) -> io::Result<()> {
    pretty_kv(w, "date", &plan.date)?;
    pretty_kv(w, "title", &plan.title)?;
    if plan.times.is_empty() {
        return pretty_kv(w, "plan", "nothing left today");
    }
    for time in &plan.times {
        let state = if plan.already_set.contains(time) { "set" } else { "pending" };
        pretty_kv(w, time, state)?;
    }
    Ok(())
}

fn render_report(report: &AlarmReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_kv(w, "scheduled", report.scheduled.join(", "))?;
    pretty_kv(w, "already", report.already_set.join(", "))?;
    if !report.failed.is_empty() {
        pretty_kv(w, "failed", report.failed.join(", "))?;
    }
    Ok(())
}

/// Plan today's hourly alarms and set the ones not yet in the ledger.
pub fn run_alarms(args: &AlarmArgs, config: &Config, output: OutputMode) -> Result<()> {
    let now = Local::now().naive_local();
    let settings = &config.alarms;
    let ledger_path = &config.paths.alarms;

    let mut ledger = AlarmLedger::load_or_new(ledger_path, now.date());
    ledger.roll_to(now.date());
    let plan = alarm::plan_hourly(now, settings.day_hour_start, settings.day_hour_end);

    if args.plan {
        let view = PlanView {
            date: now.date().to_string(),
            title: settings.title.clone(),
            times: plan.iter().copied().map(alarm::clock_label).collect(),
            already_set: plan
                .iter()
                .filter(|t| ledger.is_covered(**t))
                .copied()
                .map(alarm::clock_label)
                .collect(),
        };
        return render_mode(output, &view, render_plan);
    }

    if settings.command.is_empty() {
        tracing::warn!("no [alarms].command configured, alarms disabled");
        return render_mode(output, &AlarmReport::default(), render_report);
    }

    let sink = CommandSink::from_argv(&settings.command)?;
    let report = alarm::schedule_day(&mut ledger, &sink, &settings.title, &plan, ledger_path)
        .map_err(coded)?;
    render_mode(output, &report, render_report)
}
