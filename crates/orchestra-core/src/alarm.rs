//! Hourly reminder alarms and the ledger of which ones are already set today.
//!
//! The ledger file is a JSON array: the day (`MM/DD/YY`) followed by every
//! alarm time set that day (`HH:MM AM`). A ledger from an earlier day is
//! cleared before use, so an alarm is scheduled at most once per day.

use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::store::{self, StoreError};

const DATE_FORMAT: &str = "%m/%d/%y";
const TIME_FORMAT: &str = "%I:%M %p";

/// Renders a time the way the ledger stores it.
#[must_use]
pub fn clock_label(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Alarms already set on one day, compared at minute precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<String>", try_from = "Vec<String>")]
pub struct AlarmLedger {
    date: NaiveDate,
    times: BTreeSet<NaiveTime>,
}

impl From<AlarmLedger> for Vec<String> {
    fn from(ledger: AlarmLedger) -> Self {
        std::iter::once(ledger.date.format(DATE_FORMAT).to_string())
            .chain(ledger.times.into_iter().map(clock_label))
            .collect()
    }
}

impl TryFrom<Vec<String>> for AlarmLedger {
    type Error = String;

    fn try_from(raw: Vec<String>) -> Result<Self, Self::Error> {
        let mut entries = raw.into_iter();
        let day = entries.next().ok_or("empty alarm ledger")?;
        let date = NaiveDate::parse_from_str(&day, DATE_FORMAT)
            .map_err(|err| format!("bad ledger date {day:?}: {err}"))?;
        let times = entries
            .map(|entry| {
                NaiveTime::parse_from_str(&entry, TIME_FORMAT)
                    .map_err(|err| format!("bad ledger time {entry:?}: {err}"))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { date, times })
    }
}

fn to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

impl AlarmLedger {
    #[must_use]
    pub const fn new(date: NaiveDate) -> Self {
        Self {
            date,
            times: BTreeSet::new(),
        }
    }

    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn times(&self) -> impl Iterator<Item = NaiveTime> + '_ {
        self.times.iter().copied()
    }

    /// Read the ledger at `path`, or start an empty one for `today` when the
    /// file is missing or unreadable.
    #[must_use]
    pub fn load_or_new(path: &Path, today: NaiveDate) -> Self {
        let loaded = std::fs::read(path)
            .map_err(|err| err.to_string())
            .and_then(|bytes| serde_json::from_slice::<Self>(&bytes).map_err(|err| err.to_string()));
        match loaded {
            Ok(ledger) => {
                tracing::debug!(path = %path.display(), date = %ledger.date, set = ledger.times.len(), "read alarm ledger");
                ledger
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "alarm ledger unavailable, starting fresh");
                Self::new(today)
            }
        }
    }

    /// Switch to `date`, forgetting every alarm when the day changed.
    pub fn roll_to(&mut self, date: NaiveDate) {
        if self.date != date {
            tracing::info!(from = %self.date, to = %date, "clearing set alarms");
            self.date = date;
            self.times.clear();
        }
    }

    #[must_use]
    pub fn is_covered(&self, time: NaiveTime) -> bool {
        self.times.contains(&to_minute(time))
    }

    /// Returns false when `time` was already recorded.
    pub fn record(&mut self, time: NaiveTime) -> bool {
        self.times.insert(to_minute(time))
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        store::write_json_atomic(path, self)
    }
}

/// Top-of-hour alarm times left today.
///
/// Runs from the hour after `max(day_start, now.hour)` through `day_end`
/// inclusive.
#[must_use]
pub fn plan_hourly(now: NaiveDateTime, day_start: u32, day_end: u32) -> Vec<NaiveTime> {
    let start = day_start.max(now.hour());
    if day_end < start {
        tracing::warn!(start, end = day_end, "end hour is earlier than start hour");
        return Vec::new();
    }
    (start + 1..=day_end.min(23))
        .filter_map(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    #[error("alarm command is empty")]
    NoCommand,

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Something that can place a desktop alarm.
pub trait AlarmSink {
    fn schedule(&self, time: NaiveTime, title: &str) -> Result<(), AlarmError>;
}

/// Runs an external program per alarm, substituting `{title}` and `{time}`
/// into its arguments.
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    pub fn from_argv(argv: &[String]) -> Result<Self, AlarmError> {
        let (program, args) = argv.split_first().ok_or(AlarmError::NoCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn render(&self, time: NaiveTime, title: &str) -> Vec<String> {
        let label = clock_label(time);
        self.args
            .iter()
            .map(|arg| arg.replace("{title}", title).replace("{time}", &label))
            .collect()
    }
}

impl AlarmSink for CommandSink {
    fn schedule(&self, time: NaiveTime, title: &str) -> Result<(), AlarmError> {
        let args = self.render(time, title);
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| AlarmError::Launch {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(AlarmError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        tracing::info!(program = %self.program, args = ?args, "alarm set");
        Ok(())
    }
}

/// What [`schedule_day`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlarmReport {
    pub scheduled: Vec<String>,
    pub already_set: Vec<String>,
    pub failed: Vec<String>,
}

/// Schedule every uncovered time in `plan`, then persist the ledger.
///
/// A sink failure is logged and leaves that time unrecorded so the next run
/// retries it.
pub fn schedule_day(
    ledger: &mut AlarmLedger,
    sink: &dyn AlarmSink,
    title: &str,
    plan: &[NaiveTime],
    ledger_path: &Path,
) -> Result<AlarmReport, StoreError> {
    let mut report = AlarmReport::default();
    for &time in plan {
        let label = clock_label(time);
        if ledger.is_covered(time) {
            tracing::debug!(time = %label, "alarm already set");
            report.already_set.push(label);
            continue;
        }
        match sink.schedule(time, title) {
            Ok(()) => {
                ledger.record(time);
                report.scheduled.push(label);
            }
            Err(error) => {
                tracing::error!(time = %label, %error, "failed to set alarm");
                report.failed.push(label);
            }
        }
    }
    ledger.save(ledger_path)?;
    Ok(report)
}
