//! weekly-dashboard: a single-page form that appends tenant status records
//! to a per-ISO-week Excel workbook, archiving older weeks' files.

pub mod appender;
pub mod archive;
pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod styler;
pub mod week;

use std::path::PathBuf;

use chrono::{DateTime, TimeZone};

pub use appender::{COLUMNS, Record, SubmissionForm};
pub use config::Config;
pub use error::{Error, Result};
pub use routes::{AppState, router};
pub use styler::StyleOptions;
pub use week::{Clock, FixedClock, SystemClock};

/// What one submission did on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub file_name: String,
    /// Data rows in the weekly table after the append.
    pub rows: usize,
    pub archived: Vec<PathBuf>,
}

/// Archives stale files, appends `record` to the current week's table and
/// restyles it. Blocking; callers on the runtime use `spawn_blocking`.
pub fn record_submission<Tz: TimeZone>(
    config: &Config,
    style: &StyleOptions,
    now: &DateTime<Tz>,
    record: &Record,
) -> Result<Submission> {
    let file_name = week::weekly_file_name(&config.file_prefix, now);
    let archived = archive::archive_stale(&config.data_dir, &config.archive_dir, &file_name)?;

    let path = config.data_dir.join(&file_name);
    let rows = appender::append_record(&path, &config.sheet_name, record)?;
    styler::apply_styling(&path, style)?;

    Ok(Submission {
        file_name,
        rows,
        archived,
    })
}
