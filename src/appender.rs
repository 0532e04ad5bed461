//! The weekly table: one header row, then one row per submitted record.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use rust_core::XlsxEditor;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::Result;

/// Header text, in the fixed column order.
pub const COLUMNS: [&str; 7] = [
    "Tenant Name",
    "Tenant Code",
    "Golive AM",
    "Go Live Mgr",
    "Current_Status",
    "Dashboard Status",
    "Remarks",
];

/// The submitted form. Every field is optional; absent ones are stored empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionForm {
    pub tenant_name: Option<String>,
    pub tenant_code: Option<String>,
    pub golive_am: Option<String>,
    pub golive_mgr: Option<String>,
    pub status: Option<String>,
    pub dashboard_status: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub tenant_name: String,
    pub tenant_code: String,
    pub golive_am: String,
    pub golive_mgr: String,
    pub current_status: String,
    pub dashboard_status: String,
    pub remarks: String,
}

impl Record {
    pub fn from_form(form: SubmissionForm) -> Self {
        Self {
            tenant_name: form.tenant_name.unwrap_or_default(),
            tenant_code: form.tenant_code.unwrap_or_default(),
            golive_am: form.golive_am.unwrap_or_default(),
            golive_mgr: form.golive_mgr.unwrap_or_default(),
            current_status: form.status.unwrap_or_default(),
            dashboard_status: form.dashboard_status.unwrap_or_default(),
            remarks: form.remarks.unwrap_or_default(),
        }
    }

    /// Values in [`COLUMNS`] order.
    pub fn to_row(&self) -> [&str; 7] {
        [
            &self.tenant_name,
            &self.tenant_code,
            &self.golive_am,
            &self.golive_mgr,
            &self.current_status,
            &self.dashboard_status,
            &self.remarks,
        ]
    }

    fn from_row(values: [String; 7]) -> Self {
        let [
            tenant_name,
            tenant_code,
            golive_am,
            golive_mgr,
            current_status,
            dashboard_status,
            remarks,
        ] = values;
        Self {
            tenant_name,
            tenant_code,
            golive_am,
            golive_mgr,
            current_status,
            dashboard_status,
            remarks,
        }
    }
}

/// Reads the records of the first sheet of `path`.
///
/// Columns are matched to fields by header text, so reordered columns come
/// back in the fixed order; unknown headers are dropped and missing ones read
/// as empty. Every row with at least one cell is a record, even when all its
/// values are empty; only `<row/>` elements without cells are skipped.
pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let editor = XlsxEditor::open_sheet(path, 1)
        .with_context(|| format!("cannot open {}", path.display()))?;
    let mut rows = editor.read_rows()?.into_iter();

    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let positions: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim(), idx))
        .collect();
    let mapping: [Option<usize>; 7] = COLUMNS.map(|col| positions.get(col).copied());

    let records = rows
        .filter(|row| !row.is_empty())
        .map(|row| {
            Record::from_row(
                mapping.map(|idx| idx.and_then(|i| row.get(i).cloned()).unwrap_or_default()),
            )
        })
        .collect();
    Ok(records)
}

/// Appends `record` to the table at `path`, creating the file on first use.
///
/// The whole table is rewritten into a fresh workbook with the fixed header
/// and saved atomically. Returns the number of data rows now stored.
pub fn append_record(path: &Path, sheet_name: &str, record: &Record) -> Result<usize> {
    let mut records = if path.exists() {
        load_records(path)?
    } else {
        debug!(path = %path.display(), "starting a new weekly table");
        Vec::new()
    };
    records.push(record.clone());

    let mut editor = XlsxEditor::blank(sheet_name)?;
    editor.append_row(COLUMNS)?;
    editor.append_table(records.iter().map(Record::to_row))?;
    editor
        .save(path)
        .with_context(|| format!("cannot write {}", path.display()))?;

    info!(path = %path.display(), rows = records.len(), "record appended");
    Ok(records.len())
}
