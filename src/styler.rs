//! Cosmetic formatting of the weekly table.

use std::path::Path;

use anyhow::Context;
use rust_core::{AlignSpec, FontSpec, HorizAlignment, XlsxEditor, col_letter};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct StyleOptions {
    /// ARGB of the header background.
    pub header_fill: String,
    pub header_font_color: String,
    pub font_name: String,
    pub font_size: f32,
    pub column_padding: usize,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            header_fill: "FF1F4E78".to_string(),
            header_font_color: "FFFFFFFF".to_string(),
            font_name: "Calibri".to_string(),
            font_size: 11.0,
            column_padding: 5,
        }
    }
}

/// Styles the first sheet of `path` in place.
///
/// Header row: bold font in `header_font_color` on a solid `header_fill`,
/// centered, thin borders. Data rows: thin borders, left aligned. Each used
/// column is as wide as its longest value plus `column_padding`.
pub fn apply_styling(path: &Path, opts: &StyleOptions) -> Result<()> {
    let mut editor = XlsxEditor::open_sheet(path, 1)
        .with_context(|| format!("cannot open {} for styling", path.display()))?;
    let rows = editor.read_rows()?;
    let col_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    if col_count == 0 {
        return Ok(());
    }
    let last_col = col_letter(col_count as u32 - 1);
    let last_row = rows.len();

    let header = format!("A1:{last_col}1");
    let header_font = FontSpec {
        name: opts.font_name.clone(),
        size: opts.font_size,
        bold: true,
        italic: false,
        color: Some(opts.header_font_color.clone()),
    };
    editor
        .set_font_with_alignment(
            &header,
            &header_font,
            &AlignSpec::horizontal(HorizAlignment::Center),
        )?
        .set_fill(&header, &opts.header_fill)?
        .set_border(&header, "thin")?;

    if last_row > 1 {
        let body = format!("A2:{last_col}{last_row}");
        editor
            .set_border(&body, "thin")?
            .set_alignment(&body, &AlignSpec::horizontal(HorizAlignment::Left))?;
    }

    let widths = column_widths(&rows, col_count, opts.column_padding);
    editor.set_column_widths(widths.into_iter().enumerate().map(|(i, w)| (i as u32, w as f64)))?;

    editor
        .save(path)
        .with_context(|| format!("cannot write styled {}", path.display()))?;
    Ok(())
}

/// Longest value per column, in characters, plus `padding`.
pub fn column_widths(rows: &[Vec<String>], col_count: usize, padding: usize) -> Vec<usize> {
    let mut widths = vec![0usize; col_count];
    for row in rows {
        for (width, value) in widths.iter_mut().zip(row) {
            *width = (*width).max(value.chars().count());
        }
    }
    widths.into_iter().map(|w| w + padding).collect()
}
