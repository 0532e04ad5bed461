//! rust-core: small XLSX editor working directly on the OOXML parts.
//! Opens a workbook (from disk or a blank in-memory template), appends rows,
//! reads them back, styles ranges and saves atomically.

mod files_part;
mod read_part;
pub mod style;
mod test;

use anyhow::{Context, Result, bail};
use quick_xml::{Reader, Writer, events::BytesText, events::Event};
use std::{
    borrow::Cow,
    fs::File,
    io::{Cursor, Read, Seek},
    path::{Path, PathBuf},
};
use ::zip as zip_crate;

pub use style::{AlignSpec, FontSpec, HorizAlignment, VertAlignment, col_letter};

const STYLES_PATH: &str = "xl/styles.xml";

/// `XlsxEditor` provides functionality to open, modify, and save XLSX files.
/// One worksheet is "current"; rows, cells and styles apply to it.
pub struct XlsxEditor {
    source: Source,
    sheet_path: String,
    sheet_xml: Vec<u8>,
    last_row: u32,
    styles_xml: Vec<u8>,
    shared_strings: Vec<String>,
}

/// Where the untouched package parts are copied from on `save`.
enum Source {
    File(PathBuf),
    Memory(Vec<u8>),
}

trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

impl Source {
    fn archive(&self) -> Result<zip_crate::ZipArchive<Box<dyn ReadSeek + '_>>> {
        let reader: Box<dyn ReadSeek + '_> = match self {
            Source::File(path) => Box::new(
                File::open(path).with_context(|| format!("cannot open {}", path.display()))?,
            ),
            Source::Memory(bytes) => Box::new(Cursor::new(bytes.as_slice())),
        };
        Ok(zip_crate::ZipArchive::new(reader)?)
    }
}

impl std::fmt::Debug for XlsxEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            Source::File(p) => p.display().to_string(),
            Source::Memory(_) => "<memory>".to_owned(),
        };
        f.debug_struct("XlsxEditor")
            .field("source", &source)
            .field("sheet_path", &self.sheet_path)
            .field("last_row", &self.last_row)
            .finish()
    }
}

/// Main
impl XlsxEditor {
    /// Opens the sheet at 1-based position `sheet_id` in workbook order.
    ///
    /// The sheet part is resolved through `xl/_rels/workbook.xml.rels`, so
    /// workbooks whose part names do not follow `sheetN.xml` open fine.
    pub fn open_sheet<P: AsRef<Path>>(src: P, sheet_id: usize) -> Result<Self> {
        Self::from_source(Source::File(src.as_ref().to_path_buf()), sheet_id)
    }

    /// Appends a single row of text cells to the end of the current sheet.
    ///
    /// Every value is stored as an inline string; nothing is inferred as a
    /// number or formula.
    pub fn append_row<I, S>(&mut self, cells: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.last_row += 1;
        let row_xml = row_xml(self.last_row, cells)?;
        self.insert_before_sheet_data_end(row_xml)
    }

    /// Appends multiple rows (a table) to the end of the current sheet.
    pub fn append_table<R, I, S>(&mut self, rows: R) -> Result<()>
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let mut bulk_rows_xml = Vec::<u8>::new();
        for row in rows {
            self.last_row += 1;
            bulk_rows_xml.extend_from_slice(&row_xml(self.last_row, row)?);
        }
        self.insert_before_sheet_data_end(bulk_rows_xml)
    }

    /// Sets the value of a specific cell, creating the row if needed.
    pub fn set_cell<S: ToString>(&mut self, coord: &str, value: S) -> Result<()> {
        let row_start = coord
            .find(|c: char| c.is_ascii_digit())
            .context("invalid cell coordinate – no digits found")?;
        let row_num: u32 = coord[row_start..]
            .parse()
            .context("invalid row number in cell coordinate")?;

        let mut cell_writer = Writer::new(Vec::new());
        write_text_cell(&mut cell_writer, coord, &value.to_string())?;
        let cell_xml = cell_writer.into_inner();

        let row_marker = format!("<row r=\"{row_num}\"");
        if let Some(row_start) = find_bytes(&self.sheet_xml, row_marker.as_bytes()) {
            // self-closing row: open it up first
            let tag_end = find_bytes_from(&self.sheet_xml, b">", row_start)
                .context("malformed <row> tag")?;
            if self.sheet_xml[tag_end - 1] == b'/' {
                self.sheet_xml
                    .splice(tag_end - 1..=tag_end, b"></row>".iter().copied());
            }
            let row_end = find_bytes_from(&self.sheet_xml, b"</row>", row_start)
                .context("</row> not found")?
                + "</row>".len();
            let mut row_slice = self.sheet_xml[row_start..row_end].to_vec();

            // drop an existing cell with the same coordinate
            let cell_marker = format!("<c r=\"{coord}\"");
            if let Some(cell_pos) = find_bytes(&row_slice, cell_marker.as_bytes()) {
                let open_end = find_bytes_from(&row_slice, b">", cell_pos)
                    .context("malformed <c> tag")?;
                let cell_end = if row_slice[open_end - 1] == b'/' {
                    open_end + 1
                } else {
                    find_bytes_from(&row_slice, b"</c>", cell_pos).context("</c> not found")? + 4
                };
                row_slice.drain(cell_pos..cell_end);
            }

            // keep cells ordered by column
            let target_col = style::col_index(coord);
            let mut insert_pos = row_slice.len() - "</row>".len();
            let mut i = 0;
            while let Some(c_pos) = find_bytes_from(&row_slice, b"<c r=\"", i) {
                let attr = c_pos + 6;
                let Some(end_quote) = find_bytes_from(&row_slice, b"\"", attr) else {
                    break;
                };
                let existing = std::str::from_utf8(&row_slice[attr..end_quote])?;
                if style::col_index(existing) > target_col {
                    insert_pos = c_pos;
                    break;
                }
                i = end_quote;
            }
            row_slice.splice(insert_pos..insert_pos, cell_xml);
            self.sheet_xml.splice(row_start..row_end, row_slice);
        } else {
            let mut new_row_xml = format!("<row r=\"{row_num}\">").into_bytes();
            new_row_xml.extend_from_slice(&cell_xml);
            new_row_xml.extend_from_slice(b"</row>");

            // Rows must stay sorted by `r`, otherwise Excel reports "recovered records".
            let mut insert_pos = None;
            let mut search_idx = 0;
            while let Some(abs) = find_bytes_from(&self.sheet_xml, b"<row r=\"", search_idx) {
                let num_start = abs + 8;
                let Some(end_quote) = find_bytes_from(&self.sheet_xml, b"\"", num_start) else {
                    break;
                };
                let existing: u32 = std::str::from_utf8(&self.sheet_xml[num_start..end_quote])?
                    .parse()
                    .unwrap_or(0);
                if existing > row_num {
                    insert_pos = Some(abs);
                    break;
                }
                search_idx = end_quote;
            }
            let pos = match insert_pos {
                Some(p) => p,
                None => sheet_data_end(&self.sheet_xml)?,
            };
            self.sheet_xml.splice(pos..pos, new_row_xml);
        }

        if row_num > self.last_row {
            self.last_row = row_num;
        }
        Ok(())
    }

    fn insert_before_sheet_data_end(&mut self, xml: Vec<u8>) -> Result<()> {
        let pos = sheet_data_end(&self.sheet_xml)?;
        self.sheet_xml.splice(pos..pos, xml);
        Ok(())
    }
}

/// `r:id` of every `<sheet/>` in workbook.xml, in workbook order.
fn sheet_rids(workbook_xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(true);

    let mut sheets = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Empty(ref e) | Event::Start(ref e) if e.name().as_ref() == b"sheet" => {
                let rid = e
                    .attributes()
                    .with_checks(false)
                    .flatten()
                    .find(|a| a.key.as_ref() == b"r:id")
                    .map(|a| String::from_utf8_lossy(&a.value).into_owned())
                    .unwrap_or_default();
                sheets.push(rid);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(sheets)
}

/// Reads a whole zip entry into memory.
fn read_entry<R: Read + Seek>(zip: &mut zip_crate::ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut part = zip
        .by_name(name)
        .with_context(|| format!("{name} not found"))?;
    let mut buf = Vec::with_capacity(part.size() as usize);
    part.read_to_end(&mut buf)?;
    Ok(buf)
}

fn row_xml<I, S>(row_num: u32, cells: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: ToString,
{
    let mut writer = Writer::new(Vec::new());
    writer
        .create_element("row")
        .with_attribute(("r", row_num.to_string().as_str()))
        .write_inner_content(|w| {
            for (col_idx, val) in cells.into_iter().enumerate() {
                let coord = format!("{}{}", col_letter(col_idx as u32), row_num);
                write_text_cell(w, &coord, &val.to_string())?;
            }
            Ok(())
        })?;
    Ok(writer.into_inner())
}

/// `<c r=".." t="inlineStr"><is><t>..</t></is></c>`
fn write_text_cell(w: &mut Writer<Vec<u8>>, coord: &str, value: &str) -> std::io::Result<()> {
    let c_elem = w
        .create_element("c")
        .with_attribute(("r", coord))
        .with_attribute(("t", "inlineStr"));
    c_elem.write_inner_content(|w2| {
        w2.create_element("is").write_inner_content(|w3| {
            let t = w3.create_element("t");
            let t = if value.starts_with(char::is_whitespace) || value.ends_with(char::is_whitespace)
            {
                t.with_attribute(("xml:space", "preserve"))
            } else {
                t
            };
            t.write_text_content(BytesText::new(&encode_ooxml_text(value)))?;
            Ok(())
        })?;
        Ok(())
    })?;
    Ok(())
}

/// Characters XML 1.0 forbids in text content.
fn is_xml_illegal(c: char) -> bool {
    matches!(
        c,
        '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}'
    )
}

/// `_xHHHH_` at the start of `s`.
fn starts_with_ooxml_escape(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 7
        && b[0] == b'_'
        && b[1] == b'x'
        && b[2..6].iter().all(u8::is_ascii_hexdigit)
        && b[6] == b'_'
}

/// Encodes cell text the way OOXML string types expect: illegal characters
/// become `_xHHHH_`, and the `_` of a literal `_xHHHH_` becomes `_x005F_`.
pub(crate) fn encode_ooxml_text(value: &str) -> Cow<'_, str> {
    if !value.contains(is_xml_illegal) && !value.contains("_x") {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 16);
    for (i, c) in value.char_indices() {
        if is_xml_illegal(c) {
            out.push_str(&format!("_x{:04X}_", c as u32));
        } else if c == '_' && starts_with_ooxml_escape(&value[i..]) {
            out.push_str("_x005F_");
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

fn sheet_data_end(sheet_xml: &[u8]) -> Result<usize> {
    match memchr::memmem::rfind(sheet_xml, b"</sheetData>") {
        Some(pos) => Ok(pos),
        None => bail!("</sheetData> tag not found"),
    }
}

pub(crate) fn find_bytes(hay: &[u8], needle: &[u8]) -> Option<usize> {
    memchr::memmem::find(hay, needle)
}

pub(crate) fn find_bytes_from(hay: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    if start > hay.len() {
        return None;
    }
    memchr::memmem::find(&hay[start..], needle).map(|p| p + start)
}

pub(crate) fn bump_count(xml: &mut Vec<u8>, tag: &[u8], attr: &[u8]) -> Result<()> {
    if let Some(pos) = find_bytes(xml, tag) {
        let tag_end = find_bytes_from(xml, b">", pos).context("unterminated tag")?;
        if let Some(a) = find_bytes_from(xml, attr, pos).filter(|a| *a < tag_end) {
            let start = a + attr.len();
            let end = find_bytes_from(xml, b"\"", start).context("closing quote not found")?;
            let mut num: u32 = std::str::from_utf8(&xml[start..end])?.parse()?;
            num += 1;
            xml.splice(start..end, num.to_string().bytes());
            return Ok(());
        }
    }
    Err(anyhow::anyhow!("attribute count not found"))
}

// Простейший экранировщик для XML-атрибутов.
pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
