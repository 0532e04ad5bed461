//! Reading cell values back out of the current sheet.

use crate::{XlsxEditor, style::col_index};
use anyhow::{Context, Result};
use quick_xml::{Reader, escape::unescape, events::Event};
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

static RE_OOXML_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_x([0-9A-Fa-f]{4})_").expect("valid regex"));

/// Reverses `_xHHHH_` escapes; sequences that are not a valid char stay as is.
pub(crate) fn decode_ooxml_text(text: &str) -> Cow<'_, str> {
    if !text.contains("_x") {
        return Cow::Borrowed(text);
    }
    RE_OOXML_ESCAPE.replace_all(text, |caps: &Captures<'_>| {
        u32::from_str_radix(&caps[1], 16)
            .ok()
            .and_then(char::from_u32)
            .map_or_else(|| caps[0].to_owned(), String::from)
    })
}

impl XlsxEditor {
    /// Returns the current sheet as text rows, in document order.
    ///
    /// Cells are placed by their `r` column, gaps are filled with empty
    /// strings. Shared strings, inline strings (rich-text runs concatenated),
    /// booleans and plain `<v>` values are all returned as text.
    pub fn read_rows(&self) -> Result<Vec<Vec<String>>> {
        let mut rdr = Reader::from_reader(self.sheet_xml.as_slice());

        let mut rows = Vec::new();
        let mut row: Vec<String> = Vec::new();
        let mut next_col = 0usize;

        let mut cell: Option<CellState> = None;
        let mut in_value = false;
        let mut in_text = false;
        let mut in_phonetic = false;

        loop {
            match rdr.read_event()? {
                Event::Start(ref e) => match e.name().as_ref() {
                    b"row" => {
                        row = Vec::new();
                        next_col = 0;
                    }
                    b"c" => {
                        let state = CellState::from_attrs(e, next_col)?;
                        cell = Some(state);
                    }
                    b"v" => in_value = cell.is_some(),
                    b"t" => in_text = cell.is_some() && !in_phonetic,
                    b"rPh" => in_phonetic = true,
                    _ => {}
                },
                Event::Empty(ref e) => match e.name().as_ref() {
                    b"row" => rows.push(Vec::new()),
                    b"c" => next_col = CellState::from_attrs(e, next_col)?.col + 1,
                    _ => {}
                },
                Event::End(ref e) => match e.name().as_ref() {
                    b"row" => rows.push(std::mem::take(&mut row)),
                    b"c" => {
                        if let Some(state) = cell.take() {
                            let col = state.col;
                            let value = state.resolve(&self.shared_strings)?;
                            if row.len() <= col {
                                row.resize(col + 1, String::new());
                            }
                            row[col] = value;
                            next_col = col + 1;
                        }
                    }
                    b"v" => in_value = false,
                    b"t" => in_text = false,
                    b"rPh" => in_phonetic = false,
                    _ => {}
                },
                Event::Text(ref e) if in_value || in_text => {
                    if let Some(state) = cell.as_mut() {
                        let raw = String::from_utf8_lossy(e);
                        state.text.push_str(&unescape(&raw)?);
                    }
                }
                Event::CData(ref e) if in_value || in_text => {
                    if let Some(state) = cell.as_mut() {
                        state.text.push_str(&String::from_utf8_lossy(e));
                    }
                }
                Event::GeneralRef(ref e) if in_value || in_text => {
                    if let Some(state) = cell.as_mut() {
                        let entity = format!("&{};", String::from_utf8_lossy(e));
                        state.text.push_str(&unescape(&entity)?);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(rows)
    }
}

struct CellState {
    col: usize,
    kind: Option<String>,
    text: String,
}

impl CellState {
    fn from_attrs(e: &quick_xml::events::BytesStart<'_>, next_col: usize) -> Result<Self> {
        let mut col = next_col;
        let mut kind = None;
        for a in e.attributes().with_checks(false).flatten() {
            match a.key.as_ref() {
                b"r" => {
                    let coord = String::from_utf8_lossy(&a.value);
                    let letters: String =
                        coord.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
                    if !letters.is_empty() {
                        col = col_index(&letters);
                    }
                }
                b"t" => kind = Some(String::from_utf8_lossy(&a.value).into_owned()),
                _ => {}
            }
        }
        Ok(Self {
            col,
            kind,
            text: String::new(),
        })
    }

    fn resolve(self, shared: &[String]) -> Result<String> {
        Ok(match self.kind.as_deref() {
            Some("s") => {
                let idx: usize = self
                    .text
                    .trim()
                    .parse()
                    .with_context(|| format!("bad shared string index `{}`", self.text))?;
                shared
                    .get(idx)
                    .cloned()
                    .with_context(|| format!("shared string #{idx} out of range"))?
            }
            Some("b") => match self.text.trim() {
                "1" => "TRUE".to_owned(),
                "0" => "FALSE".to_owned(),
                other => other.to_owned(),
            },
            Some("inlineStr") | Some("str") => decode_ooxml_text(&self.text).into_owned(),
            _ => self.text,
        })
    }
}

/// Parses `xl/sharedStrings.xml` into a flat table, one entry per `<si>`.
pub(crate) fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    let mut rdr = Reader::from_reader(xml);

    let mut table = Vec::new();
    let mut current = String::new();
    let mut in_item = false;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match rdr.read_event()? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"si" => {
                    in_item = true;
                    current.clear();
                }
                b"t" => in_text = in_item && !in_phonetic,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::Empty(ref e) if e.name().as_ref() == b"si" => table.push(String::new()),
            Event::End(ref e) => match e.name().as_ref() {
                b"si" => {
                    in_item = false;
                    table.push(decode_ooxml_text(&current).into_owned());
                    current.clear();
                }
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Text(ref e) if in_text => {
                current.push_str(&unescape(&String::from_utf8_lossy(e))?);
            }
            Event::CData(ref e) if in_text => current.push_str(&String::from_utf8_lossy(e)),
            Event::GeneralRef(ref e) if in_text => {
                let entity = format!("&{};", String::from_utf8_lossy(e));
                current.push_str(&unescape(&entity)?);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(table)
}
