//! style.rs – универсальный слой стилей + нормализация <cols>

use anyhow::{Context, Result, bail};
use quick_xml::{Reader, events::Event};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::{fmt, str::FromStr};

use crate::{XlsxEditor, bump_count, find_bytes, find_bytes_from, xml_escape};

/* ========================== ALIGNMENT API ================================= */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HorizAlignment {
    Left,
    Center,
    Right,
    Fill,
    Justify,
}
impl fmt::Display for HorizAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HorizAlignment::Left => "left",
            HorizAlignment::Center => "center",
            HorizAlignment::Right => "right",
            HorizAlignment::Fill => "fill",
            HorizAlignment::Justify => "justify",
        })
    }
}
impl FromStr for HorizAlignment {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "left" => HorizAlignment::Left,
            "center" => HorizAlignment::Center,
            "right" => HorizAlignment::Right,
            "fill" => HorizAlignment::Fill,
            "justify" => HorizAlignment::Justify,
            _ => bail!("Unknown horizontal alignment: {s}"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VertAlignment {
    Top,
    Center,
    Bottom,
    Justify,
}
impl fmt::Display for VertAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VertAlignment::Top => "top",
            VertAlignment::Center => "center",
            VertAlignment::Bottom => "bottom",
            VertAlignment::Justify => "justify",
        })
    }
}
impl FromStr for VertAlignment {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "top" => VertAlignment::Top,
            "center" => VertAlignment::Center,
            "bottom" => VertAlignment::Bottom,
            "justify" => VertAlignment::Justify,
            _ => bail!("Unknown vertical alignment: {s}"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignSpec {
    pub horiz: Option<HorizAlignment>,
    pub vert: Option<VertAlignment>,
    pub wrap: bool,
}

impl AlignSpec {
    pub fn horizontal(horiz: HorizAlignment) -> Self {
        Self {
            horiz: Some(horiz),
            ..Default::default()
        }
    }
}

/// Font description for `set_font_with_alignment`. `color` is ARGB hex, e.g. `FFFFFFFF`.
#[derive(Debug, Clone, PartialEq)]
pub struct FontSpec {
    pub name: String,
    pub size: f32,
    pub bold: bool,
    pub italic: bool,
    pub color: Option<String>,
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            name: "Calibri".to_owned(),
            size: 11.0,
            bold: false,
            italic: false,
            color: None,
        }
    }
}

/* ========================== CORE STYLE STRUCT ============================= */

/// One `<xf>` of `cellXfs`, or a patch to merge into one.
#[derive(Debug, Clone, Default, PartialEq)]
struct StyleParts {
    num_fmt: Option<u32>,
    font: Option<u32>,
    fill: Option<u32>,
    border: Option<u32>,
    align: Option<AlignSpec>,
}

impl StyleParts {
    fn merged(mut self, patch: &StyleParts) -> StyleParts {
        if patch.num_fmt.is_some() {
            self.num_fmt = patch.num_fmt;
        }
        if patch.font.is_some() {
            self.font = patch.font;
        }
        if patch.fill.is_some() {
            self.fill = patch.fill;
        }
        if patch.border.is_some() {
            self.border = patch.border;
        }
        if patch.align.is_some() {
            self.align = patch.align.clone();
        }
        self
    }
}

/* ========================== TARGET PARSER ================================= */

#[derive(Debug, PartialEq)]
enum Target {
    Cell(String),
    Rect { c0: u32, r0: u32, c1: u32, r1: u32 },
}

static RE_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]+)([0-9]+)$").expect("valid regex"));
static RE_RECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]+[0-9]+):([A-Za-z]+[0-9]+)$").expect("valid regex")
});

fn parse_target(s: &str) -> Result<Target> {
    if RE_CELL.is_match(s) {
        return Ok(Target::Cell(s.to_ascii_uppercase()));
    }
    if let Some(caps) = RE_RECT.captures(s) {
        let (c0, r0) = split_coord(&caps[1])?;
        let (c1, r1) = split_coord(&caps[2])?;
        return Ok(Target::Rect {
            c0: c0.min(c1),
            r0: r0.min(r1),
            c1: c0.max(c1),
            r1: r0.max(r1),
        });
    }
    bail!("invalid range syntax: {s}");
}

/* ========================== PUBLIC API ==================================== */

impl XlsxEditor {
    /// Same `style` on all four sides (`thin`, `medium`, `dashed`, ...).
    pub fn set_border(&mut self, range: &str, border_style: &str) -> Result<&mut Self> {
        let border_id = self.ensure_border(border_style)?;
        self.apply_patch(
            range,
            &StyleParts {
                border: Some(border_id),
                ..Default::default()
            },
        )?;
        Ok(self)
    }

    pub fn set_font_with_alignment(
        &mut self,
        range: &str,
        font: &FontSpec,
        align: &AlignSpec,
    ) -> Result<&mut Self> {
        let font_id = self.ensure_font(font)?;
        self.apply_patch(
            range,
            &StyleParts {
                font: Some(font_id),
                align: Some(align.clone()),
                ..Default::default()
            },
        )?;
        Ok(self)
    }

    /// Solid fill, `rgb` as ARGB hex.
    pub fn set_fill(&mut self, range: &str, rgb: &str) -> Result<&mut Self> {
        let fill_id = self.ensure_fill(rgb)?;
        self.apply_patch(
            range,
            &StyleParts {
                fill: Some(fill_id),
                ..Default::default()
            },
        )?;
        Ok(self)
    }

    pub fn set_alignment(&mut self, range: &str, align: &AlignSpec) -> Result<&mut Self> {
        self.apply_patch(
            range,
            &StyleParts {
                align: Some(align.clone()),
                ..Default::default()
            },
        )?;
        Ok(self)
    }

    /// Sets several widths in one `<cols>` rewrite; columns are 0-based.
    pub fn set_column_widths<I>(&mut self, widths: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (u32, f64)>,
    {
        let (cols_start, cols_end) = self.ensure_cols_block()?;
        let mut cols_map = self.read_cols_map(cols_start, cols_end)?;
        for (col0, width) in widths {
            let prop = cols_map.entry(col0 + 1).or_default(); // в map храним 1-based
            prop.width = Some(width);
            prop.custom_width = true;
        }
        self.write_cols_map(cols_start, cols_end, &cols_map)?;
        Ok(self)
    }
}

/* ========================== CORE PATCH ENGINE ============================= */

impl XlsxEditor {
    fn apply_patch(&mut self, range: &str, patch: &StyleParts) -> Result<()> {
        let coords: Vec<String> = match parse_target(range)? {
            Target::Cell(cell) => vec![cell],
            Target::Rect { c0, r0, c1, r1 } => (r0..=r1)
                .flat_map(|r| (c0..=c1).map(move |c| format!("{}{}", col_letter(c), r)))
                .collect(),
        };

        // one new xf per distinct source style, not per cell
        let mut resolved: BTreeMap<Option<u32>, u32> = BTreeMap::new();
        for coord in coords {
            let old_sid = self.cell_style_id(&coord)?;
            let new_sid = match resolved.get(&old_sid).copied() {
                Some(sid) => sid,
                None => {
                    let base = match old_sid {
                        Some(sid) => self
                            .cell_xfs()?
                            .into_iter()
                            .nth(sid as usize)
                            .unwrap_or_default(),
                        None => StyleParts::default(),
                    };
                    let sid = self.ensure_style(&base.merged(patch))?;
                    resolved.insert(old_sid, sid);
                    sid
                }
            };
            self.apply_style_to_cell(&coord, new_sid)?;
        }
        Ok(())
    }
}

/* ========================== LOW-LEVEL HELPERS ============================= */

impl XlsxEditor {
    /// Index of an identical `<xf>` in `cellXfs`, adding one if needed.
    fn ensure_style(&mut self, parts: &StyleParts) -> Result<u32> {
        if let Some(idx) = self.cell_xfs()?.iter().position(|xf| xf == parts) {
            return Ok(idx as u32);
        }
        self.add_new_xf(parts)
    }

    /// Parses every `<xf>` inside `<cellXfs>`.
    fn cell_xfs(&self) -> Result<Vec<StyleParts>> {
        let mut rdr = Reader::from_reader(self.styles_xml.as_slice());
        rdr.config_mut().trim_text(true);

        let mut out = Vec::new();
        let mut in_xfs = false;
        let mut current: Option<StyleParts> = None;

        loop {
            match rdr.read_event()? {
                Event::Start(ref e) if e.name().as_ref() == b"cellXfs" => in_xfs = true,
                Event::End(ref e) if e.name().as_ref() == b"cellXfs" => break,
                Event::Start(ref e) if in_xfs && e.name().as_ref() == b"xf" => {
                    current = Some(xf_attrs(e)?);
                }
                Event::Empty(ref e) if in_xfs && e.name().as_ref() == b"xf" => {
                    out.push(xf_attrs(e)?);
                }
                Event::Empty(ref e) | Event::Start(ref e)
                    if in_xfs && e.name().as_ref() == b"alignment" =>
                {
                    if let Some(xf) = current.as_mut() {
                        let mut spec = AlignSpec::default();
                        for attr in e.attributes().with_checks(false).flatten() {
                            let val = String::from_utf8_lossy(&attr.value).into_owned();
                            match attr.key.as_ref() {
                                b"horizontal" => spec.horiz = val.parse().ok(),
                                b"vertical" => spec.vert = val.parse().ok(),
                                b"wrapText" => spec.wrap = val == "1" || val == "true",
                                _ => {}
                            }
                        }
                        xf.align = Some(spec);
                    }
                }
                Event::End(ref e) if in_xfs && e.name().as_ref() == b"xf" => {
                    if let Some(xf) = current.take() {
                        out.push(xf);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(out)
    }

    fn add_new_xf(&mut self, parts: &StyleParts) -> Result<u32> {
        let count = self.cell_xfs()?.len() as u32;

        let fmt_id = parts.num_fmt.unwrap_or(0);
        let mut xf = format!(r#"<xf numFmtId="{fmt_id}""#);
        if let Some(fid) = parts.font {
            xf.push_str(&format!(r#" fontId="{fid}" applyFont="1""#));
        }
        if let Some(fid) = parts.fill {
            xf.push_str(&format!(r#" fillId="{fid}" applyFill="1""#));
        }
        if let Some(bid) = parts.border {
            xf.push_str(&format!(r#" borderId="{bid}" applyBorder="1""#));
        }
        xf.push_str(r#" xfId="0""#);

        match &parts.align {
            Some(al) => {
                xf.push_str(r#" applyAlignment="1"><alignment"#);
                if let Some(h) = &al.horiz {
                    xf.push_str(&format!(r#" horizontal="{h}""#));
                }
                if let Some(v) = &al.vert {
                    xf.push_str(&format!(r#" vertical="{v}""#));
                }
                if al.wrap {
                    xf.push_str(r#" wrapText="1""#);
                }
                xf.push_str("/></xf>");
            }
            None => xf.push_str("/>"),
        }

        let pos = find_bytes(&self.styles_xml, b"</cellXfs>")
            .context("styles.xml: </cellXfs> not found")?;
        self.styles_xml.splice(pos..pos, xf.bytes());
        bump_count(&mut self.styles_xml, b"<cellXfs", b"count=\"")?;
        Ok(count)
    }

    fn ensure_font(&mut self, font: &FontSpec) -> Result<u32> {
        let mut xml = String::from("<font>");
        if font.bold {
            xml.push_str("<b/>");
        }
        if font.italic {
            xml.push_str("<i/>");
        }
        xml.push_str(&format!(r#"<sz val="{}"/>"#, font.size));
        if let Some(rgb) = &font.color {
            xml.push_str(&format!(r#"<color rgb="{}"/>"#, xml_escape(rgb)));
        }
        xml.push_str(&format!(r#"<name val="{}"/>"#, xml_escape(&font.name)));
        xml.push_str("</font>");
        self.ensure_entry("fonts", "font", &xml)
    }

    fn ensure_fill(&mut self, rgb: &str) -> Result<u32> {
        let xml = format!(
            r#"<fill><patternFill patternType="solid"><fgColor rgb="{}"/><bgColor indexed="64"/></patternFill></fill>"#,
            xml_escape(rgb)
        );
        self.ensure_entry("fills", "fill", &xml)
    }

    fn ensure_border(&mut self, style: &str) -> Result<u32> {
        let xml = format!(
            r#"<border><left style="{s}"/><right style="{s}"/><top style="{s}"/><bottom style="{s}"/><diagonal/></border>"#,
            s = xml_escape(style)
        );
        self.ensure_entry("borders", "border", &xml)
    }

    /// Returns the index of `entry_xml` inside `<block>`, appending it (and
    /// bumping `count`) when no byte-identical `<item>` exists yet.
    fn ensure_entry(&mut self, block: &str, item: &str, entry_xml: &str) -> Result<u32> {
        let close_tag = format!("</{block}>");
        let items = self.block_items(block, item)?;
        if let Some(idx) = items
            .iter()
            .position(|&(s, e)| self.styles_xml[s..e].trim_ascii() == entry_xml.as_bytes())
        {
            return Ok(idx as u32);
        }

        let insert = find_bytes(&self.styles_xml, close_tag.as_bytes())
            .with_context(|| format!("<{block}> block not found in styles.xml"))?;
        self.styles_xml.splice(insert..insert, entry_xml.bytes());
        bump_count(&mut self.styles_xml, format!("<{block}").as_bytes(), b"count=\"")?;
        Ok(items.len() as u32)
    }

    /// Byte ranges of the direct `<item>` children of `<block>`.
    fn block_items(&self, block: &str, item: &str) -> Result<Vec<(usize, usize)>> {
        let mut rdr = Reader::from_reader(self.styles_xml.as_slice());
        rdr.config_mut().trim_text(true);

        let mut ranges = Vec::new();
        let mut in_block = false;
        loop {
            let before = rdr.buffer_position() as usize;
            match rdr.read_event()? {
                Event::Start(ref e) if e.name().as_ref() == block.as_bytes() => in_block = true,
                Event::End(ref e) if e.name().as_ref() == block.as_bytes() => break,
                Event::Empty(ref e) if in_block && e.name().as_ref() == item.as_bytes() => {
                    ranges.push((before, rdr.buffer_position() as usize));
                }
                Event::Start(ref e) if in_block && e.name().as_ref() == item.as_bytes() => {
                    let mut depth = 1;
                    while depth > 0 {
                        match rdr.read_event()? {
                            Event::Start(_) => depth += 1,
                            Event::End(_) => depth -= 1,
                            Event::Eof => bail!("unterminated <{item}> in styles.xml"),
                            _ => {}
                        }
                    }
                    ranges.push((before, rdr.buffer_position() as usize));
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(ranges)
    }

    fn cell_style_id(&self, coord: &str) -> Result<Option<u32>> {
        let tag = format!(r#"<c r="{coord}""#);
        let Some(pos) = find_bytes(&self.sheet_xml, tag.as_bytes()) else {
            return Ok(None);
        };
        let tag_end = find_bytes_from(&self.sheet_xml, b">", pos).context("malformed <c> tag")?;
        match find_bytes_from(&self.sheet_xml, b" s=\"", pos).filter(|p| *p < tag_end) {
            Some(spos) => {
                let val_start = spos + 4;
                let val_end = find_bytes_from(&self.sheet_xml, b"\"", val_start)
                    .context("attr closing '\"' not found")?;
                let id = std::str::from_utf8(&self.sheet_xml[val_start..val_end])?
                    .parse::<u32>()
                    .unwrap_or(0);
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    fn apply_style_to_cell(&mut self, coord: &str, style: u32) -> Result<()> {
        let row_num = coord.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        let row_tag = format!(r#"<row r="{row_num}""#);

        let cell_tag = format!(r#"<c r="{coord}""#);
        let cpos = match find_bytes(&self.sheet_xml, row_tag.as_bytes())
            .and_then(|row_pos| find_bytes_from(&self.sheet_xml, cell_tag.as_bytes(), row_pos))
        {
            Some(p) => p,
            None => {
                // стиль на несуществующей ячейке: создаём пустую
                self.set_cell(coord, "")?;
                return self.apply_style_to_cell(coord, style);
            }
        };

        let ctag_end =
            find_bytes_from(&self.sheet_xml, b">", cpos).context("malformed <c> tag")?;
        if let Some(sattr) = find_bytes_from(&self.sheet_xml, b" s=\"", cpos) {
            if sattr < ctag_end {
                let val_start = sattr + 4;
                let val_end = find_bytes_from(&self.sheet_xml, b"\"", val_start)
                    .context("attr closing '\"' not found")?;
                self.sheet_xml
                    .splice(val_start..val_end, style.to_string().bytes());
                return Ok(());
            }
        }
        let insert_at = if self.sheet_xml[ctag_end - 1] == b'/' {
            ctag_end - 1
        } else {
            ctag_end
        };
        self.sheet_xml
            .splice(insert_at..insert_at, format!(r#" s="{style}""#).bytes());
        Ok(())
    }
}

fn xf_attrs(e: &quick_xml::events::BytesStart<'_>) -> Result<StyleParts> {
    let mut parts = StyleParts::default();
    for a in e.attributes().with_checks(false).flatten() {
        let val = || String::from_utf8_lossy(&a.value).parse::<u32>();
        match a.key.as_ref() {
            b"numFmtId" => parts.num_fmt = Some(val()?).filter(|id| *id != 0),
            b"fontId" => parts.font = Some(val()?),
            b"fillId" => parts.fill = Some(val()?),
            b"borderId" => parts.border = Some(val()?),
            _ => {}
        }
    }
    Ok(parts)
}

/* ========================== НОРМАЛИЗАЦИЯ <cols> =========================== */

#[derive(Clone, Debug, Default, PartialEq)]
struct ColProp {
    width: Option<f64>,
    style: Option<u32>,
    best_fit: bool,
    custom_width: bool,
    hidden: bool,
}

static RE_COL_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<col\b[^>]*/>"#).expect("valid regex"));
static RE_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([a-zA-Z:]+)\s*=\s*"([^"]*)""#).expect("valid regex"));

impl XlsxEditor {
    fn ensure_cols_block(&mut self) -> Result<(usize, usize)> {
        if let (Some(start), Some(end)) = (
            find_bytes(&self.sheet_xml, b"<cols>"),
            find_bytes(&self.sheet_xml, b"</cols>"),
        ) {
            return Ok((start, end + "</cols>".len()));
        }

        // <cols> идёт после <sheetFormatPr> и перед <sheetData>
        let anchor_end = if let Some(p) = find_bytes(&self.sheet_xml, b"</sheetFormatPr>") {
            p + "</sheetFormatPr>".len()
        } else {
            find_bytes(&self.sheet_xml, b"<sheetData")
                .context("<sheetData> not found on the current sheet")?
        };

        let block = b"<cols></cols>";
        self.sheet_xml
            .splice(anchor_end..anchor_end, block.iter().copied());
        Ok((anchor_end, anchor_end + block.len()))
    }

    fn read_cols_map(&self, cols_start: usize, cols_end: usize) -> Result<BTreeMap<u32, ColProp>> {
        let mut map: BTreeMap<u32, ColProp> = BTreeMap::new();
        let text = std::str::from_utf8(&self.sheet_xml[cols_start..cols_end])?;

        for m in RE_COL_TAG.find_iter(text) {
            let mut attrs = BTreeMap::new();
            for cap in RE_ATTR.captures_iter(m.as_str()) {
                attrs.insert(cap[1].to_string(), cap[2].to_string());
            }
            let flag = |k: &str| attrs.get(k).is_some_and(|v| v == "1" || v == "true");

            let min: u32 = attrs.get("min").map_or(Ok(1), |s| s.parse())?;
            let max: u32 = attrs.get("max").map_or(Ok(min), |s| s.parse())?;
            let prop = ColProp {
                width: attrs.get("width").and_then(|s| s.parse::<f64>().ok()),
                style: attrs.get("style").and_then(|s| s.parse::<u32>().ok()),
                best_fit: flag("bestFit"),
                custom_width: flag("customWidth"),
                hidden: flag("hidden"),
            };
            for i in min..=max {
                map.insert(i, prop.clone());
            }
        }
        Ok(map)
    }

    fn write_cols_map(
        &mut self,
        cols_start: usize,
        cols_end: usize,
        map: &BTreeMap<u32, ColProp>,
    ) -> Result<()> {
        // Сжимаем одинаковые проперти в диапазоны
        let mut out = String::with_capacity(256);
        out.push_str("<cols>");

        let mut it = map.iter().peekable();
        while let Some((&i, prop)) = it.next() {
            let mut j = i;
            while let Some(&(&k, prop2)) = it.peek() {
                if k == j + 1 && prop == prop2 {
                    j = k;
                    it.next();
                } else {
                    break;
                }
            }
            out.push_str(&build_one_col_tag(i, j, prop));
        }
        out.push_str("</cols>");

        self.sheet_xml.splice(cols_start..cols_end, out.bytes());
        Ok(())
    }
}

fn build_one_col_tag(min: u32, max: u32, p: &ColProp) -> String {
    let mut s = format!(r#"<col min="{min}" max="{max}""#);
    if let Some(w) = p.width {
        s.push_str(&format!(r#" width="{w}""#));
        if p.custom_width {
            s.push_str(r#" customWidth="1""#);
        }
    }
    if let Some(st) = p.style {
        s.push_str(&format!(r#" style="{st}""#));
    }
    if p.best_fit {
        s.push_str(r#" bestFit="1""#);
    }
    if p.hidden {
        s.push_str(r#" hidden="1""#);
    }
    s.push_str("/>");
    s
}

/* ========================== BYTE/STRING HELPERS =========================== */

/// 0-based column index to letters: 0 -> `A`, 26 -> `AA`.
pub fn col_letter(mut n: u32) -> String {
    let mut s = String::new();
    loop {
        s.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    s
}

/// Letters (a coordinate's digits are ignored) to a 0-based column index.
pub(crate) fn col_index(s: &str) -> usize {
    s.bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .fold(0, |acc, b| acc * 26 + (b.to_ascii_uppercase() - b'A' + 1) as usize)
        .saturating_sub(1)
}

fn split_coord(coord: &str) -> Result<(u32, u32)> {
    let p = coord
        .find(|c: char| c.is_ascii_digit())
        .with_context(|| format!("no row in coordinate {coord}"))?;
    Ok((col_index(&coord[..p]) as u32, coord[p..].parse::<u32>()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_round_trip() {
        assert_eq!(col_letter(0), "A");
        assert_eq!(col_letter(6), "G");
        assert_eq!(col_letter(26), "AA");
        assert_eq!(col_index("AA"), 26);
        assert_eq!(col_index("g12"), 6);
    }

    #[test]
    fn parse_target_normalises_rect() -> Result<()> {
        assert_eq!(parse_target("b2")?, Target::Cell("B2".to_owned()));
        assert_eq!(
            parse_target("G3:A1")?,
            Target::Rect { c0: 0, r0: 1, c1: 6, r1: 3 }
        );
        assert!(parse_target("A:").is_err());
        Ok(())
    }
}
