use crate::{
    STYLES_PATH, Source, XlsxEditor, read_entry, read_part::parse_shared_strings, sheet_rids,
    xml_escape,
};
use ::zip as zip_crate;
use anyhow::{Context, Result, bail};
use quick_xml::{Reader, events::Event};
use std::{
    io::{Cursor, Read, Seek, Write},
    path::Path,
};
use tempfile::NamedTempFile;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

// fills 0 и 1 зарезервированы Excel (none / gray125)
const BLANK_STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

const EMPTY_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData></sheetData></worksheet>"#;

/// Work with files
impl XlsxEditor {
    /// Creates a workbook with one empty sheet named `sheet_name`, held in memory
    /// until `save`.
    pub fn blank(sheet_name: &str) -> Result<Self> {
        let workbook_xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
            xml_escape(sheet_name)
        );

        let mut zout = zip_crate::ZipWriter::new(Cursor::new(Vec::new()));
        let opt: zip_crate::write::FileOptions<'_, ()> = zip_crate::write::FileOptions::default()
            .compression_method(zip_crate::CompressionMethod::Deflated);
        let parts: [(&str, &[u8]); 6] = [
            ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
            ("_rels/.rels", ROOT_RELS.as_bytes()),
            ("xl/workbook.xml", workbook_xml.as_bytes()),
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.as_bytes()),
            (STYLES_PATH, BLANK_STYLES.as_bytes()),
            ("xl/worksheets/sheet1.xml", EMPTY_SHEET.as_bytes()),
        ];
        for (name, content) in parts {
            zout.start_file(name, opt)?;
            zout.write_all(content)?;
        }
        let bytes = zout.finish()?.into_inner();

        Self::from_source(Source::Memory(bytes), 1)
    }

    pub(crate) fn from_source(source: Source, sheet_id: usize) -> Result<Self> {
        let mut zip = source.archive()?;

        let workbook_xml = read_entry(&mut zip, "xl/workbook.xml")?;
        let rels_xml = read_entry(&mut zip, "xl/_rels/workbook.xml.rels")?;
        let sheets = sheet_rids(&workbook_xml)?;

        let rid = sheets
            .get(sheet_id.wrapping_sub(1))
            .cloned()
            .with_context(|| format!("Sheet #{sheet_id} not found ({} sheets)", sheets.len()))?;
        let rels = relationships(&rels_xml)?;
        let target = rels
            .iter()
            .find(|rel| rel.id == rid)
            .map(|rel| rel.target.as_str())
            .with_context(|| format!("Relationship `{rid}` not found in workbook.xml.rels"))?;
        let sheet_path = part_path(target);

        let sheet_xml = read_entry(&mut zip, &sheet_path)?;
        let styles_xml = read_entry(&mut zip, STYLES_PATH)?;

        // sharedStrings is optional: files we write use inline strings only
        let shared_strings = match rels.iter().find(|rel| rel.kind.ends_with("/sharedStrings")) {
            Some(rel) => parse_shared_strings(&read_entry(&mut zip, &part_path(&rel.target))?)?,
            None => Vec::new(),
        };
        drop(zip);

        let last_row = calc_last_row(&sheet_xml);
        Ok(Self {
            source,
            sheet_path,
            sheet_xml,
            last_row,
            styles_xml,
            shared_strings,
        })
    }

    /// Writes the workbook to `dst`.
    ///
    /// The package is assembled in a temporary file next to `dst` and renamed
    /// over it, so `dst` is either the old file or the complete new one. `dst`
    /// may be the file the editor was opened from.
    pub fn save<P: AsRef<Path>>(&mut self, dst: P) -> Result<()> {
        let dst = dst.as_ref();
        let dir = match dst.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("cannot create temp file in {}", dir.display()))?;

        {
            let mut zin = self.source.archive()?;
            self.write_package(&mut zin, tmp.as_file_mut())?;
        }
        // keep the mode of the file being replaced; a fresh temp file is 0600
        if let Ok(meta) = std::fs::metadata(dst) {
            tmp.as_file().set_permissions(meta.permissions())?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(dst)
            .map_err(|e| e.error)
            .with_context(|| format!("cannot replace {}", dst.display()))?;

        self.source = Source::File(dst.to_path_buf());
        Ok(())
    }

    fn write_package<R: Read + Seek, W: Write + Seek>(
        &self,
        zin: &mut zip_crate::ZipArchive<R>,
        out: W,
    ) -> Result<()> {
        let mut zout = zip_crate::ZipWriter::new(out);
        let opt: zip_crate::write::FileOptions<'_, ()> = zip_crate::write::FileOptions::default()
            .compression_method(zip_crate::CompressionMethod::Deflated)
            .compression_level(Some(1));

        let mut sheet_written = false;
        for i in 0..zin.len() {
            let file = zin.by_index_raw(i)?;
            let name = file.name().to_owned();
            if name == self.sheet_path {
                zout.start_file(name.as_str(), opt)?;
                zout.write_all(&self.sheet_xml)?;
                sheet_written = true;
            } else if name == STYLES_PATH {
                zout.start_file(name.as_str(), opt)?;
                zout.write_all(&self.styles_xml)?;
            } else {
                zout.raw_copy_file(file)?;
            }
        }
        if !sheet_written {
            bail!("{} missing from source package", self.sheet_path);
        }

        zout.finish()?;
        Ok(())
    }
}

#[derive(Debug)]
struct Relationship {
    id: String,
    kind: String,
    target: String,
}

fn relationships(rels_xml: &[u8]) -> Result<Vec<Relationship>> {
    let mut rdr = Reader::from_reader(rels_xml);
    rdr.config_mut().trim_text(true);

    let mut out = Vec::new();
    loop {
        match rdr.read_event()? {
            Event::Empty(ref e) | Event::Start(ref e) if e.name().as_ref() == b"Relationship" => {
                let mut rel = Relationship {
                    id: String::new(),
                    kind: String::new(),
                    target: String::new(),
                };
                for a in e.attributes().with_checks(false).flatten() {
                    let v = String::from_utf8_lossy(&a.value).into_owned();
                    match a.key.as_ref() {
                        b"Id" => rel.id = v,
                        b"Type" => rel.kind = v,
                        b"Target" => rel.target = v,
                        _ => {}
                    }
                }
                out.push(rel);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// Workbook relationship targets are relative to `xl/` unless absolute.
fn part_path(target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        abs.to_owned()
    } else if target.starts_with("xl/") {
        target.to_owned()
    } else {
        format!("xl/{target}")
    }
}

fn calc_last_row(sheet_xml: &[u8]) -> u32 {
    let mut rdr = Reader::from_reader(sheet_xml);
    rdr.config_mut().trim_text(true);

    let mut last_row = 0u32;
    while let Ok(ev) = rdr.read_event() {
        match ev {
            Event::Empty(ref e) | Event::Start(ref e) if e.name().as_ref() == b"row" => {
                match e.attributes().with_checks(false).flatten().find_map(|a| {
                    (a.key.as_ref() == b"r").then(|| String::from_utf8_lossy(&a.value).into_owned())
                }) {
                    Some(r) => last_row = r.parse::<u32>().unwrap_or(last_row),
                    // rows without `r` follow the previous one
                    None => last_row += 1,
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    last_row
}
