#[cfg(test)]
use crate::{AlignSpec, FontSpec, HorizAlignment, XlsxEditor};
#[cfg(test)]
use anyhow::Result;
#[cfg(test)]
use std::io::{Read, Write};

#[cfg(test)]
fn part(path: &std::path::Path, name: &str) -> Result<String> {
    let mut zip = zip::ZipArchive::new(std::fs::File::open(path)?)?;
    let mut out = String::new();
    zip.by_name(name)?.read_to_string(&mut out)?;
    Ok(out)
}

#[test]
fn blank_workbook_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file_name = dir.path().join("blank.xlsx");

    let mut app = XlsxEditor::blank("Status & Co")?;
    assert!(app.read_rows()?.is_empty());
    app.append_row(["Tenant Name", "Remarks"])?;
    app.save(&file_name)?;

    let workbook = part(&file_name, "xl/workbook.xml")?;
    assert!(workbook.contains(r#"<sheet name="Status &amp; Co" sheetId="1""#));
    let mut app = XlsxEditor::open_sheet(&file_name, 1)?;
    assert_eq!(app.read_rows()?, vec![vec!["Tenant Name", "Remarks"]]);
    // appending continues after the rows already on disk
    app.append_row(["Acme", "ok"])?;
    assert_eq!(app.read_rows()?.len(), 2);
    assert_eq!(app.read_rows()?[1], vec!["Acme", "ok"]);
    Ok(())
}

#[test]
fn append_keeps_order_and_text() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file_name = dir.path().join("order.xlsx");

    let mut app = XlsxEditor::blank("Sheet1")?;
    app.append_row(["h1", "h2", "h3"])?;
    app.append_table([["Acme", "123", "=1+1"], ["R&D <x>", " padded ", ""]])?;
    app.save(&file_name)?;

    let app = XlsxEditor::open_sheet(&file_name, 1)?;
    let rows = app.read_rows()?;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1], vec!["Acme", "123", "=1+1"]);
    assert_eq!(rows[2], vec!["R&D <x>", " padded ", ""]);

    // numbers and formulas stay text
    let sheet = part(&file_name, "xl/worksheets/sheet1.xml")?;
    assert!(!sheet.contains("<f>"));
    assert!(sheet.contains(r#"<c r="B2" t="inlineStr">"#));
    Ok(())
}

#[test]
fn test_insert_cells() -> Result<()> {
    let mut app = XlsxEditor::blank("Sheet1")?;
    app.append_row(["a", "b"])?;
    app.set_cell("C1", "c")?;
    app.set_cell("A1", "A")?;
    app.set_cell("B3", "World")?;
    app.set_cell("A2", "Hello")?;

    let rows = app.read_rows()?;
    assert_eq!(
        rows,
        vec![vec!["A", "b", "c"], vec!["Hello"], vec!["", "World"]]
    );
    app.append_row(["next"])?;
    assert_eq!(app.read_rows()?[3], vec!["next"]);
    Ok(())
}

#[test]
fn reads_shared_strings_and_values() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file_name = dir.path().join("shared.xlsx");

    // a workbook shaped the way spreadsheet apps save it
    let files: [(&str, &str); 6] = [
        (
            "[Content_Types].xml",
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#,
        ),
        (
            "xl/workbook.xml",
            r#"<workbook xmlns:r="r"><sheets><sheet name="Data &amp; More" sheetId="1" r:id="rId7"/></sheets></workbook>"#,
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<Relationships><Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/data.xml"/><Relationship Id="rId8" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/></Relationships>"#,
        ),
        (
            "xl/sharedStrings.xml",
            r#"<sst count="2"><si><t>Tenant Name</t></si><si><t>Acme</t></si></sst>"#,
        ),
        (
            "xl/styles.xml",
            r#"<styleSheet><fonts count="1"><font/></fonts><fills count="1"><fill/></fills><borders count="1"><border/></borders><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs></styleSheet>"#,
        ),
        (
            "xl/worksheets/data.xml",
            r#"<worksheet><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1"><v>42</v></c></row><row r="2"><c r="A2" t="s"><v>1</v></c><c r="B2" t="b"><v>1</v></c></row></sheetData></worksheet>"#,
        ),
    ];
    let mut zout = zip::ZipWriter::new(std::fs::File::create(&file_name)?);
    for (name, body) in files {
        zout.start_file(name, zip::write::SimpleFileOptions::default())?;
        zout.write_all(body.as_bytes())?;
    }
    zout.finish()?;

    let app = XlsxEditor::open_sheet(&file_name, 1)?;
    assert_eq!(
        app.read_rows()?,
        vec![vec!["Tenant Name", "", "42"], vec!["Acme", "TRUE"]]
    );
    Ok(())
}

#[test]
fn styling_adds_fonts_fills_and_cols() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file_name = dir.path().join("styled.xlsx");

    let mut app = XlsxEditor::blank("Sheet1")?;
    app.append_row(["Tenant Name", "Remarks"])?;
    app.append_row(["Acme", "ok"])?;

    let header_font = FontSpec {
        bold: true,
        color: Some("FFFFFFFF".to_owned()),
        ..Default::default()
    };
    app.set_font_with_alignment("A1:B1", &header_font, &AlignSpec::horizontal(HorizAlignment::Center))?
        .set_fill("A1:B1", "FF1F4E78")?
        .set_border("A1:B2", "thin")?
        .set_alignment("A2:B2", &AlignSpec::horizontal(HorizAlignment::Left))?
        .set_column_widths([(0, 16.0), (1, 12.0)])?;
    // same border again must not grow the border table
    app.set_border("A1:B2", "thin")?;
    app.set_column_widths([(2, 8.5)])?;
    app.save(&file_name)?;

    let styles = part(&file_name, "xl/styles.xml")?;
    assert!(styles.contains(r#"<fonts count="2">"#));
    assert!(styles.contains(r#"<color rgb="FFFFFFFF"/>"#));
    assert!(styles.contains(r#"<fills count="3">"#));
    assert!(styles.contains(r#"<fgColor rgb="FF1F4E78"/>"#));
    assert!(styles.contains(r#"<borders count="2">"#));
    assert!(styles.contains(r#"horizontal="center""#));

    let sheet = part(&file_name, "xl/worksheets/sheet1.xml")?;
    assert!(sheet.contains(
        r#"<cols><col min="1" max="1" width="16" customWidth="1"/><col min="2" max="2" width="12" customWidth="1"/><col min="3" max="3" width="8.5" customWidth="1"/></cols><sheetData>"#
    ));
    // header cells share one xf, data cells share another
    let sid = |coord: &str| -> Option<String> {
        let start = sheet.find(&format!(r#"<c r="{coord}""#))?;
        let tag = &sheet[start..start + sheet[start..].find('>')?];
        let s = tag.find(" s=\"")? + 4;
        Some(tag[s..s + tag[s..].find('"')?].to_owned())
    };
    assert_eq!(sid("A1"), sid("B1"));
    assert_eq!(sid("A2"), sid("B2"));
    assert_ne!(sid("A1"), sid("A2"));

    // values survive styling
    let app = XlsxEditor::open_sheet(&file_name, 1)?;
    assert_eq!(app.read_rows()?[1], vec!["Acme", "ok"]);
    Ok(())
}

#[test]
fn style_on_missing_cell_creates_it() -> Result<()> {
    let mut app = XlsxEditor::blank("Sheet1")?;
    app.append_row(["x"])?;
    app.set_fill("C2", "FFFF0000")?;
    assert_eq!(app.read_rows()?, vec![vec!["x"], vec!["", "", ""]]);
    Ok(())
}

#[test]
fn save_over_source_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file_name = dir.path().join("inplace.xlsx");

    let mut app = XlsxEditor::blank("Sheet1")?;
    app.append_row(["first"])?;
    app.save(&file_name)?;

    let mut app = XlsxEditor::open_sheet(&file_name, 1)?;
    app.append_row(["second"])?;
    app.save(&file_name)?;
    app.append_row(["third"])?;
    app.save(&file_name)?;

    let app = XlsxEditor::open_sheet(&file_name, 1)?;
    assert_eq!(
        app.read_rows()?,
        vec![vec!["first"], vec!["second"], vec!["third"]]
    );
    // no temp files left behind
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);
    Ok(())
}

#[test]
fn open_unknown_sheet_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file_name = dir.path().join("one.xlsx");
    XlsxEditor::blank("Sheet1")?.save(&file_name)?;

    assert!(XlsxEditor::open_sheet(&file_name, 2).is_err());
    assert!(XlsxEditor::open_sheet(&file_name, 0).is_err());
    Ok(())
}

#[test]
fn control_characters_are_escaped_in_cells() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file_name = dir.path().join("ctrl.xlsx");

    let values = ["a\u{1}b\u{b}c", "_x0041_ literal", "tab\tok\nline"];
    let mut app = XlsxEditor::blank("Sheet1")?;
    app.append_row(values)?;
    app.set_cell("A2", "bell\u{7}")?;
    app.save(&file_name)?;

    let sheet = part(&file_name, "xl/worksheets/sheet1.xml")?;
    assert!(sheet.contains("a_x0001_b_x000B_c"));
    assert!(sheet.contains("_x005F_x0041_ literal"));
    assert!(sheet.contains("bell_x0007_"));
    assert!(!sheet.contains(['\u{1}', '\u{7}', '\u{b}']));

    let app = XlsxEditor::open_sheet(&file_name, 1)?;
    assert_eq!(
        app.read_rows()?,
        vec![values.to_vec(), vec!["bell\u{7}"]]
    );
    Ok(())
}

#[test]
fn escaped_shared_strings_are_decoded() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file_name = dir.path().join("sst.xlsx");

    let files: [(&str, &str); 5] = [
        (
            "xl/workbook.xml",
            r#"<workbook xmlns:r="r"><sheets><sheet name="S" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<Relationships><Relationship Id="rId1" Type="worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/></Relationships>"#,
        ),
        (
            "xl/sharedStrings.xml",
            r#"<sst><si><t>one_x000A_two</t></si><si><t>_x005F_x0041_</t></si></sst>"#,
        ),
        ("xl/styles.xml", r#"<styleSheet/>"#),
        (
            "xl/worksheets/sheet1.xml",
            r#"<worksheet><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row></sheetData></worksheet>"#,
        ),
    ];
    let mut zout = zip::ZipWriter::new(std::fs::File::create(&file_name)?);
    for (name, body) in files {
        zout.start_file(name, zip::write::SimpleFileOptions::default())?;
        zout.write_all(body.as_bytes())?;
    }
    zout.finish()?;

    let app = XlsxEditor::open_sheet(&file_name, 1)?;
    assert_eq!(app.read_rows()?, vec![vec!["one\ntwo", "_x0041_"]]);
    Ok(())
}

#[cfg(unix)]
#[test]
fn save_keeps_file_permissions() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir()?;
    let file_name = dir.path().join("shared.xlsx");

    let mut app = XlsxEditor::blank("Sheet1")?;
    app.append_row(["first"])?;
    app.save(&file_name)?;
    std::fs::set_permissions(&file_name, std::fs::Permissions::from_mode(0o644))?;

    let mut app = XlsxEditor::open_sheet(&file_name, 1)?;
    app.append_row(["second"])?;
    app.save(&file_name)?;

    let mode = std::fs::metadata(&file_name)?.permissions().mode();
    assert_eq!(mode & 0o777, 0o644);
    assert_eq!(app.read_rows()?.len(), 2);
    Ok(())
}
