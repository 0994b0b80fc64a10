//! Recalculation flag in `xl/workbook.xml`.
//!
//! Formulas that reference rewritten counts (row and column totals) keep
//! their stale cached values in the package. Setting
//! `<calcPr fullCalcOnLoad="1"/>` makes spreadsheet applications recompute
//! them when the file is opened, without this crate evaluating anything.

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Result, ResultExt};

/// `CT_Workbook` children that must come after `calcPr`.
const AFTER_CALC_PR: &[&[u8]] = &[
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

/// Set `fullCalcOnLoad="1"` on `calcPr`, inserting the element in schema
/// order when the workbook has none. Every other byte of the part is kept.
pub(crate) fn force_full_calc_on_load(workbook_xml: &[u8]) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(workbook_xml.len() + 64));

    let mut buf = Vec::new();
    let mut depth = 0_usize;
    // Namespace prefix of the root element, reused for an inserted calcPr.
    let mut prefix: Vec<u8> = Vec::new();
    let mut done = false;

    loop {
        buf.clear();
        let event = reader
            .read_event_into(&mut buf)
            .or_serialization("reading xl/workbook.xml")?;
        match event {
            Event::Start(ref e) if depth == 0 => {
                prefix = e
                    .name()
                    .prefix()
                    .map(|p| p.as_ref().to_vec())
                    .unwrap_or_default();
                depth += 1;
                writer
                    .write_event(&event)
                    .or_serialization("writing xl/workbook.xml")?;
            }
            Event::Empty(ref e) | Event::Start(ref e)
                if depth == 1 && e.local_name().as_ref() == b"calcPr" =>
            {
                let patched = patched_calc_pr(e)?;
                let is_start = matches!(event, Event::Start(_));
                if is_start {
                    depth += 1;
                }
                let out = if is_start {
                    Event::Start(patched)
                } else {
                    Event::Empty(patched)
                };
                writer
                    .write_event(out)
                    .or_serialization("writing xl/workbook.xml")?;
                done = true;
            }
            Event::Empty(ref e) | Event::Start(ref e)
                if depth == 1 && !done && AFTER_CALC_PR.contains(&e.local_name().as_ref()) =>
            {
                write_calc_pr(&mut writer, &prefix)?;
                done = true;
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
                writer
                    .write_event(&event)
                    .or_serialization("writing xl/workbook.xml")?;
            }
            Event::End(_) if depth == 1 => {
                if !done {
                    write_calc_pr(&mut writer, &prefix)?;
                    done = true;
                }
                depth -= 1;
                writer
                    .write_event(&event)
                    .or_serialization("writing xl/workbook.xml")?;
            }
            Event::Eof => break,
            _ => {
                match event {
                    Event::Start(_) => depth += 1,
                    Event::End(_) => depth = depth.saturating_sub(1),
                    _ => {}
                }
                writer
                    .write_event(&event)
                    .or_serialization("writing xl/workbook.xml")?;
            }
        }
    }

    Ok(writer.into_inner())
}

fn qualified(prefix: &[u8], local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{local}", String::from_utf8_lossy(prefix))
    }
}

fn write_calc_pr(writer: &mut Writer<Vec<u8>>, prefix: &[u8]) -> Result<()> {
    let mut calc_pr = BytesStart::new(qualified(prefix, "calcPr"));
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    writer
        .write_event(Event::Empty(calc_pr))
        .or_serialization("writing xl/workbook.xml")
}

fn patched_calc_pr(e: &BytesStart<'_>) -> Result<BytesStart<'static>> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut calc_pr = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr.or_serialization("reading calcPr attributes")?;
        if attr.key.as_ref() == b"fullCalcOnLoad" {
            continue;
        }
        calc_pr.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
    }
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    Ok(calc_pr)
}
