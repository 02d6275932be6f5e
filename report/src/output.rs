//! Report serialization.
//!
//! The report is written with 4-space indentation so that runs diff
//! cleanly. It goes to a temporary file next to the destination first and
//! is renamed into place, so a failed run never leaves a partial report.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::OutputResult;
use crate::models::ReportDocument;

const INDENT: &[u8] = b"    ";

/// Serialize any value with the report's indentation.
pub fn to_indented_json<T: Serialize + ?Sized>(value: &T) -> OutputResult<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(INDENT);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    // serde_json only emits UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Render the report as indented JSON text.
pub fn render_report(report: &ReportDocument) -> OutputResult<String> {
    to_indented_json(report)
}

/// Write the report to `path`, replacing any existing file atomically.
pub fn write_report(report: &ReportDocument, path: &Path) -> OutputResult<()> {
    let content = render_report(report)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(content.as_bytes())?;
    file.write_all(b"\n")?;
    file.as_file().sync_all()?;
    file.persist(path)?;

    Ok(())
}
