//! File exporters for collected page records: CSV, JSON, and XML.

use chrono::Local;
use dredge_common::PageRecord;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer as XmlWriter;
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("xml error: {0}")]
    Xml(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

fn xml_err(e: impl fmt::Display) -> ExportError {
    ExportError::Xml(e.to_string())
}

/// Supported file export formats. Database persistence is handled by the
/// store, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Xml,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Xml => "xml",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "xml" => Ok(ExportFormat::Xml),
            other => Err(format!("unsupported format: {other}")),
        }
    }
}

/// Resolve the target path inside `dir`: default the filename to a
/// timestamped name, and append the format extension when missing.
pub fn resolve_export_path(
    dir: &Path,
    filename: Option<&str>,
    format: ExportFormat,
) -> PathBuf {
    let name = match filename {
        Some(name) => name.to_string(),
        None => format!("scraped_{}", Local::now().format("%Y%m%d_%H%M%S")),
    };
    let ext = format.extension();
    let name = if name.ends_with(&format!(".{ext}")) {
        name
    } else {
        format!("{name}.{ext}")
    };
    dir.join(name)
}

/// Write records in `format` to `path`, creating parent directories.
pub fn export(records: &[PageRecord], path: &Path, format: ExportFormat) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match format {
        ExportFormat::Csv => export_csv(records, path)?,
        ExportFormat::Json => export_json(records, path)?,
        ExportFormat::Xml => export_xml(records, path)?,
    }
    info!(path = %path.display(), count = records.len(), "export.written");
    Ok(())
}

fn export_csv(records: &[PageRecord], path: &Path) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["url", "fetched_at", "title", "html_length", "texts"])?;
    for record in records {
        writer.write_record([
            record.url.as_str(),
            &record.fetched_at.to_rfc3339(),
            record.title.as_str(),
            &record.html_length.to_string(),
            &serde_json::to_string(&record.texts)?,
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn export_json(records: &[PageRecord], path: &Path) -> Result<(), ExportError> {
    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(file, records)?;
    Ok(())
}

fn export_xml(records: &[PageRecord], path: &Path) -> Result<(), ExportError> {
    let file = BufWriter::new(File::create(path)?);
    let mut writer = XmlWriter::new_with_indent(file, b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("data")))
        .map_err(xml_err)?;

    for record in records {
        writer
            .write_event(Event::Start(BytesStart::new("item")))
            .map_err(xml_err)?;

        write_text_element(&mut writer, "url", &record.url)?;
        write_text_element(&mut writer, "fetched_at", &record.fetched_at.to_rfc3339())?;
        write_text_element(&mut writer, "title", &record.title)?;
        write_text_element(&mut writer, "html_length", &record.html_length.to_string())?;

        writer
            .write_event(Event::Start(BytesStart::new("texts")))
            .map_err(xml_err)?;
        for (selector, text) in &record.texts {
            let mut el = BytesStart::new("text");
            el.push_attribute(("selector", selector.as_str()));
            writer.write_event(Event::Start(el)).map_err(xml_err)?;
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(xml_err)?;
            writer
                .write_event(Event::End(BytesEnd::new("text")))
                .map_err(xml_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("texts")))
            .map_err(xml_err)?;

        writer
            .write_event(Event::End(BytesEnd::new("item")))
            .map_err(xml_err)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("data")))
        .map_err(xml_err)?;
    Ok(())
}

fn write_text_element<W: std::io::Write>(
    writer: &mut XmlWriter<W>,
    name: &str,
    value: &str,
) -> Result<(), ExportError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)?;
    Ok(())
}
