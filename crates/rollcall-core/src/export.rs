//! Delimited-text export of attendance records.
//!
//! Quoting follows the legacy format byte-for-byte: only the student name is
//! wrapped in double quotes and embedded quotes are not escaped.

use crate::summary::AttendanceSummary;
use crate::types::{AttendanceRecord, Method, DATE_FORMAT};
use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

const PLAIN_HEADER: [&str; 8] = [
    "Student ID",
    "Student Name",
    "Class",
    "Date",
    "Time",
    "Method",
    "Confidence (%)",
    "Status",
];

const SPREADSHEET_HEADER: [&str; 8] = [
    "Student ID",
    "Student Name",
    "Class",
    "Date",
    "Time",
    "Recognition Method",
    "Confidence Percentage",
    "Attendance Status",
];

const CSV_MIME: &str = "text/csv;charset=utf-8";
const SPREADSHEET_MIME: &str = "application/vnd.ms-excel;charset=utf-8";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("no records to export")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Plain,
    SpreadsheetCompatible,
}

impl ExportFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Plain => CSV_MIME,
            ExportFormat::SpreadsheetCompatible => SPREADSHEET_MIME,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Plain => "csv",
            ExportFormat::SpreadsheetCompatible => "xlsx",
        }
    }

    fn header(&self) -> [&'static str; 8] {
        match self {
            ExportFormat::Plain => PLAIN_HEADER,
            ExportFormat::SpreadsheetCompatible => SPREADSHEET_HEADER,
        }
    }

    fn row(&self, r: &AttendanceRecord) -> String {
        let (method, confidence, status) = match self {
            ExportFormat::Plain => (
                r.method.as_str().to_string(),
                r.confidence.to_string(),
                r.status.as_str().to_string(),
            ),
            ExportFormat::SpreadsheetCompatible => (
                r.method.display_name().to_string(),
                format!("{}%", r.confidence),
                r.status.as_str().to_uppercase(),
            ),
        };
        [
            r.student_id.clone(),
            format!("\"{}\"", r.student_name),
            r.class.clone(),
            r.date.clone(),
            r.time.clone(),
            method,
            confidence,
            status,
        ]
        .join(",")
    }
}

/// Suggested download name: `attendance[_<category>]_<date>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportName {
    pub category: Option<String>,
    pub date: NaiveDate,
}

impl ExportName {
    pub fn dated(date: NaiveDate) -> Self {
        Self {
            category: None,
            date,
        }
    }

    pub fn with_category(category: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            category: Some(category.into()),
            date,
        }
    }

    pub fn file_name(&self, extension: &str) -> String {
        let date = self.date.format(DATE_FORMAT);
        match &self.category {
            Some(category) => format!("attendance_{category}_{date}.{extension}"),
            None => format!("attendance_{date}.{extension}"),
        }
    }
}

/// A rendered file ready to hand to whatever performs the download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPayload {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub filename: String,
}

/// Render `records` in input order. An empty slice is an error, not an empty file.
pub fn serialize(
    records: &[AttendanceRecord],
    format: ExportFormat,
    name: &ExportName,
) -> Result<ExportPayload, ExportError> {
    if records.is_empty() {
        return Err(ExportError::Empty);
    }

    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(format.header().join(","));
    lines.extend(records.iter().map(|r| format.row(r)));

    let payload = ExportPayload {
        bytes: lines.join("\n").into_bytes(),
        mime_type: format.mime_type(),
        filename: name.file_name(format.extension()),
    };
    tracing::info!(
        records = records.len(),
        format = ?format,
        filename = %payload.filename,
        "export rendered"
    );
    Ok(payload)
}

/// Header information for a summary report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportMeta {
    /// e.g. "daily", "weekly".
    pub report_type: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub generated_at: NaiveDateTime,
}

/// Render a two-column `Metric,Value` report for `summary`.
pub fn serialize_summary(summary: &AttendanceSummary, meta: &ReportMeta) -> ExportPayload {
    let rate = summary
        .attendance_rate()
        .map(|r| format!("{r:.1}%"))
        .unwrap_or_else(|| "N/A".to_string());
    let average = summary
        .average_confidence
        .map(|c| format!("{c:.1}%"))
        .unwrap_or_else(|| "N/A".to_string());

    let mut rows = vec![
        format!("Report Type,{}", meta.report_type.to_uppercase()),
        format!("Generated,{}", meta.generated_at.format("%Y-%m-%d %H:%M:%S")),
        format!(
            "Date Range,{} to {}",
            meta.from.format(DATE_FORMAT),
            meta.to.format(DATE_FORMAT)
        ),
        String::new(),
        "Metric,Value".to_string(),
        format!("Total Records,{}", summary.total),
        format!("Present,{}", summary.present),
        format!("Absent,{}", summary.absent),
        format!("Late,{}", summary.late),
        format!("Attendance Rate,{rate}"),
        format!("Average Confidence,{average}"),
    ];
    for method in Method::ALL {
        rows.push(format!(
            "{} Recognition,{}",
            method.display_name(),
            summary.by_method.get(method)
        ));
    }

    let name = ExportName::with_category(
        format!("report_{}", meta.report_type.to_lowercase()),
        meta.generated_at.date(),
    );
    ExportPayload {
        bytes: rows.join("\n").into_bytes(),
        mime_type: CSV_MIME,
        filename: name.file_name("csv"),
    }
}
