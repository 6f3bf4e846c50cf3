use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context};
use chrono::NaiveDateTime;

use crate::models::{DisciplineRecord, EnrollmentRecord};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const ENROLLMENT_FIELDS: &[&str] = &[
    "student_id",
    "enrollment_id",
    "course_name",
    "active",
    "enrollment_date",
    "first_access",
    "last_access",
];

pub const DISCIPLINE_FIELDS: &[&str] = &[
    "student_id",
    "discipline_name",
    "release_date",
    "start_date",
    "end_date",
    "completion_pct",
    "final_grade",
    "last_access",
];

/// A record that can be flattened into named text columns.
pub trait ExportRow {
    const FIELDS: &'static [&'static str];

    fn field(&self, name: &str) -> Option<String>;
}

impl ExportRow for EnrollmentRecord {
    const FIELDS: &'static [&'static str] = ENROLLMENT_FIELDS;

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "student_id" => Some(self.student_id.clone()),
            "enrollment_id" => self.enrollment_id.clone(),
            "course_name" => Some(self.course_name.clone()),
            "active" => Some(if self.active { "1" } else { "0" }.to_string()),
            "enrollment_date" => timestamp(self.enrollment_date),
            "first_access" => timestamp(self.first_access),
            "last_access" => timestamp(self.last_access),
            _ => None,
        }
    }
}

impl ExportRow for DisciplineRecord {
    const FIELDS: &'static [&'static str] = DISCIPLINE_FIELDS;

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "student_id" => Some(self.student_id.clone()),
            "discipline_name" => Some(self.discipline_name.clone()),
            "release_date" => timestamp(self.released_at),
            "start_date" => timestamp(self.start_date),
            "end_date" => timestamp(self.end_date),
            "completion_pct" => self.completion_pct.map(|v| v.to_string()),
            "final_grade" => self.final_grade.map(|v| v.to_string()),
            "last_access" => timestamp(self.last_access),
            _ => None,
        }
    }
}

fn timestamp(value: Option<NaiveDateTime>) -> Option<String> {
    value.map(|v| v.format(TIMESTAMP_FORMAT).to_string())
}

/// Resolves the requested column list; an empty request selects every column.
pub fn select_columns<R: ExportRow>(requested: &[String]) -> anyhow::Result<Vec<&'static str>> {
    if requested.is_empty() {
        return Ok(R::FIELDS.to_vec());
    }

    let mut columns = Vec::with_capacity(requested.len());
    for name in requested {
        let name = name.trim();
        match R::FIELDS.iter().find(|field| **field == name) {
            Some(field) => columns.push(*field),
            None => bail!(
                "unknown column `{}` (available: {})",
                name,
                R::FIELDS.join(", ")
            ),
        }
    }
    Ok(columns)
}

/// Writes the chosen columns as UTF-8 CSV with a byte-order mark, so the file
/// opens with the right encoding in spreadsheet tools.
pub fn write_csv<R: ExportRow, W: Write>(
    mut writer: W,
    rows: &[R],
    columns: &[&str],
) -> anyhow::Result<()> {
    writer.write_all("\u{feff}".as_bytes())?;
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(columns)?;
    for row in rows {
        csv_writer.write_record(columns.iter().map(|c| row.field(c).unwrap_or_default()))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn export_to_file<R: ExportRow>(path: &Path, rows: &[R], columns: &[&str]) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_csv(std::io::BufWriter::new(file), rows, columns)?;
    tracing::info!(path = %path.display(), rows = rows.len(), "exported table");
    Ok(())
}
