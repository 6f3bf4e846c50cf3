use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::errors::LoadError;
use crate::models::{DisciplineRecord, EnrollmentRecord, Tables};

const DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S%.f",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];
const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d"];

/// Each required column as (export header, English alias).
const ENROLLMENT_COLUMNS: &[(&str, &str)] = &[
    ("idAluno", "student_id"),
    ("Curso1", "course_name"),
    ("Aluno Ativo", "active_flag"),
    ("Data Matrícula", "enrollment_date"),
    ("Primeiro Acesso", "first_access"),
    ("Último Acesso", "last_access"),
];

const DISCIPLINE_COLUMNS: &[(&str, &str)] = &[
    ("idAluno", "student_id"),
    ("Disciplina", "discipline_name"),
    ("Liberado a Partir De", "release_date"),
    ("Data Início", "start_date"),
    ("Data Término", "end_date"),
    ("Percentual Concluído", "completion_pct"),
    ("Nota de Aproveitamento Final", "final_grade"),
    ("Último Acesso", "last_access"),
];

#[derive(Debug, Deserialize)]
struct EnrollmentRow {
    #[serde(rename = "idAluno", alias = "student_id")]
    student_id: String,
    #[serde(rename = "Matrícula", alias = "enrollment_id", default)]
    enrollment_id: Option<String>,
    #[serde(rename = "Curso1", alias = "course_name")]
    course_name: Option<String>,
    #[serde(rename = "Aluno Ativo", alias = "active_flag")]
    active_flag: Option<String>,
    #[serde(rename = "Data Matrícula", alias = "enrollment_date")]
    enrollment_date: Option<String>,
    #[serde(rename = "Primeiro Acesso", alias = "first_access")]
    first_access: Option<String>,
    #[serde(rename = "Último Acesso", alias = "last_access")]
    last_access: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DisciplineRow {
    #[serde(rename = "idAluno", alias = "student_id")]
    student_id: String,
    #[serde(rename = "Disciplina", alias = "discipline_name")]
    discipline_name: Option<String>,
    #[serde(rename = "Liberado a Partir De", alias = "release_date")]
    release_date: Option<String>,
    #[serde(rename = "Data Início", alias = "start_date")]
    start_date: Option<String>,
    #[serde(rename = "Data Término", alias = "end_date")]
    end_date: Option<String>,
    #[serde(rename = "Percentual Concluído", alias = "completion_pct")]
    completion_pct: Option<String>,
    #[serde(rename = "Nota de Aproveitamento Final", alias = "final_grade")]
    final_grade: Option<String>,
    #[serde(rename = "Último Acesso", alias = "last_access")]
    last_access: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DataSources {
    pub enrollments: PathBuf,
    pub disciplines: PathBuf,
    pub delimiter: u8,
}

/// Loads the tables once per process and hands out shared read-only
/// snapshots. There is no expiry; `invalidate` forces the next access to
/// reload.
#[derive(Debug)]
pub struct TableCache {
    sources: DataSources,
    tables: OnceCell<Arc<Tables>>,
}

impl TableCache {
    pub fn new(sources: DataSources) -> Self {
        Self {
            sources,
            tables: OnceCell::new(),
        }
    }

    pub fn get(&self) -> Result<Arc<Tables>, LoadError> {
        self.tables
            .get_or_try_init(|| load_tables(&self.sources).map(Arc::new))
            .cloned()
    }

    pub fn invalidate(&mut self) {
        if self.tables.take().is_some() {
            tracing::debug!("table cache invalidated");
        }
    }
}

pub fn load_tables(sources: &DataSources) -> Result<Tables, LoadError> {
    let enrollments = load_enrollments(&sources.enrollments, sources.delimiter)?;
    let disciplines = load_disciplines(&sources.disciplines, sources.delimiter)?;
    tracing::info!(
        enrollments = enrollments.len(),
        disciplines = disciplines.len(),
        "loaded tables"
    );
    Ok(Tables {
        enrollments,
        disciplines,
    })
}

pub fn load_enrollments(path: &Path, delimiter: u8) -> Result<Vec<EnrollmentRecord>, LoadError> {
    let text = read_text(path)?;
    parse_enrollments(&text, delimiter, path)
}

pub fn load_disciplines(path: &Path, delimiter: u8) -> Result<Vec<DisciplineRecord>, LoadError> {
    let text = read_text(path)?;
    parse_disciplines(&text, delimiter, path)
}

pub fn parse_enrollments(
    text: &str,
    delimiter: u8,
    path: &Path,
) -> Result<Vec<EnrollmentRecord>, LoadError> {
    let mut reader = csv_reader(text, delimiter);
    require_columns(&mut reader, ENROLLMENT_COLUMNS, path)?;

    let mut records = Vec::new();
    for result in reader.deserialize::<EnrollmentRow>() {
        let row = result.map_err(|source| csv_error(path, source))?;
        records.push(EnrollmentRecord {
            student_id: row.student_id.trim().to_string(),
            enrollment_id: non_blank(row.enrollment_id.as_deref()).map(str::to_string),
            course_name: non_blank(row.course_name.as_deref())
                .unwrap_or_default()
                .to_string(),
            active: parse_active_flag(row.active_flag.as_deref()),
            enrollment_date: parse_timestamp(row.enrollment_date.as_deref()),
            first_access: parse_timestamp(row.first_access.as_deref()),
            last_access: parse_timestamp(row.last_access.as_deref()),
        });
    }

    Ok(records)
}

pub fn parse_disciplines(
    text: &str,
    delimiter: u8,
    path: &Path,
) -> Result<Vec<DisciplineRecord>, LoadError> {
    let mut reader = csv_reader(text, delimiter);
    require_columns(&mut reader, DISCIPLINE_COLUMNS, path)?;

    let mut records = Vec::new();
    let mut clamped = 0usize;
    for result in reader.deserialize::<DisciplineRow>() {
        let row = result.map_err(|source| csv_error(path, source))?;
        let completion_pct = parse_number(row.completion_pct.as_deref()).map(|pct| {
            if !(0.0..=100.0).contains(&pct) {
                clamped += 1;
            }
            pct.clamp(0.0, 100.0)
        });

        records.push(DisciplineRecord {
            student_id: row.student_id.trim().to_string(),
            discipline_name: non_blank(row.discipline_name.as_deref())
                .unwrap_or_default()
                .to_string(),
            released_at: parse_timestamp(row.release_date.as_deref()),
            start_date: parse_timestamp(row.start_date.as_deref()),
            end_date: parse_timestamp(row.end_date.as_deref()),
            completion_pct,
            final_grade: parse_number(row.final_grade.as_deref()),
            last_access: parse_timestamp(row.last_access.as_deref()),
        });
    }

    if clamped > 0 {
        tracing::warn!(
            path = %path.display(),
            rows = clamped,
            "completion percentages outside [0, 100] were clamped"
        );
    }

    Ok(records)
}

/// Source value `1` means active; anything else, blanks included, does not.
pub fn parse_active_flag(value: Option<&str>) -> bool {
    parse_number(value) == Some(1.0)
}

/// Parses a timestamp in any of the accepted export formats. Unparseable
/// values become `None` rather than failing the load.
pub fn parse_timestamp(value: Option<&str>) -> Option<NaiveDateTime> {
    let value = non_blank(value)?;

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

/// Parses a number, accepting a decimal comma. NaN and infinities map to `None`.
pub fn parse_number(value: Option<&str>) -> Option<f64> {
    let value = non_blank(value)?;
    let parsed: f64 = value.replace(',', ".").parse().ok()?;
    parsed.is_finite().then_some(parsed)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn read_text(path: &Path) -> Result<String, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(decode_text(bytes))
}

/// Exports arrive either as UTF-8 or as ISO-8859-1; the latter maps each byte
/// straight to the code point of the same value.
fn decode_text(bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().iter().map(|&b| char::from(b)).collect(),
    };
    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

fn csv_reader(text: &str, delimiter: u8) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(text.as_bytes())
}

fn require_columns(
    reader: &mut csv::Reader<&[u8]>,
    columns: &[(&'static str, &'static str)],
    path: &Path,
) -> Result<(), LoadError> {
    let headers = reader
        .headers()
        .map_err(|source| csv_error(path, source))?
        .clone();

    for &(column, alias) in columns {
        if !headers.iter().any(|h| h == column || h == alias) {
            return Err(LoadError::MissingColumn {
                path: path.to_path_buf(),
                column,
            });
        }
    }

    Ok(())
}

fn csv_error(path: &Path, source: csv::Error) -> LoadError {
    LoadError::Csv {
        path: path.to_path_buf(),
        source,
    }
}
