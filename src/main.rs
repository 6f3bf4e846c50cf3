use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use enrollment_dashboard::config::Settings;
use enrollment_dashboard::data::{self, DataSources, TableCache};
use enrollment_dashboard::filter::{self, CourseFilter};
use enrollment_dashboard::models::{DisciplineRecord, EnrollmentRecord};
use enrollment_dashboard::{auth, export, report, segmentation, views};

#[derive(Parser)]
#[command(name = "enrollment-dashboard")]
#[command(about = "Enrollment, completion and dropout reporting for course exports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file; built-in defaults apply when it does not exist
    #[arg(long, global = true, default_value = "dashboard.toml")]
    config: PathBuf,

    /// Course enrollment export
    #[arg(long, global = true, default_value = "Cursos.csv")]
    enrollments: PathBuf,

    /// Discipline progress export
    #[arg(long, global = true, default_value = "Disciplinas.csv")]
    disciplines: PathBuf,

    /// Field delimiter of both exports
    #[arg(long, global = true, default_value_t = ';')]
    delimiter: char,

    /// Restrict every view to one course
    #[arg(long, global = true)]
    course: Option<String>,

    #[arg(long, global = true, env = "DASHBOARD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Evaluate release ages against this instant instead of the current time
    #[arg(long, global = true, value_parser = parse_as_of)]
    as_of: Option<NaiveDateTime>,

    #[arg(long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum Table {
    Enrollments,
    Disciplines,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the settings file and print the effective settings
    CheckConfig,
    /// List the courses available for --course
    Courses,
    /// Enrollment totals, top courses and monthly trends
    Overview,
    /// Active and cancelled students per course and period
    Students,
    /// Grade, completion and access rankings per discipline
    Disciplines,
    /// Not-started, viewed-only and abandoned discipline analysis
    Engagement,
    /// Write every view to a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export the filtered table to CSV
    Export {
        #[arg(long, value_enum)]
        table: Table,
        /// Comma-separated column names; all columns when omitted
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        #[arg(long)]
        out: PathBuf,
    },
}

fn parse_as_of(value: &str) -> Result<NaiveDateTime, String> {
    data::parse_timestamp(Some(value))
        .ok_or_else(|| format!("unrecognized date `{value}` (try 2024-06-01 or 01/06/2024)"))
}

fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config).context("invalid dashboard settings")?;

    if let Commands::CheckConfig = cli.command {
        let shown = Settings {
            password_sha256: "*".repeat(8),
            ..settings
        };
        println!("Settings are valid.");
        print!("{}", toml::to_string_pretty(&shown)?);
        return Ok(());
    }

    auth::verify_password(cli.password.as_deref(), &settings.password_sha256)?;

    if !cli.delimiter.is_ascii() {
        bail!("delimiter must be a single ASCII character");
    }
    let cache = TableCache::new(DataSources {
        enrollments: cli.enrollments.clone(),
        disciplines: cli.disciplines.clone(),
        delimiter: cli.delimiter as u8,
    });
    let tables = cache.get().context("failed to load data")?;

    let courses = filter::available_courses(&tables);
    let scope = CourseFilter::from_arg(cli.course.as_deref());
    if let CourseFilter::Course(name) = &scope {
        if !courses.contains(name) {
            bail!("unknown course `{name}`; run `courses` to list the available ones");
        }
    }
    let filtered = filter::apply(&tables, &scope);
    let now = cli
        .as_of
        .unwrap_or_else(|| chrono::Local::now().naive_local());

    match cli.command {
        Commands::CheckConfig => {}
        Commands::Courses => emit(cli.format, &courses, || report::render_courses(&courses))?,
        Commands::Overview => {
            let view = views::overview(&filtered.enrollments, &settings);
            emit(cli.format, &view, || report::render_overview(&view))?;
        }
        Commands::Students => {
            let view = views::student_analysis(&filtered.enrollments);
            emit(cli.format, &view, || report::render_students(&view))?;
        }
        Commands::Disciplines => {
            let view = views::discipline_analysis(&filtered.disciplines, &settings);
            emit(cli.format, &view, || report::render_disciplines(&view, &settings))?;
        }
        Commands::Engagement => {
            let view = segmentation::segment(&filtered.disciplines, &settings, now);
            emit(cli.format, &view, || report::render_engagement(&view, &settings))?;
        }
        Commands::Report { out } => {
            let overview = views::overview(&filtered.enrollments, &settings);
            let students = views::student_analysis(&filtered.enrollments);
            let disciplines = views::discipline_analysis(&filtered.disciplines, &settings);
            let engagement = segmentation::segment(&filtered.disciplines, &settings, now);
            let report = report::build_report(&report::ReportInput {
                scope: scope.label(),
                as_of: now,
                settings: &settings,
                overview: &overview,
                students: &students,
                disciplines: &disciplines,
                engagement: &engagement,
            });
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export {
            table,
            columns,
            out,
        } => {
            let rows = match table {
                Table::Enrollments => {
                    let columns = export::select_columns::<EnrollmentRecord>(&columns)?;
                    export::export_to_file(&out, &filtered.enrollments, &columns)?;
                    filtered.enrollments.len()
                }
                Table::Disciplines => {
                    let columns = export::select_columns::<DisciplineRecord>(&columns)?;
                    export::export_to_file(&out, &filtered.disciplines, &columns)?;
                    filtered.disciplines.len()
                }
            };
            println!("Exported {rows} rows to {}.", out.display());
        }
    }

    Ok(())
}

fn emit<T, F>(format: Format, value: &T, render: F) -> anyhow::Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce() -> String,
{
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Format::Text => print!("{}", render()),
    }
    Ok(())
}
