use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, NaiveDateTime};

use crate::aggregate::{self, percent, GroupSpec, Reduction};
use crate::config::Settings;
use crate::models::{
    DisciplineAnalysis, DisciplineRecord, EnrollmentRecord, Overview, PeriodCount, RankedCount,
    StudentAnalysis,
};

pub fn overview(enrollments: &[EnrollmentRecord], settings: &Settings) -> Overview {
    let cancelled: Vec<EnrollmentRecord> = enrollments.iter().filter(|e| !e.active).cloned().collect();

    Overview {
        active_students: unique_students(enrollments, true),
        total_enrollments: enrollments.len(),
        inactive_students: unique_students(enrollments, false),
        active_enrollments: enrollments.len() - cancelled.len(),
        inactive_enrollments: cancelled.len(),
        distinct_courses: enrollments
            .iter()
            .filter(|e| !e.course_name.is_empty())
            .map(|e| e.course_name.as_str())
            .collect::<HashSet<_>>()
            .len(),
        top_courses: aggregate::count_by(enrollments, course_key, Some(settings.top_n_courses)),
        monthly_enrollments: series(enrollments, |d| d.format("%Y-%m").to_string()),
        monthly_cancellations: series(&cancelled, |d| d.format("%Y-%m").to_string()),
    }
}

pub fn student_analysis(enrollments: &[EnrollmentRecord]) -> StudentAnalysis {
    let unique = enrollments
        .iter()
        .map(|e| e.student_id.as_str())
        .collect::<HashSet<_>>()
        .len();
    let active = unique_students(enrollments, true);
    let inactive = unique_students(enrollments, false);

    StudentAnalysis {
        active_by_course: students_per_course(enrollments, true),
        cancelled_by_course: students_per_course(enrollments, false),
        yearly_enrollments: series(enrollments, |d| d.year().to_string()),
        quarterly_enrollments: series(enrollments, |d| {
            format!("{}-Q{}", d.year(), d.month0() / 3 + 1)
        }),
        unique_students: unique,
        retention_rate: percent(active, unique),
        cancellation_rate: percent(inactive, unique),
    }
}

pub fn discipline_analysis(disciplines: &[DisciplineRecord], settings: &Settings) -> DisciplineAnalysis {
    let label = |r: &DisciplineRecord| r.discipline_label().to_string();

    let grade_ranking = aggregate::rank_groups(
        disciplines,
        |r| r.final_grade.map(|_| label(r)),
        |r| r.final_grade,
        &GroupSpec::most(Reduction::Mean, settings.top_n_disciplines)
            .with_min_samples(settings.min_evaluations_for_grade_rank),
    );

    let most_completed = aggregate::count_by(
        disciplines,
        |r| {
            r.completion_pct
                .filter(|&pct| pct >= settings.min_completion_for_done)
                .map(|_| label(r))
        },
        Some(settings.top_n_disciplines),
    );

    let most_accessed = aggregate::count_by(
        disciplines,
        |r| r.last_access.map(|_| label(r)),
        Some(settings.top_n_disciplines_access),
    );

    let completion_rate = aggregate::rank_groups(
        disciplines,
        |r| Some(label(r)),
        |r| r.completion_pct,
        &GroupSpec::most(Reduction::Mean, settings.top_n_disciplines_access)
            .with_min_samples(settings.min_enrollments_for_rate),
    );

    let fastest_completion = aggregate::rank_groups(
        disciplines,
        |r| r.days_to_completion().map(|_| label(r)),
        |r| r.days_to_completion().map(|days| days as f64),
        &GroupSpec::least(Reduction::Mean, settings.top_n_disciplines)
            .with_min_samples(settings.min_evaluations_for_grade_rank),
    );

    DisciplineAnalysis {
        grade_ranking,
        most_completed,
        most_accessed,
        completion_rate,
        fastest_completion,
    }
}

fn course_key(e: &EnrollmentRecord) -> Option<String> {
    (!e.course_name.is_empty()).then(|| e.course_name.clone())
}

fn unique_students(enrollments: &[EnrollmentRecord], active: bool) -> usize {
    enrollments
        .iter()
        .filter(|e| e.active == active)
        .map(|e| e.student_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Distinct students per course for one active state, most first, untruncated.
fn students_per_course(enrollments: &[EnrollmentRecord], active: bool) -> Vec<RankedCount> {
    let mut seen = HashSet::new();
    let distinct: Vec<&EnrollmentRecord> = enrollments
        .iter()
        .filter(|e| e.active == active && !e.course_name.is_empty())
        .filter(|e| seen.insert((e.course_name.as_str(), e.student_id.as_str())))
        .collect();
    aggregate::count_by(&distinct, |e| course_key(e), None)
}

/// Enrollment counts per period of the enrollment date, in period order.
/// Records without an enrollment date are left out.
fn series<F>(enrollments: &[EnrollmentRecord], period: F) -> Vec<PeriodCount>
where
    F: Fn(&NaiveDateTime) -> String,
{
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for date in enrollments.iter().filter_map(|e| e.enrollment_date.as_ref()) {
        *counts.entry(period(date)).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(period, count)| PeriodCount { period, count })
        .collect()
}
