use std::fmt::Write;

use chrono::NaiveDateTime;

use crate::config::Settings;
use crate::models::{
    DisciplineAnalysis, GroupStat, HistogramBin, Overview, PeriodCount, RankedCount,
    Segmentation, StudentAnalysis,
};
use crate::segmentation::Engagement;

pub struct ReportInput<'a> {
    pub scope: &'a str,
    pub as_of: NaiveDateTime,
    pub settings: &'a Settings,
    pub overview: &'a Overview,
    pub students: &'a StudentAnalysis,
    pub disciplines: &'a DisciplineAnalysis,
    pub engagement: &'a Segmentation,
}

pub fn build_report(input: &ReportInput<'_>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Enrollment Dashboard Report");
    let _ = writeln!(
        output,
        "Generated for {} as of {}",
        input.scope,
        input.as_of.format("%Y-%m-%d %H:%M")
    );
    let _ = writeln!(output);
    output.push_str(&render_overview(input.overview));
    let _ = writeln!(output);
    output.push_str(&render_students(input.students));
    let _ = writeln!(output);
    output.push_str(&render_disciplines(input.disciplines, input.settings));
    let _ = writeln!(output);
    output.push_str(&render_engagement(input.engagement, input.settings));

    output
}

pub fn render_courses(courses: &[String]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## Courses");
    if courses.is_empty() {
        let _ = writeln!(output, "No courses found.");
    }
    for course in courses {
        let _ = writeln!(output, "- {course}");
    }
    output
}

pub fn render_overview(view: &Overview) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Active students: {}", view.active_students);
    let _ = writeln!(output, "- Total enrollments: {}", view.total_enrollments);
    let _ = writeln!(output, "- Inactive students: {}", view.inactive_students);
    let _ = writeln!(
        output,
        "- Enrollments by status: {} active, {} inactive",
        view.active_enrollments, view.inactive_enrollments
    );
    let _ = writeln!(output, "- Courses: {}", view.distinct_courses);

    let _ = writeln!(output);
    let _ = writeln!(output, "### Top Courses by Enrollments");
    write_ranked(&mut output, &view.top_courses, "enrollments", "No enrollments recorded.");

    let _ = writeln!(output);
    let _ = writeln!(output, "### Monthly Enrollments");
    write_series(&mut output, &view.monthly_enrollments, "No dated enrollments.");

    let _ = writeln!(output);
    let _ = writeln!(output, "### Monthly Cancellations");
    write_series(
        &mut output,
        &view.monthly_cancellations,
        "No cancellations for the selected scope.",
    );

    output
}

pub fn render_students(view: &StudentAnalysis) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "## Students");
    let _ = writeln!(output, "- Unique students: {}", view.unique_students);
    let _ = writeln!(output, "- Retention rate: {:.1}%", view.retention_rate);
    let _ = writeln!(output, "- Cancellation rate: {:.1}%", view.cancellation_rate);

    let _ = writeln!(output);
    let _ = writeln!(output, "### Active Students by Course");
    write_ranked(&mut output, &view.active_by_course, "students", "No active students.");

    let _ = writeln!(output);
    let _ = writeln!(output, "### Cancellations by Course");
    write_ranked(&mut output, &view.cancelled_by_course, "students", "No cancellations.");

    let _ = writeln!(output);
    let _ = writeln!(output, "### Enrollments by Year");
    write_series(&mut output, &view.yearly_enrollments, "No dated enrollments.");

    let _ = writeln!(output);
    let _ = writeln!(output, "### Enrollments by Quarter");
    write_series(&mut output, &view.quarterly_enrollments, "No dated enrollments.");

    output
}

pub fn render_disciplines(view: &DisciplineAnalysis, settings: &Settings) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "## Disciplines");
    let _ = writeln!(
        output,
        "### Average Grade (at least {} evaluations)",
        settings.min_evaluations_for_grade_rank
    );
    write_stats(&mut output, &view.grade_ranking, "", "No graded disciplines.");

    let _ = writeln!(output);
    let _ = writeln!(output, "### Most Completed");
    write_ranked(&mut output, &view.most_completed, "completions", "No completions.");

    let _ = writeln!(output);
    let _ = writeln!(output, "### Most Accessed");
    write_ranked(&mut output, &view.most_accessed, "accesses", "No access data.");

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "### Average Completion Rate (at least {} enrollments)",
        settings.min_enrollments_for_rate
    );
    write_stats(&mut output, &view.completion_rate, "%", "Not enough data.");

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "### Fastest Completion (at least {} completions)",
        settings.min_evaluations_for_grade_rank
    );
    write_stats(&mut output, &view.fastest_completion, " days", "Not enough data.");

    output
}

pub fn render_engagement(seg: &Segmentation, settings: &Settings) -> String {
    let mut output = String::new();
    let summary = &seg.summary;

    let _ = writeln!(output, "## Engagement");
    let _ = writeln!(
        output,
        "Disciplines released more than {} days ago (before {}) with less than {}% completion.",
        settings.min_days_since_release,
        seg.cutoff
            .map(|cutoff| cutoff.format("%d/%m/%Y").to_string())
            .unwrap_or_else(|| "any representable date".to_string()),
        settings.max_completion_for_abandonment
    );
    let _ = writeln!(
        output,
        "{} of {} records are eligible.",
        summary.eligible, seg.total_records
    );
    let _ = writeln!(output);

    for (category, share) in [
        (Engagement::NotStarted, summary.not_started),
        (Engagement::ViewedOnly, summary.viewed_only),
        (Engagement::Abandoned, summary.abandoned),
    ] {
        let _ = writeln!(
            output,
            "- {}: {} ({:.1}%)",
            category.label(),
            share.count,
            share.percent
        );
    }

    for (category, ranked) in [
        (Engagement::NotStarted, &seg.not_started),
        (Engagement::ViewedOnly, &seg.viewed_only),
        (Engagement::Abandoned, &seg.abandoned),
    ] {
        let _ = writeln!(output);
        let _ = writeln!(output, "### {}", category.label());
        write_ranked(&mut output, ranked, "records", "None.");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### All Incomplete Disciplines");
    write_ranked(&mut output, &seg.combined, "records", "None.");

    let _ = writeln!(output);
    let _ = writeln!(output, "### Abandonment Point");
    if summary.abandoned.count == 0 {
        let _ = writeln!(output, "No disciplines were abandoned after starting.");
    } else {
        write_bins(&mut output, &seg.abandonment_buckets);
        let stats = &seg.abandonment_stats;
        let _ = writeln!(output);
        let _ = writeln!(output, "- Mean completion: {:.1}%", stats.mean_completion);
        let _ = writeln!(output, "- Median completion: {:.1}%", stats.median_completion);
        let _ = writeln!(
            output,
            "- Early abandonment (< {}%): {} ({:.1}%)",
            settings.initial_abandonment_threshold, stats.early_count, stats.early_percent
        );

        let _ = writeln!(output);
        let _ = writeln!(output, "### Completion Distribution");
        write_bins(&mut output, &seg.abandonment_histogram);
    }

    output
}

fn write_ranked(output: &mut String, ranked: &[RankedCount], unit: &str, empty: &str) {
    if ranked.is_empty() {
        let _ = writeln!(output, "{empty}");
        return;
    }
    for (i, entry) in ranked.iter().enumerate() {
        let _ = writeln!(output, "{}. {}: {} {}", i + 1, entry.name, entry.count, unit);
    }
}

fn write_stats(output: &mut String, stats: &[GroupStat], unit: &str, empty: &str) {
    if stats.is_empty() {
        let _ = writeln!(output, "{empty}");
        return;
    }
    for (i, stat) in stats.iter().enumerate() {
        let _ = writeln!(
            output,
            "{}. {}: {:.1}{} across {} records",
            i + 1,
            stat.key,
            stat.mean.unwrap_or(0.0),
            unit,
            stat.rows
        );
    }
}

fn write_series(output: &mut String, series: &[PeriodCount], empty: &str) {
    if series.is_empty() {
        let _ = writeln!(output, "{empty}");
        return;
    }
    for point in series {
        let _ = writeln!(output, "- {}: {}", point.period, point.count);
    }
}

fn write_bins(output: &mut String, bins: &[HistogramBin]) {
    for bin in bins {
        let _ = writeln!(output, "- {}: {}", bin.label, bin.count);
    }
}
