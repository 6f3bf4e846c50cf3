use chrono::NaiveDateTime;
use serde::Serialize;

pub const UNNAMED_DISCIPLINE: &str = "(unnamed discipline)";

#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentRecord {
    pub student_id: String,
    pub enrollment_id: Option<String>,
    pub course_name: String,
    pub active: bool,
    pub enrollment_date: Option<NaiveDateTime>,
    pub first_access: Option<NaiveDateTime>,
    pub last_access: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisciplineRecord {
    pub student_id: String,
    pub discipline_name: String,
    pub released_at: Option<NaiveDateTime>,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub completion_pct: Option<f64>,
    pub final_grade: Option<f64>,
    pub last_access: Option<NaiveDateTime>,
}

impl DisciplineRecord {
    /// Grouping label; blank names are kept under a shared placeholder.
    pub fn discipline_label(&self) -> &str {
        if self.discipline_name.trim().is_empty() {
            UNNAMED_DISCIPLINE
        } else {
            &self.discipline_name
        }
    }

    /// Whole days from start to end, discarding inconsistent (negative) spans.
    pub fn days_to_completion(&self) -> Option<i64> {
        let days = (self.end_date? - self.start_date?).num_days();
        (days >= 0).then_some(days)
    }
}

/// The two raw tables, read-only once loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
    pub enrollments: Vec<EnrollmentRecord>,
    pub disciplines: Vec<DisciplineRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub label: String,
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStat {
    pub key: String,
    pub rows: usize,
    pub samples: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodCount {
    pub period: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoryShare {
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EngagementSummary {
    pub eligible: usize,
    pub not_started: CategoryShare,
    pub viewed_only: CategoryShare,
    pub abandoned: CategoryShare,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AbandonmentStats {
    pub mean_completion: f64,
    pub median_completion: f64,
    pub early_count: usize,
    pub early_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segmentation {
    pub cutoff: Option<NaiveDateTime>,
    pub total_records: usize,
    pub summary: EngagementSummary,
    pub not_started: Vec<RankedCount>,
    pub viewed_only: Vec<RankedCount>,
    pub abandoned: Vec<RankedCount>,
    pub combined: Vec<RankedCount>,
    pub abandonment_buckets: Vec<HistogramBin>,
    pub abandonment_histogram: Vec<HistogramBin>,
    pub abandonment_stats: AbandonmentStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub active_students: usize,
    pub total_enrollments: usize,
    pub inactive_students: usize,
    pub active_enrollments: usize,
    pub inactive_enrollments: usize,
    pub distinct_courses: usize,
    pub top_courses: Vec<RankedCount>,
    pub monthly_enrollments: Vec<PeriodCount>,
    pub monthly_cancellations: Vec<PeriodCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAnalysis {
    pub active_by_course: Vec<RankedCount>,
    pub cancelled_by_course: Vec<RankedCount>,
    pub yearly_enrollments: Vec<PeriodCount>,
    pub quarterly_enrollments: Vec<PeriodCount>,
    pub unique_students: usize,
    pub retention_rate: f64,
    pub cancellation_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisciplineAnalysis {
    pub grade_ranking: Vec<GroupStat>,
    pub most_completed: Vec<RankedCount>,
    pub most_accessed: Vec<RankedCount>,
    pub completion_rate: Vec<GroupStat>,
    pub fastest_completion: Vec<GroupStat>,
}
