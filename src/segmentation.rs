//! Engagement segmentation of discipline records.
//!
//! A record is *eligible* once its discipline has been released for at least
//! `min_days_since_release` days, it has no end date (when
//! `only_without_end_date` is set) and its completion is known and below
//! `max_completion_for_abandonment`. Every eligible record falls into exactly
//! one [`Engagement`] category:
//!
//! | category    | completion | last access |
//! |-------------|------------|-------------|
//! | not started | `== 0`     | none        |
//! | viewed only | `== 0`     | some        |
//! | abandoned   | `> 0`      | any         |

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::aggregate::{self, percent};
use crate::config::Settings;
use crate::models::{
    AbandonmentStats, CategoryShare, DisciplineRecord, EngagementSummary, RankedCount,
    Segmentation,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Engagement {
    NotStarted,
    ViewedOnly,
    Abandoned,
}

impl Engagement {
    pub fn label(self) -> &'static str {
        match self {
            Engagement::NotStarted => "Not started",
            Engagement::ViewedOnly => "Viewed only",
            Engagement::Abandoned => "Abandoned",
        }
    }
}

/// Records released before this instant are old enough to be judged.
/// `None` when the instant falls outside the representable calendar, in which
/// case no record can be old enough.
pub fn release_cutoff(now: NaiveDateTime, min_days_since_release: i64) -> Option<NaiveDateTime> {
    now.checked_sub_signed(Duration::try_days(min_days_since_release)?)
}

/// Returns the record's completion when it passes every eligibility check.
fn eligible_completion(
    record: &DisciplineRecord,
    settings: &Settings,
    cutoff: NaiveDateTime,
) -> Option<f64> {
    let released_at = record.released_at?;
    if released_at >= cutoff {
        return None;
    }
    if settings.only_without_end_date && record.end_date.is_some() {
        return None;
    }
    let completion = record.completion_pct?;
    (completion < settings.max_completion_for_abandonment).then_some(completion)
}

pub fn is_eligible(record: &DisciplineRecord, settings: &Settings, now: NaiveDateTime) -> bool {
    release_cutoff(now, settings.min_days_since_release)
        .is_some_and(|cutoff| eligible_completion(record, settings, cutoff).is_some())
}

fn categorize(record: &DisciplineRecord, completion: f64) -> Engagement {
    if completion > 0.0 {
        Engagement::Abandoned
    } else if record.last_access.is_some() {
        Engagement::ViewedOnly
    } else {
        Engagement::NotStarted
    }
}

/// Category of a single record, or `None` when it is not eligible.
pub fn classify(
    record: &DisciplineRecord,
    settings: &Settings,
    now: NaiveDateTime,
) -> Option<Engagement> {
    let cutoff = release_cutoff(now, settings.min_days_since_release)?;
    eligible_completion(record, settings, cutoff).map(|completion| categorize(record, completion))
}

/// Segments `records` as of `now` and builds every ranked view and statistic
/// derived from the three categories.
pub fn segment(records: &[DisciplineRecord], settings: &Settings, now: NaiveDateTime) -> Segmentation {
    let cutoff = release_cutoff(now, settings.min_days_since_release);

    let mut eligible: Vec<&DisciplineRecord> = Vec::new();
    let mut not_started: Vec<&DisciplineRecord> = Vec::new();
    let mut viewed_only: Vec<&DisciplineRecord> = Vec::new();
    let mut abandoned: Vec<&DisciplineRecord> = Vec::new();
    let mut abandoned_completion: Vec<f64> = Vec::new();

    for record in records {
        let completion = cutoff.and_then(|cutoff| eligible_completion(record, settings, cutoff));
        let Some(completion) = completion else {
            continue;
        };
        eligible.push(record);
        match categorize(record, completion) {
            Engagement::NotStarted => not_started.push(record),
            Engagement::ViewedOnly => viewed_only.push(record),
            Engagement::Abandoned => {
                abandoned.push(record);
                abandoned_completion.push(completion);
            }
        }
    }

    tracing::debug!(
        total = records.len(),
        eligible = eligible.len(),
        not_started = not_started.len(),
        viewed_only = viewed_only.len(),
        abandoned = abandoned.len(),
        ?cutoff,
        "segmented discipline records"
    );

    let top_n = settings.top_n_disciplines;
    let share = |count: usize| CategoryShare {
        count,
        percent: percent(count, eligible.len()),
    };

    let ceiling = settings.max_completion_for_abandonment;
    let early_count = abandoned_completion
        .iter()
        .filter(|&&c| c < settings.initial_abandonment_threshold)
        .count();

    Segmentation {
        cutoff,
        total_records: records.len(),
        summary: EngagementSummary {
            eligible: eligible.len(),
            not_started: share(not_started.len()),
            viewed_only: share(viewed_only.len()),
            abandoned: share(abandoned.len()),
        },
        not_started: rank_disciplines(&not_started, top_n),
        viewed_only: rank_disciplines(&viewed_only, top_n),
        abandoned: rank_disciplines(&abandoned, top_n),
        combined: rank_disciplines(&eligible, top_n),
        abandonment_buckets: aggregate::ten_point_buckets(&abandoned_completion, ceiling),
        abandonment_histogram: aggregate::equal_width_histogram(
            &abandoned_completion,
            0.0,
            ceiling,
            settings.histogram_bins,
        ),
        abandonment_stats: AbandonmentStats {
            mean_completion: aggregate::mean(&abandoned_completion).unwrap_or(0.0),
            median_completion: aggregate::median(&abandoned_completion).unwrap_or(0.0),
            early_count,
            early_percent: percent(early_count, abandoned.len()),
        },
    }
}

fn rank_disciplines(records: &[&DisciplineRecord], top_n: usize) -> Vec<RankedCount> {
    aggregate::count_by(
        records,
        |r| Some(r.discipline_label().to_string()),
        Some(top_n),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn days_ago(days: i64) -> NaiveDateTime {
        now() - Duration::days(days)
    }

    fn record(name: &str, released_days_ago: i64, completion: Option<f64>) -> DisciplineRecord {
        DisciplineRecord {
            student_id: "1".to_string(),
            discipline_name: name.to_string(),
            released_at: Some(days_ago(released_days_ago)),
            start_date: None,
            end_date: None,
            completion_pct: completion,
            final_grade: None,
            last_access: None,
        }
    }

    fn accessed(mut r: DisciplineRecord) -> DisciplineRecord {
        r.last_access = NaiveDate::from_ymd_opt(2024, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0));
        r
    }

    fn finished(mut r: DisciplineRecord) -> DisciplineRecord {
        r.end_date = Some(days_ago(5));
        r
    }

    #[test]
    fn untouched_record_is_not_started() {
        let r = record("Cálculo", 40, Some(0.0));
        assert_eq!(classify(&r, &Settings::default(), now()), Some(Engagement::NotStarted));
    }

    #[test]
    fn accessed_record_without_progress_is_viewed_only() {
        let r = accessed(record("Cálculo", 40, Some(0.0)));
        assert_eq!(classify(&r, &Settings::default(), now()), Some(Engagement::ViewedOnly));
    }

    #[test]
    fn partial_progress_is_abandoned_in_its_bucket() {
        let r = record("Cálculo", 40, Some(35.0));
        let settings = Settings::default();
        assert_eq!(classify(&r, &settings, now()), Some(Engagement::Abandoned));

        let seg = segment(&[r], &settings, now());
        let bucket = seg
            .abandonment_buckets
            .iter()
            .find(|b| b.count == 1)
            .unwrap();
        assert_eq!(bucket.label, "31-40%");
    }

    #[test]
    fn recent_release_is_ineligible() {
        let r = record("Cálculo", 10, Some(0.0));
        assert_eq!(classify(&r, &Settings::default(), now()), None);
    }

    #[test]
    fn release_exactly_at_cutoff_is_ineligible() {
        let r = record("Cálculo", 30, Some(0.0));
        assert_eq!(classify(&r, &Settings::default(), now()), None);
        let r = record("Cálculo", 31, Some(0.0));
        assert!(is_eligible(&r, &Settings::default(), now()));
    }

    #[test]
    fn unrepresentable_cutoff_leaves_nothing_eligible() {
        let settings = Settings {
            min_days_since_release: 200_000_000,
            ..Settings::default()
        };
        assert_eq!(release_cutoff(now(), settings.min_days_since_release), None);
        assert_eq!(release_cutoff(now(), i64::MAX), None);

        let r = record("Cálculo", 400, Some(0.0));
        assert_eq!(classify(&r, &settings, now()), None);
        assert!(!is_eligible(&r, &settings, now()));

        let seg = segment(&[r], &settings, now());
        assert_eq!(seg.cutoff, None);
        assert_eq!(seg.total_records, 1);
        assert_eq!(seg.summary.eligible, 0);
        assert_eq!(seg.summary.abandoned.percent, 0.0);
    }

    #[test]
    fn finished_record_is_excluded() {
        let r = finished(record("Cálculo", 40, Some(100.0)));
        assert_eq!(classify(&r, &Settings::default(), now()), None);

        let r = finished(record("Cálculo", 40, Some(10.0)));
        assert_eq!(classify(&r, &Settings::default(), now()), None);
    }

    #[test]
    fn finished_record_counts_when_end_dates_are_allowed() {
        let settings = Settings {
            only_without_end_date: false,
            ..Settings::default()
        };
        let r = finished(record("Cálculo", 40, Some(10.0)));
        assert_eq!(classify(&r, &settings, now()), Some(Engagement::Abandoned));
    }

    #[test]
    fn missing_release_or_completion_is_ineligible() {
        let mut r = record("Cálculo", 40, Some(0.0));
        r.released_at = None;
        assert_eq!(classify(&r, &Settings::default(), now()), None);

        let r = record("Cálculo", 40, None);
        assert_eq!(classify(&r, &Settings::default(), now()), None);
    }

    #[test]
    fn completion_at_ceiling_is_ineligible() {
        let r = record("Cálculo", 40, Some(50.0));
        assert_eq!(classify(&r, &Settings::default(), now()), None);
        let r = record("Cálculo", 40, Some(49.9));
        assert_eq!(classify(&r, &Settings::default(), now()), Some(Engagement::Abandoned));
    }

    #[test]
    fn empty_input_reports_zeroes() {
        let seg = segment(&[], &Settings::default(), now());
        assert!(seg.not_started.is_empty());
        assert!(seg.viewed_only.is_empty());
        assert!(seg.abandoned.is_empty());
        assert!(seg.combined.is_empty());
        assert_eq!(seg.summary.eligible, 0);
        assert_eq!(seg.summary.not_started.percent, 0.0);
        assert_eq!(seg.summary.viewed_only.percent, 0.0);
        assert_eq!(seg.summary.abandoned.percent, 0.0);
        assert_eq!(seg.abandonment_stats.mean_completion, 0.0);
        assert_eq!(seg.abandonment_stats.median_completion, 0.0);
        assert_eq!(seg.abandonment_stats.early_percent, 0.0);
        assert_eq!(seg.abandonment_buckets.len(), 5);
        assert!(seg.abandonment_buckets.iter().all(|b| b.count == 0));
    }

    #[test]
    fn rankings_and_statistics() {
        let records = vec![
            record("Física", 40, Some(0.0)),
            record("Física", 60, Some(0.0)),
            record("Álgebra", 45, Some(0.0)),
            accessed(record("Álgebra", 45, Some(0.0))),
            record("Química", 90, Some(5.0)),
            record("Química", 90, Some(15.0)),
            record("Biologia", 90, Some(40.0)),
            record("Biologia", 90, Some(90.0)),
            record("Biologia", 5, Some(10.0)),
        ];
        let seg = segment(&records, &Settings::default(), now());

        assert_eq!(seg.total_records, 9);
        assert_eq!(seg.summary.eligible, 7);
        assert_eq!(seg.summary.not_started.count, 3);
        assert_eq!(seg.summary.viewed_only.count, 1);
        assert_eq!(seg.summary.abandoned.count, 3);

        let names = |ranked: &[RankedCount]| {
            ranked
                .iter()
                .map(|r| (r.name.clone(), r.count))
                .collect::<Vec<_>>()
        };
        assert_eq!(
            names(&seg.not_started),
            vec![("Física".to_string(), 2), ("Álgebra".to_string(), 1)]
        );
        assert_eq!(names(&seg.viewed_only), vec![("Álgebra".to_string(), 1)]);
        assert_eq!(
            names(&seg.abandoned),
            vec![("Química".to_string(), 2), ("Biologia".to_string(), 1)]
        );
        assert_eq!(seg.combined[0].count, 2);
        assert_eq!(seg.combined.iter().map(|r| r.count).sum::<usize>(), 7);

        let stats = seg.abandonment_stats;
        assert!((stats.mean_completion - 20.0).abs() < 1e-9);
        assert_eq!(stats.median_completion, 15.0);
        assert_eq!(stats.early_count, 2);
        assert!((stats.early_percent - 200.0 / 3.0).abs() < 1e-9);
        assert!((seg.summary.abandoned.percent - 300.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn rankings_respect_top_n() {
        let settings = Settings {
            top_n_disciplines: 2,
            ..Settings::default()
        };
        let records: Vec<_> = ["A", "B", "C", "C"]
            .iter()
            .map(|name| record(name, 40, Some(0.0)))
            .collect();
        let seg = segment(&records, &settings, now());
        let names: Vec<_> = seg.not_started.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A"]);
    }

    #[test]
    fn blank_discipline_names_are_grouped() {
        let records = vec![record("", 40, Some(0.0)), record(" ", 40, Some(0.0))];
        let seg = segment(&records, &Settings::default(), now());
        assert_eq!(seg.not_started.len(), 1);
        assert_eq!(seg.not_started[0].name, crate::models::UNNAMED_DISCIPLINE);
        assert_eq!(seg.not_started[0].count, 2);
    }

    #[test]
    fn injected_clock_controls_eligibility() {
        let r = record("Cálculo", 10, Some(0.0));
        let later = now() + Duration::days(25);
        assert_eq!(classify(&r, &Settings::default(), later), Some(Engagement::NotStarted));
    }

    fn arb_record() -> impl Strategy<Value = DisciplineRecord> {
        (
            prop::option::of(0i64..120),
            prop::option::of(prop_oneof![Just(0.0f64), 0.0f64..100.0]),
            prop::bool::ANY,
            prop::bool::ANY,
            prop::bool::ANY,
            prop::sample::select(vec!["A", "B", "C", ""]),
        )
            .prop_map(|(released, completion, whole, has_access, has_end, name)| {
                let completion = completion.map(|c| if whole { c.round() } else { c });
                let mut r = record(name, released.unwrap_or(0), completion);
                if released.is_none() {
                    r.released_at = None;
                }
                if has_access {
                    r = accessed(r);
                }
                if has_end {
                    r = finished(r);
                }
                r
            })
    }

    proptest! {
        #[test]
        fn eligible_records_fall_in_exactly_one_category(r in arb_record()) {
            let settings = Settings::default();
            let category = classify(&r, &settings, now());
            prop_assert_eq!(category.is_some(), is_eligible(&r, &settings, now()));
            if let (Some(category), Some(c)) = (category, r.completion_pct) {
                let matches = [
                    c == 0.0 && r.last_access.is_none(),
                    c == 0.0 && r.last_access.is_some(),
                    c > 0.0 && c < settings.max_completion_for_abandonment,
                ];
                prop_assert_eq!(matches.iter().filter(|&&m| m).count(), 1);
                let expected = match matches.iter().position(|&m| m) {
                    Some(0) => Engagement::NotStarted,
                    Some(1) => Engagement::ViewedOnly,
                    _ => Engagement::Abandoned,
                };
                prop_assert_eq!(category, expected);
            }
        }

        #[test]
        fn finished_records_are_never_categorized(r in arb_record()) {
            if r.end_date.is_some() {
                prop_assert_eq!(classify(&r, &Settings::default(), now()), None);
            }
        }

        #[test]
        fn category_counts_sum_to_eligible(records in prop::collection::vec(arb_record(), 0..60)) {
            let settings = Settings::default();
            let seg = segment(&records, &settings, now());
            let s = seg.summary;
            prop_assert_eq!(
                s.not_started.count + s.viewed_only.count + s.abandoned.count,
                s.eligible
            );
            let eligible = records.iter().filter(|r| is_eligible(r, &settings, now())).count();
            prop_assert_eq!(s.eligible, eligible);

            let bucketed: usize = seg.abandonment_buckets.iter().map(|b| b.count).sum();
            prop_assert_eq!(bucketed, s.abandoned.count);
            let histogram: usize = seg.abandonment_histogram.iter().map(|b| b.count).sum();
            prop_assert_eq!(histogram, s.abandoned.count);
        }

        #[test]
        fn lowering_the_ceiling_never_grows_the_sets(
            records in prop::collection::vec(arb_record(), 0..60)
        ) {
            let wide = segment(&records, &Settings::default(), now());
            let narrow_settings = Settings {
                max_completion_for_abandonment: 25.0,
                ..Settings::default()
            };
            let narrow = segment(&records, &narrow_settings, now());
            prop_assert!(narrow.summary.eligible <= wide.summary.eligible);
            prop_assert!(narrow.summary.abandoned.count <= wide.summary.abandoned.count);
        }
    }
}
