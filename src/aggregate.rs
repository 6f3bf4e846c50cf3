//! Group, reduce, filter, sort and truncate: the one shape shared by every
//! ranked view, plus the small statistics helpers behind it.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::{GroupStat, HistogramBin, RankedCount};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Count,
    Mean,
    Median,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Descending,
    Ascending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSpec {
    /// Groups with fewer rows than this are dropped before sorting.
    pub min_samples: usize,
    pub sort_by: Reduction,
    pub direction: Direction,
    /// `None` keeps every group.
    pub top_n: Option<usize>,
}

impl GroupSpec {
    pub fn most(sort_by: Reduction, top_n: usize) -> Self {
        Self {
            min_samples: 0,
            sort_by,
            direction: Direction::Descending,
            top_n: Some(top_n),
        }
    }

    pub fn least(sort_by: Reduction, top_n: usize) -> Self {
        Self {
            direction: Direction::Ascending,
            ..Self::most(sort_by, top_n)
        }
    }

    pub fn with_min_samples(self, min_samples: usize) -> Self {
        Self {
            min_samples,
            ..self
        }
    }
}

/// Groups `rows` by `key`, reduces each group to row count plus mean and
/// median of `value`, then filters, sorts and truncates according to `spec`.
///
/// Rows without a key are skipped. Rows without a value still count toward
/// the group's row count. Ties on the sort value are broken by key ascending,
/// and groups without a sort value (no values at all) sort last.
pub fn rank_groups<T, K, V>(rows: &[T], key: K, value: V, spec: &GroupSpec) -> Vec<GroupStat>
where
    K: Fn(&T) -> Option<String>,
    V: Fn(&T) -> Option<f64>,
{
    let mut groups: BTreeMap<String, (usize, Vec<f64>)> = BTreeMap::new();
    for row in rows {
        let Some(k) = key(row) else { continue };
        let entry = groups.entry(k).or_default();
        entry.0 += 1;
        if let Some(v) = value(row) {
            entry.1.push(v);
        }
    }

    let mut stats: Vec<GroupStat> = groups
        .into_iter()
        .filter(|(_, (rows, _))| *rows >= spec.min_samples)
        .map(|(key, (rows, values))| GroupStat {
            key,
            rows,
            samples: values.len(),
            mean: mean(&values),
            median: median(&values),
        })
        .collect();

    // BTreeMap iteration is key-ascending and sort_by is stable, so equal
    // sort values stay in key order.
    stats.sort_by(|a, b| compare_groups(a, b, spec));
    if let Some(top_n) = spec.top_n {
        stats.truncate(top_n);
    }
    stats
}

/// Occurrences per key, most frequent first, ties by key ascending.
pub fn count_by<T, K>(rows: &[T], key: K, top_n: Option<usize>) -> Vec<RankedCount>
where
    K: Fn(&T) -> Option<String>,
{
    let spec = GroupSpec {
        min_samples: 0,
        sort_by: Reduction::Count,
        direction: Direction::Descending,
        top_n,
    };
    rank_groups(rows, key, |_| None, &spec)
        .into_iter()
        .map(|g| RankedCount {
            name: g.key,
            count: g.rows,
        })
        .collect()
}

fn sort_value(stat: &GroupStat, reduction: Reduction) -> Option<f64> {
    match reduction {
        Reduction::Count => Some(stat.rows as f64),
        Reduction::Mean => stat.mean,
        Reduction::Median => stat.median,
    }
}

fn compare_groups(a: &GroupStat, b: &GroupStat, spec: &GroupSpec) -> Ordering {
    match (sort_value(a, spec.sort_by), sort_value(b, spec.sort_by)) {
        (Some(x), Some(y)) => {
            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            match spec.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// `part` as a percentage of `whole`; zero when `whole` is zero.
pub fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Counts values into the half-open bins `(edges[i], edges[i + 1]]`.
/// Values at or below the first edge or above the last are not counted.
pub fn bucketize<L>(values: &[f64], edges: &[f64], label: L) -> Vec<HistogramBin>
where
    L: Fn(f64, f64) -> String,
{
    let mut bins: Vec<HistogramBin> = edges
        .windows(2)
        .map(|w| HistogramBin {
            label: label(w[0], w[1]),
            lower: w[0],
            upper: w[1],
            count: 0,
        })
        .collect();

    for &value in values {
        let idx = edges.partition_point(|&edge| edge < value);
        if idx >= 1 && idx < edges.len() {
            bins[idx - 1].count += 1;
        }
    }

    bins
}

/// Ten-point buckets labelled "1-10%", "11-20%", ..., covering `(0, ceiling]`
/// rounded up to the next multiple of ten.
pub fn ten_point_buckets(values: &[f64], ceiling: f64) -> Vec<HistogramBin> {
    let count = (ceiling / 10.0).ceil().max(1.0) as usize;
    let edges: Vec<f64> = (0..=count).map(|i| i as f64 * 10.0).collect();
    bucketize(values, &edges, |lower, upper| {
        format!("{}-{}%", lower as i64 + 1, upper as i64)
    })
}

/// `bins` equal-width bins spanning `(lower, upper]`.
pub fn equal_width_histogram(values: &[f64], lower: f64, upper: f64, bins: usize) -> Vec<HistogramBin> {
    let bins = bins.max(1);
    let width = (upper - lower) / bins as f64;
    let mut edges: Vec<f64> = (0..bins).map(|i| lower + i as f64 * width).collect();
    edges.push(upper);
    bucketize(values, &edges, |lo, hi| {
        format!("{}-{}%", format_edge(lo), format_edge(hi))
    })
}

fn format_edge(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}
