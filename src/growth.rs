use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{GrowthError, Result};
use crate::models::{AggregatedCell, Category, GrowthLevel, GrowthRecord, Measure, Subject};

/// `(test_year, category value, subject, growth level)`. The level is only
/// set for `Measure::ShareAdequate`.
pub type GroupKey = (i32, String, Subject, Option<GrowthLevel>);

/// Per-partition aggregation, iterated in ascending key order.
pub type Aggregation = BTreeMap<GroupKey, f64>;

/// Aggregates the full record set ("Majority Enrolled") and its 162-day
/// subset side by side, aligned on the full set.
pub fn aggregate(
    records: &[GrowthRecord],
    category: Category,
    measure: Measure,
) -> Result<Vec<AggregatedCell>> {
    let majority = aggregate_partition(records.iter(), category, measure);
    let day_162 = aggregate_partition(records.iter().filter(|r| r.day_162), category, measure);
    debug!(
        category = category.label(),
        measure = measure.label(),
        majority_groups = majority.len(),
        day_162_groups = day_162.len(),
        "aggregated growth partitions"
    );
    align(majority, day_162)
}

pub fn aggregate_partition<'a>(
    records: impl Iterator<Item = &'a GrowthRecord>,
    category: Category,
    measure: Measure,
) -> Aggregation {
    match measure {
        Measure::ShareAdequate => share_by_level(records, category),
        Measure::MedianSgp => median_percentile(records, category),
    }
}

/// Normalized value counts over the growth level within each group. Levels
/// with no records in a group produce no entry.
fn share_by_level<'a>(
    records: impl Iterator<Item = &'a GrowthRecord>,
    category: Category,
) -> Aggregation {
    let mut counts: BTreeMap<(i32, String, Subject), BTreeMap<GrowthLevel, usize>> =
        BTreeMap::new();

    for record in records {
        let key = (
            record.test_year,
            category.value_of(record).to_string(),
            record.subject,
        );
        *counts
            .entry(key)
            .or_default()
            .entry(record.growth_level)
            .or_insert(0) += 1;
    }

    let mut shares = Aggregation::new();
    for ((year, value, subject), levels) in counts {
        let total: usize = levels.values().sum();
        for (level, count) in levels {
            shares.insert(
                (year, value.clone(), subject, Some(level)),
                count as f64 / total as f64,
            );
        }
    }
    shares
}

fn median_percentile<'a>(
    records: impl Iterator<Item = &'a GrowthRecord>,
    category: Category,
) -> Aggregation {
    let mut groups: BTreeMap<(i32, String, Subject), Vec<f64>> = BTreeMap::new();

    for record in records {
        groups
            .entry((
                record.test_year,
                category.value_of(record).to_string(),
                record.subject,
            ))
            .or_default()
            .push(f64::from(record.growth_percentile));
    }

    groups
        .into_iter()
        .filter_map(|((year, value, subject), mut values)| {
            values.sort_by(f64::total_cmp);
            median(&values).map(|m| ((year, value, subject, None), m))
        })
        .collect()
}

/// Linear-interpolation median of an already sorted slice.
pub fn median(sorted: &[f64]) -> Option<f64> {
    let len = sorted.len();
    if len == 0 {
        return None;
    }
    let mid = len / 2;
    if len % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Left-aligns the 162-day aggregation onto the full one. A key that only
/// exists on the 162-day side breaks the subset invariant.
pub fn align(majority: Aggregation, day_162: Aggregation) -> Result<Vec<AggregatedCell>> {
    if let Some(orphan) = day_162.keys().find(|key| !majority.contains_key(*key)) {
        let (year, value, subject, level) = orphan;
        let level = level.map(|l| format!(" {}", l.label())).unwrap_or_default();
        return Err(GrowthError::Integrity(format!(
            "{year}/{value}/{}{level}",
            subject.label()
        )));
    }

    Ok(majority
        .into_iter()
        .map(|(key, majority_enrolled)| {
            let day_162 = day_162.get(&key).copied();
            let (test_year, category_value, subject, growth_level) = key;
            AggregatedCell {
                test_year,
                category_value,
                subject,
                growth_level,
                majority_enrolled,
                day_162,
            }
        })
        .collect())
}
