use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info};

use crate::error::{GrowthError, Result};
use crate::growth;
use crate::models::{
    AggregatedCell, Category, GrowthLevel, GrowthRecord, Measure, Metric, ShapedRow, ShapedTable,
    WideColumn,
};

/// Descending years, each expanded to the fixed metric triplet.
pub fn canonical_columns(years: &BTreeSet<i32>) -> Vec<WideColumn> {
    years
        .iter()
        .rev()
        .flat_map(|&year| {
            Metric::ORDER
                .into_iter()
                .map(move |metric| WideColumn { year, metric })
        })
        .collect()
}

/// `"{category value}|{subject}"`.
pub fn row_key(cell: &AggregatedCell) -> Result<String> {
    if cell.category_value.contains('|') {
        return Err(GrowthError::DelimiterInLabel(cell.category_value.clone()));
    }
    Ok(format!("{}|{}", cell.category_value, cell.subject.label()))
}

/// Pivots aligned cells wide on `test_year`. Rows keep the order in which
/// their key first appears in `cells`.
pub fn shape(cells: &[AggregatedCell], category: Category, measure: Measure) -> Result<ShapedTable> {
    let kept: Vec<&AggregatedCell> = cells
        .iter()
        .filter(|cell| match measure {
            Measure::ShareAdequate => cell.growth_level == Some(GrowthLevel::Adequate),
            Measure::MedianSgp => true,
        })
        .collect();

    let years: BTreeSet<i32> = kept.iter().map(|cell| cell.test_year).collect();
    let columns = canonical_columns(&years);
    let position: HashMap<WideColumn, usize> = columns
        .iter()
        .enumerate()
        .map(|(index, column)| (*column, index))
        .collect();

    let mut rows: Vec<ShapedRow> = Vec::new();
    let mut row_index: HashMap<String, usize> = HashMap::new();

    for cell in kept {
        let key = row_key(cell)?;
        let index = *row_index.entry(key.clone()).or_insert_with(|| {
            rows.push(ShapedRow {
                category: key,
                values: vec![None; columns.len()],
            });
            rows.len() - 1
        });

        let values = [
            (Metric::Day162, cell.day_162),
            (Metric::MajorityEnrolled, Some(cell.majority_enrolled)),
            (Metric::Difference, cell.difference()),
        ];
        for (metric, value) in values {
            let column = WideColumn {
                year: cell.test_year,
                metric,
            };
            rows[index].values[position[&column]] = value;
        }
    }

    let table = ShapedTable {
        category,
        measure,
        columns,
        rows,
    };
    debug!(columns = ?table.column_names(), "canonical column order");
    info!(
        category = category.label(),
        measure = measure.label(),
        rows = table.rows.len(),
        years = table.years().len(),
        "shaped growth table"
    );
    Ok(table)
}

pub fn growth_table(
    records: &[GrowthRecord],
    category: Category,
    measure: Measure,
) -> Result<ShapedTable> {
    let cells = growth::aggregate(records, category, measure)?;
    shape(&cells, category, measure)
}

/// One table per requested category, in the order given.
pub fn growth_tables(
    records: &[GrowthRecord],
    measure: Measure,
    categories: &[Category],
) -> Result<Vec<ShapedTable>> {
    categories
        .iter()
        .map(|&category| growth_table(records, category, measure))
        .collect()
}
