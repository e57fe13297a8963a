use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::indicators::{IndicatorBlock, IndicatorTable};
use crate::layout::{self, Layout};
use crate::models::{Category, Measure, Metric, ShapedTable};

pub const NO_DATA: &str = "No Data to Display";
const MISSING: &str = "N/A";

#[derive(Debug, Serialize)]
pub struct Section<'a, T> {
    pub title: String,
    pub layout: Option<Layout>,
    pub tables: Vec<&'a T>,
}

#[derive(Debug, Serialize)]
pub struct Report<'a, T> {
    pub title: &'static str,
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<Section<'a, T>>,
}

fn section<'a, T>(title: String, a: Option<&'a T>, b: Option<&'a T>, column_count: usize) -> Section<'a, T> {
    match layout::pair_layout(a, b, column_count) {
        Some((layout, tables)) => Section {
            title,
            layout: Some(layout),
            tables,
        },
        None => Section {
            title,
            layout: None,
            tables: Vec::new(),
        },
    }
}

/// One section per category. When both measures are present their tables
/// are laid out as a pair.
pub fn growth_sections<'a>(
    share: Option<&'a [ShapedTable]>,
    median: Option<&'a [ShapedTable]>,
    categories: &[Category],
) -> Vec<Section<'a, ShapedTable>> {
    let find = |tables: Option<&'a [ShapedTable]>, category: Category| {
        tables
            .and_then(|tables| tables.iter().find(|table| table.category == category))
            .filter(|table| !table.is_empty())
    };

    categories
        .iter()
        .map(|&category| {
            let a = find(share, category);
            let b = find(median, category);
            let width = a
                .iter()
                .chain(b.iter())
                .map(|table| table.columns.len())
                .max()
                .unwrap_or(0);
            section(category.label().to_string(), a, b, width)
        })
        .collect()
}

pub fn indicator_sections<'a>(
    blocks: &'a [(IndicatorBlock, Option<IndicatorTable>)],
) -> Vec<Section<'a, IndicatorTable>> {
    let lookup = |wanted: IndicatorBlock| {
        blocks
            .iter()
            .find(|(block, _)| *block == wanted)
            .and_then(|(_, table)| table.as_ref())
    };
    let paired = |block: IndicatorBlock| {
        IndicatorBlock::PAIRS
            .iter()
            .any(|(k8, hs)| *k8 == block || *hs == block)
    };

    let mut sections = Vec::new();
    for (block, table) in blocks {
        if let Some((k8, hs)) = IndicatorBlock::PAIRS.iter().find(|(k8, _)| k8 == block) {
            let a = lookup(*k8);
            let b = lookup(*hs);
            let width = a
                .iter()
                .chain(b.iter())
                .map(|table| table.column_count())
                .max()
                .unwrap_or(0);
            let title = format!("{} / {}", k8.title(), hs.title());
            sections.push(section(title, a, b, width));
        } else if !paired(*block) {
            let width = table.as_ref().map_or(0, IndicatorTable::column_count);
            sections.push(section(block.title().to_string(), table.as_ref(), None, width));
        }
    }
    sections
}

fn format_value(measure: Measure, metric: Metric, value: Option<f64>) -> String {
    let Some(value) = value else {
        return MISSING.to_string();
    };
    match (measure, metric) {
        (Measure::ShareAdequate, Metric::Difference) => format!("{:+.2}%", value * 100.0),
        (Measure::ShareAdequate, _) => format!("{:.2}%", value * 100.0),
        (Measure::MedianSgp, Metric::Difference) => format!("{:+.1}", value),
        (Measure::MedianSgp, _) => format!("{:.1}", value),
    }
}

pub fn render_shaped_table(output: &mut String, table: &ShapedTable) {
    let (years, metrics) = table.header_rows();
    let _ = write!(output, "| {} | Subject |", table.category.label());
    for (year, metric) in years.iter().zip(metrics.iter()) {
        let _ = write!(output, " {} {} |", year, metric.suffix());
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "|---|---|{}", "---|".repeat(table.columns.len()));

    for row in &table.rows {
        let (value, subject) = row.category.split_once('|').unwrap_or((row.category.as_str(), ""));
        let _ = write!(output, "| {} | {} |", value, subject);
        for (column, cell) in table.columns.iter().zip(row.values.iter()) {
            let _ = write!(output, " {} |", format_value(table.measure, column.metric, *cell));
        }
        let _ = writeln!(output);
    }
}

pub fn render_indicator_table(output: &mut String, table: &IndicatorTable) {
    let _ = writeln!(output, "| {} |", table.headers.join(" | "));
    let _ = writeln!(output, "|{}", "---|".repeat(table.column_count()));
    for row in &table.rows {
        let cells: Vec<&str> = row.iter().map(|cell| cell.as_deref().unwrap_or("")).collect();
        let _ = writeln!(output, "| {} |", cells.join(" | "));
    }
}

pub fn build_markdown<T>(report: &Report<'_, T>, render: impl Fn(&mut String, &T)) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {}", report.title);
    let _ = writeln!(
        output,
        "Generated for {} at {}",
        report.source,
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    );

    for section in &report.sections {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {}", section.title);

        if section.tables.is_empty() {
            let _ = writeln!(output, "{NO_DATA}");
            continue;
        }

        if let Some(layout) = section.layout {
            let label = match layout {
                Layout::Single => "single",
                Layout::Stacked => "stacked",
                Layout::SideBySide => "side by side",
            };
            let _ = writeln!(output, "_Layout: {label}_");
        }

        for &table in &section.tables {
            let _ = writeln!(output);
            render(&mut output, table);
        }
    }

    output
}

pub fn growth_title(measure: Option<Measure>) -> &'static str {
    match measure {
        Some(Measure::ShareAdequate) => "Academic Growth: Adequate Growth",
        Some(Measure::MedianSgp) => "Academic Growth: Median SGP",
        None => "Academic Growth",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::growth::tests::record;
    use crate::models::{GrowthLevel, Subject};
    use crate::shape::growth_tables;

    fn report<'a, T>(sections: Vec<Section<'a, T>>) -> Report<'a, T> {
        Report {
            title: "Test",
            source: "school 42".to_string(),
            generated_at: Utc::now(),
            sections,
        }
    }

    #[test]
    fn growth_pairs_measures_per_category() {
        let records = vec![
            record(2022, "Grade 3", Subject::Ela, true, GrowthLevel::Adequate, 70),
            record(2022, "Grade 3", Subject::Ela, false, GrowthLevel::NotAdequate, 20),
        ];
        let share = growth_tables(&records, Measure::ShareAdequate, &Category::ALL).unwrap();
        let median = growth_tables(&records, Measure::MedianSgp, &Category::ALL).unwrap();
        let sections = growth_sections(Some(&share), Some(&median), &[Category::GradeLevel]);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].layout, Some(Layout::SideBySide));
        assert_eq!(sections[0].tables.len(), 2);

        let markdown = build_markdown(&report(sections), render_shaped_table);
        assert!(markdown.contains("| Grade Level | Subject | 2022 162 Days | 2022 Majority Enrolled | 2022 Difference |"));
        assert!(markdown.contains("| Grade 3 | ELA | 100.00% | 50.00% | +50.00% |"));
        assert!(markdown.contains("| Grade 3 | ELA | 70.0 | 45.0 | +25.0 |"));
    }

    #[test]
    fn empty_growth_section_prints_placeholder() {
        let share = growth_tables(&[], Measure::ShareAdequate, &Category::ALL).unwrap();
        let sections = growth_sections(Some(&share), None, &Category::ALL);
        assert!(sections.iter().all(|section| section.tables.is_empty()));
        let markdown = build_markdown(&report(sections), render_shaped_table);
        assert_eq!(markdown.matches(NO_DATA).count(), 5);
    }

    #[test]
    fn missing_values_render_as_not_available() {
        let records = vec![record(2022, "Grade 4", Subject::Math, false, GrowthLevel::Adequate, 66)];
        let share = growth_tables(&records, Measure::ShareAdequate, &Category::ALL).unwrap();
        let mut output = String::new();
        render_shaped_table(&mut output, &share[0]);
        assert!(output.contains("| Grade 4 | Math | N/A | 100.00% | N/A |"));
    }

    #[test]
    fn indicator_pairs_share_a_section() {
        let table = IndicatorTable {
            headers: vec!["Category".to_string(), "Points".to_string()],
            rows: vec![vec![Some("ELA".to_string()), Some("12.5".to_string())]],
        };
        let blocks: Vec<(IndicatorBlock, Option<IndicatorTable>)> = IndicatorBlock::ALL
            .iter()
            .map(|&block| {
                let present = matches!(block, IndicatorBlock::K8Growth | IndicatorBlock::GraduationRate);
                (block, present.then(|| table.clone()))
            })
            .collect();
        let sections = indicator_sections(&blocks);
        assert_eq!(sections.len(), 11);
        assert_eq!(sections[0].title, "Overall Growth (K-8) / Overall Growth (9-12)");
        assert_eq!(sections[0].layout, Some(Layout::Single));

        let markdown = build_markdown(&report(sections), render_indicator_table);
        assert!(markdown.contains("| Category | Points |"));
        assert!(markdown.contains("| ELA | 12.5 |"));
        assert_eq!(markdown.matches(NO_DATA).count(), 9);
    }
}
