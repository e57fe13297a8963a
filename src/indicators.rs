use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{GrowthError, Result};

pub const SHEET_WIDTH: usize = 8;

pub type Cell = Option<String>;

/// Flattened report-card sheet: eight columns, sub-tables stacked vertically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSheet {
    rows: Vec<Vec<Cell>>,
}

impl IndicatorSheet {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl IndicatorTable {
    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    fn is_blank(&self) -> bool {
        self.rows.is_empty() || self.headers.is_empty()
    }

    fn drop_absent_rows(&mut self) {
        self.rows.retain(|row| row.iter().any(Option::is_some));
    }

    fn drop_absent_columns(&mut self) {
        let keep: Vec<bool> = (0..self.headers.len())
            .map(|column| self.rows.iter().any(|row| row[column].is_some()))
            .collect();
        let mut flags = keep.iter();
        self.headers.retain(|_| *flags.next().unwrap_or(&false));
        for row in &mut self.rows {
            let mut flags = keep.iter();
            row.retain(|_| *flags.next().unwrap_or(&false));
        }
    }

    /// True when any cell outside the label column carries a value.
    fn has_values(&self) -> bool {
        self.rows
            .iter()
            .any(|row| row.iter().skip(1).any(Option::is_some))
    }

    fn drop_unrated_zero_points(&mut self) {
        let (Some(points), Some(rating)) = (self.column("Points"), self.column("Rating")) else {
            return;
        };
        self.rows.retain(|row| {
            let zero = matches!(row[points].as_deref(), Some("0.00") | Some("0"));
            let unrated = row[rating].as_deref() == Some("No Rating");
            !(zero && unrated)
        });
    }

    fn absent_values(row: &[Cell]) -> usize {
        row.iter().skip(1).filter(|cell| cell.is_none()).count()
    }

    fn tidy(&mut self) {
        self.drop_absent_rows();
        self.drop_absent_columns();
    }

    /// Position of a value column (never the label column) by header.
    fn value_column(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .skip(1)
            .position(|header| header == name)
            .map(|index| index + 1)
    }

    /// Folds side-by-side copies of the same columns into one long table with
    /// the columns in `order`. The k-th copy of each name belongs to the k-th
    /// half; a half without one of the names contributes absent cells.
    fn unpivot_duplicates(&mut self, block: &'static str, order: &[&str]) -> Result<()> {
        let copies: Vec<Vec<usize>> = order
            .iter()
            .map(|name| {
                self.headers
                    .iter()
                    .enumerate()
                    .filter(|(_, header)| header.as_str() == *name)
                    .map(|(index, _)| index)
                    .collect()
            })
            .collect();
        let halves = copies.first().map_or(0, Vec::len);
        if halves == 0 {
            return Err(GrowthError::BlockShape {
                block,
                found: 0,
                expected: order.len(),
            });
        }

        let mut rows = Vec::with_capacity(halves * self.rows.len());
        for half in 0..halves {
            for row in &self.rows {
                rows.push(
                    copies
                        .iter()
                        .map(|indices| indices.get(half).and_then(|&index| row[index].clone()))
                        .collect(),
                );
            }
        }
        self.headers = order.iter().map(|name| name.to_string()).collect();
        self.rows = rows;
        Ok(())
    }
}

/// How the first row of a block is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    Promote,
    Fixed(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorBlock {
    K8Growth,
    HsGrowth,
    CombinedGrowth,
    Enrollment,
    SubgroupGrades,
    K8Achievement,
    HsAchievement,
    K8Progress,
    HsProgress,
    ClosingAchievementGap,
    GraduationRate,
    StrengthOfDiploma,
    ElaProgress,
    ChronicAbsenteeism,
}

impl IndicatorBlock {
    pub const ALL: [IndicatorBlock; 14] = [
        IndicatorBlock::K8Growth,
        IndicatorBlock::HsGrowth,
        IndicatorBlock::CombinedGrowth,
        IndicatorBlock::Enrollment,
        IndicatorBlock::SubgroupGrades,
        IndicatorBlock::K8Achievement,
        IndicatorBlock::HsAchievement,
        IndicatorBlock::K8Progress,
        IndicatorBlock::HsProgress,
        IndicatorBlock::ClosingAchievementGap,
        IndicatorBlock::GraduationRate,
        IndicatorBlock::StrengthOfDiploma,
        IndicatorBlock::ElaProgress,
        IndicatorBlock::ChronicAbsenteeism,
    ];

    /// Elementary/middle and high school blocks rendered as a pair.
    pub const PAIRS: [(IndicatorBlock, IndicatorBlock); 3] = [
        (IndicatorBlock::K8Growth, IndicatorBlock::HsGrowth),
        (IndicatorBlock::K8Achievement, IndicatorBlock::HsAchievement),
        (IndicatorBlock::K8Progress, IndicatorBlock::HsProgress),
    ];

    pub fn rows(self) -> Range<usize> {
        match self {
            IndicatorBlock::K8Growth => 0..10,
            IndicatorBlock::HsGrowth => 10..20,
            IndicatorBlock::CombinedGrowth => 20..24,
            IndicatorBlock::Enrollment => 24..27,
            IndicatorBlock::SubgroupGrades => 27..33,
            IndicatorBlock::K8Achievement => 34..37,
            IndicatorBlock::HsAchievement => 38..41,
            IndicatorBlock::K8Progress => 42..45,
            IndicatorBlock::HsProgress => 46..49,
            IndicatorBlock::ClosingAchievementGap => 50..53,
            IndicatorBlock::GraduationRate => 53..55,
            IndicatorBlock::StrengthOfDiploma => 55..57,
            IndicatorBlock::ElaProgress => 57..60,
            IndicatorBlock::ChronicAbsenteeism => 60..64,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            IndicatorBlock::K8Growth => "Overall Growth (K-8)",
            IndicatorBlock::HsGrowth => "Overall Growth (9-12)",
            IndicatorBlock::CombinedGrowth => "Combined Growth",
            IndicatorBlock::Enrollment => "Enrollment",
            IndicatorBlock::SubgroupGrades => "Subgroup Grades",
            IndicatorBlock::K8Achievement => "Academic Achievement (K-8)",
            IndicatorBlock::HsAchievement => "Academic Achievement (9-12)",
            IndicatorBlock::K8Progress => "Academic Progress (K-8)",
            IndicatorBlock::HsProgress => "Academic Progress (9-12)",
            IndicatorBlock::ClosingAchievementGap => "Closing the Achievement Gap",
            IndicatorBlock::GraduationRate => "Graduation Rate",
            IndicatorBlock::StrengthOfDiploma => "Strength of Diploma",
            IndicatorBlock::ElaProgress => "English Language Proficiency Progress",
            IndicatorBlock::ChronicAbsenteeism => "Chronic Absenteeism",
        }
    }

    pub fn header(self) -> Header {
        match self {
            IndicatorBlock::CombinedGrowth => Header::Fixed(&["Category", "Weighted Points"]),
            _ => Header::Promote,
        }
    }
}

const SYNONYMS: [(&str, &str); 6] = [
    ("English/Lang. Arts", "ELA"),
    ("Mathematics", "Math"),
    ("Sugroup", "Subgroup"),
    ("Hispanic Ethnicity", "Hispanic"),
    ("Elementary/Middle School Overall Weight and Points:", "Overall"),
    ("High School Overall Weight and Points:", "Overall"),
];

fn parenthesized() -> &'static Regex {
    static PARENTHESIZED: OnceLock<Regex> = OnceLock::new();
    PARENTHESIZED.get_or_init(|| Regex::new(r"\([^()]*\)").expect("valid regex"))
}

fn whitespace() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

fn spaced_percent() -> &'static Regex {
    static SPACED_PERCENT: OnceLock<Regex> = OnceLock::new();
    SPACED_PERCENT.get_or_init(|| Regex::new(r"(\d)\s+%").expect("valid regex"))
}

pub fn clean_cell(value: &str) -> String {
    let mut cleaned = value.to_string();
    for (from, to) in SYNONYMS {
        if cleaned.contains(from) {
            cleaned = cleaned.replace(from, to);
        }
    }
    let cleaned = parenthesized().replace_all(&cleaned, |caps: &regex::Captures<'_>| {
        whitespace().replace_all(&caps[0], " ").into_owned()
    });
    spaced_percent().replace_all(&cleaned, "$1%").into_owned()
}

/// One-time normalisation of the raw sheet before any block is sliced.
pub fn clean_sheet(sheet: &mut IndicatorSheet) {
    for cell in sheet.rows.iter_mut().flatten().flatten() {
        *cell = clean_cell(cell);
    }
}

/// Cuts `rows` out of the sheet and promotes the header, without dropping
/// anything. A range that is not wholly inside the sheet, or that holds no
/// values, is `None`.
fn extract(sheet: &IndicatorSheet, rows: Range<usize>, header_promotion: bool) -> Option<IndicatorTable> {
    if rows.start >= rows.end || rows.end > sheet.len() {
        return None;
    }
    let region = &sheet.rows[rows];
    if region.iter().flatten().all(Option::is_none) {
        return None;
    }

    Some(if header_promotion {
        IndicatorTable {
            headers: region[0]
                .iter()
                .map(|cell| cell.clone().unwrap_or_default())
                .collect(),
            rows: region[1..].to_vec(),
        }
    } else {
        IndicatorTable {
            headers: vec![String::new(); SHEET_WIDTH],
            rows: region.to_vec(),
        }
    })
}

/// Extracts `rows` and drops every row and column that is entirely absent.
pub fn slice(sheet: &IndicatorSheet, rows: Range<usize>, header_promotion: bool) -> Option<IndicatorTable> {
    let mut table = extract(sheet, rows, header_promotion)?;
    table.tidy();
    (!table.is_blank()).then_some(table)
}

/// Slices one named block and applies its block-specific rules.
pub fn slice_block(sheet: &IndicatorSheet, block: IndicatorBlock) -> Result<Option<IndicatorTable>> {
    let rows = block.rows();
    if rows.end > sheet.len() {
        warn!(block = block.title(), sheet_rows = sheet.len(), "indicator block outside sheet");
        return Ok(None);
    }

    let header = block.header();
    let Some(mut table) = extract(sheet, rows, header == Header::Promote) else {
        debug!(block = block.title(), "indicator block empty");
        return Ok(None);
    };
    let count_header = table.headers.get(1).cloned();

    // Halves must be split while every column is still in place.
    if block == IndicatorBlock::SubgroupGrades {
        table.unpivot_duplicates(block.title(), &["Subgroup", "Points", "Rating"])?;
    }
    table.tidy();
    if table.is_blank() {
        debug!(block = block.title(), "indicator block empty");
        return Ok(None);
    }

    match block {
        IndicatorBlock::K8Growth | IndicatorBlock::HsGrowth | IndicatorBlock::SubgroupGrades => {
            table.drop_unrated_zero_points()
        }
        IndicatorBlock::CombinedGrowth => {
            if let Header::Fixed(names) = header {
                if table.column_count() != names.len() {
                    return Err(GrowthError::BlockShape {
                        block: block.title(),
                        found: table.column_count(),
                        expected: names.len(),
                    });
                }
                table.headers = names.iter().map(|name| name.to_string()).collect();
            }
        }
        IndicatorBlock::Enrollment => {
            let count = count_header
                .filter(|name| !name.is_empty())
                .and_then(|name| table.value_column(&name));
            table.headers[0] = "Grade Span".to_string();
            let truncate = table.rows.get(1).is_some_and(|row| {
                count.and_then(|index| row[index].as_deref()) == Some("0")
                    || row.iter().skip(1).all(Option::is_none)
            });
            if truncate {
                table.rows.truncate(1);
            }
        }
        IndicatorBlock::K8Achievement
        | IndicatorBlock::HsAchievement
        | IndicatorBlock::K8Progress
        | IndicatorBlock::HsProgress
        | IndicatorBlock::ClosingAchievementGap => {
            if !table.has_values() {
                debug!(block = block.title(), "indicator block has no values");
                return Ok(None);
            }
        }
        IndicatorBlock::ElaProgress | IndicatorBlock::ChronicAbsenteeism => {
            if table
                .rows
                .get(1)
                .is_some_and(|row| IndicatorTable::absent_values(row) >= 3)
            {
                table.rows.truncate(1);
            }
        }
        IndicatorBlock::GraduationRate | IndicatorBlock::StrengthOfDiploma => {}
    }

    Ok((!table.is_blank()).then_some(table))
}

pub fn slice_all(sheet: &IndicatorSheet) -> Result<Vec<(IndicatorBlock, Option<IndicatorTable>)>> {
    IndicatorBlock::ALL
        .iter()
        .map(|&block| Ok((block, slice_block(sheet, block)?)))
        .collect()
}
