use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{DeserializeErrorKind, ErrorKind, ReaderBuilder, Trim};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{GrowthError, Result};
use crate::indicators::{IndicatorSheet, SHEET_WIDTH};
use crate::models::{GrowthLevel, GrowthRecord, Subject};

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Test Year")]
    test_year: i32,
    #[serde(rename = "Grade Level")]
    grade_level: String,
    #[serde(rename = "Subject")]
    subject: String,
    #[serde(rename = "Ethnicity")]
    ethnicity: String,
    #[serde(rename = "Socioeconomic Status")]
    socioeconomic_status: String,
    #[serde(rename = "English Learner Status")]
    english_learner_status: String,
    #[serde(rename = "Special Education Status")]
    special_education_status: String,
    #[serde(rename = "Day 162")]
    day_162: String,
    #[serde(rename = "Growth Level", alias = "ILEARNGrowth Level")]
    growth_level: String,
    #[serde(rename = "Growth Percentile", alias = "ILEARNGrowth Percentile")]
    growth_percentile: u8,
}

impl CsvRow {
    fn into_record(self, row: usize) -> Result<GrowthRecord> {
        let invalid = |column: &str, value: String| GrowthError::InvalidValue {
            row,
            column: column.to_string(),
            value,
        };

        let labels = [
            ("Grade Level", &self.grade_level),
            ("Ethnicity", &self.ethnicity),
            ("Socioeconomic Status", &self.socioeconomic_status),
            ("English Learner Status", &self.english_learner_status),
            ("Special Education Status", &self.special_education_status),
            ("Growth Level", &self.growth_level),
        ];
        if let Some((column, _)) = labels.iter().find(|(_, value)| value.is_empty()) {
            return Err(invalid(*column, String::new()));
        }

        if !(1000..=9999).contains(&self.test_year) {
            return Err(invalid("Test Year", self.test_year.to_string()));
        }
        if !(1..=99).contains(&self.growth_percentile) {
            return Err(invalid("Growth Percentile", self.growth_percentile.to_string()));
        }
        let Ok(subject) = self.subject.parse::<Subject>() else {
            return Err(invalid("Subject", self.subject));
        };
        let day_162 = match self.day_162.as_str() {
            "TRUE" => true,
            "FALSE" => false,
            _ => return Err(invalid("Day 162", self.day_162)),
        };

        Ok(GrowthRecord {
            test_year: self.test_year,
            grade_level: self.grade_level,
            subject,
            ethnicity: self.ethnicity,
            socioeconomic_status: self.socioeconomic_status,
            english_learner_status: self.english_learner_status,
            special_education_status: self.special_education_status,
            day_162,
            growth_level: GrowthLevel::parse(&self.growth_level),
            growth_percentile: self.growth_percentile,
        })
    }
}

/// Serde reports an absent header as a missing struct field.
fn missing_column(err: &csv::Error) -> Option<String> {
    let ErrorKind::Deserialize { err, .. } = err.kind() else {
        return None;
    };
    let DeserializeErrorKind::Message(message) = err.kind() else {
        return None;
    };
    message
        .strip_prefix("missing field `")?
        .strip_suffix('`')
        .map(str::to_string)
}

pub fn read_growth_records<R: Read>(source: R) -> Result<Vec<GrowthRecord>> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(source);
    let mut records = Vec::new();

    for (offset, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.map_err(|err| match missing_column(&err) {
            Some(column) => GrowthError::MissingColumn(column),
            None => GrowthError::Csv(err),
        })?;
        records.push(row.into_record(offset + 1)?);
    }

    info!(count = records.len(), "loaded growth records");
    Ok(records)
}

pub fn read_growth_records_from_path(path: &Path) -> Result<Vec<GrowthRecord>> {
    read_growth_records(File::open(path)?)
}

/// Reads a header-less sheet. Rows are padded or truncated to eight cells.
pub fn read_indicator_sheet<R: Read>(source: R) -> Result<IndicatorSheet> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(source);
    let mut rows = Vec::new();
    let mut widest = 0usize;

    for result in reader.records() {
        let raw = result?;
        widest = widest.max(raw.len());
        let mut row: Vec<Option<String>> = raw
            .iter()
            .take(SHEET_WIDTH)
            .map(|cell| {
                let cell = cell.trim();
                (!cell.is_empty()).then(|| cell.to_string())
            })
            .collect();
        row.resize(SHEET_WIDTH, None);
        rows.push(row);
    }

    if !rows.is_empty() && widest < SHEET_WIDTH {
        return Err(GrowthError::SheetTooNarrow(widest));
    }

    debug!(rows = rows.len(), "loaded indicator sheet");
    Ok(IndicatorSheet::new(rows))
}

pub fn read_indicator_sheet_from_path(path: &Path) -> Result<IndicatorSheet> {
    read_indicator_sheet(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Test Year,Grade Level,Subject,Ethnicity,Socioeconomic Status,English Learner Status,Special Education Status,Day 162,ILEARNGrowth Level,ILEARNGrowth Percentile";

    #[test]
    fn reads_records_with_historical_aliases() {
        let data = format!(
            "{HEADER}\n2022,Grade 3,ELA,Hispanic,Free or Reduced Price Meals,Non-English Learner,General Education,TRUE,Adequate Growth,61\n2022,Grade 3,Math,White,Paid Meals,English Learner,Special Education,FALSE,Typical,40\n"
        );
        let records = read_growth_records(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].test_year, 2022);
        assert_eq!(records[0].subject, Subject::Ela);
        assert!(records[0].day_162);
        assert_eq!(records[0].growth_level, GrowthLevel::Adequate);
        assert_eq!(records[1].growth_level, GrowthLevel::NotAdequate);
        assert_eq!(records[1].growth_percentile, 40);
        assert!(!records[1].day_162);
    }

    #[test]
    fn reads_current_header_spellings_and_trims_cells() {
        let data = "Test Year, Grade Level,Subject,Ethnicity,Socioeconomic Status,English Learner Status,Special Education Status,Day 162,Growth Level,Growth Percentile\n 2023 ,Grade 8, Math ,Asian,Paid Meals,Non-English Learner,General Education,FALSE, Adequate Growth ,99\n";
        let records = read_growth_records(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].test_year, 2023);
        assert_eq!(records[0].grade_level, "Grade 8");
        assert_eq!(records[0].subject, Subject::Math);
        assert_eq!(records[0].growth_level, GrowthLevel::Adequate);
        assert_eq!(records[0].growth_percentile, 99);
    }

    #[test]
    fn empty_demographic_label_is_invalid() {
        let data = format!("{HEADER}\n2022,Grade 3,ELA,,Paid Meals,Non-English Learner,General Education,TRUE,Adequate Growth,50\n");
        match read_growth_records(data.as_bytes()) {
            Err(GrowthError::InvalidValue { row, column, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(column, "Ethnicity");
            }
            other => panic!("expected invalid value, got {other:?}"),
        }
    }

    #[test]
    fn missing_column_is_schema_drift() {
        let data = "Test Year,Grade Level,Subject\n2022,Grade 3,ELA\n";
        match read_growth_records(data.as_bytes()) {
            Err(GrowthError::MissingColumn(column)) => assert_eq!(column, "Ethnicity"),
            other => panic!("expected missing column, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_boolean_day_162() {
        let data = format!("{HEADER}\n2022,Grade 3,ELA,Asian,Paid Meals,Non-English Learner,General Education,yes,Adequate Growth,50\n");
        match read_growth_records(data.as_bytes()) {
            Err(GrowthError::InvalidValue { column, .. }) => assert_eq!(column, "Day 162"),
            other => panic!("expected invalid value, got {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_range_percentile() {
        let data = format!("{HEADER}\n2022,Grade 3,ELA,Asian,Paid Meals,Non-English Learner,General Education,TRUE,Adequate Growth,100\n");
        match read_growth_records(data.as_bytes()) {
            Err(GrowthError::InvalidValue { column, value, .. }) => {
                assert_eq!(column, "Growth Percentile");
                assert_eq!(value, "100");
            }
            other => panic!("expected invalid value, got {other:?}"),
        }
    }

    #[test]
    fn sheet_rows_are_padded_and_blank_cells_absent() {
        let data = "Category,Points,Rating,,,,,\nELA, 12.5 ,Meets\n";
        let sheet = read_indicator_sheet(data.as_bytes()).unwrap();
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet.rows()[1].len(), SHEET_WIDTH);
        assert_eq!(sheet.rows()[1][1].as_deref(), Some("12.5"));
        assert_eq!(sheet.rows()[0][3], None);
    }

    #[test]
    fn narrow_sheet_is_schema_drift() {
        let data = "Category,Points,Rating\n";
        assert!(matches!(
            read_indicator_sheet(data.as_bytes()),
            Err(GrowthError::SheetTooNarrow(3))
        ));
    }
}
