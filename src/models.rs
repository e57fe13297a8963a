use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subject {
    Ela,
    Math,
}

impl Subject {
    pub fn label(self) -> &'static str {
        match self {
            Subject::Ela => "ELA",
            Subject::Math => "Math",
        }
    }
}

impl FromStr for Subject {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "ELA" | "English/Lang. Arts" => Ok(Subject::Ela),
            "Math" | "Mathematics" => Ok(Subject::Math),
            _ => Err(()),
        }
    }
}

/// Coarse growth partition. Finer labels (`Low`, `Typical`, `High`) and
/// anything else that is not exactly `Adequate Growth` collapse to
/// `NotAdequate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GrowthLevel {
    Adequate,
    NotAdequate,
}

impl GrowthLevel {
    pub fn parse(value: &str) -> Self {
        if value.trim() == "Adequate Growth" {
            GrowthLevel::Adequate
        } else {
            GrowthLevel::NotAdequate
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GrowthLevel::Adequate => "Adequate Growth",
            GrowthLevel::NotAdequate => "Not Adequate Growth",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrowthRecord {
    pub test_year: i32,
    pub grade_level: String,
    pub subject: Subject,
    pub ethnicity: String,
    pub socioeconomic_status: String,
    pub english_learner_status: String,
    pub special_education_status: String,
    pub day_162: bool,
    pub growth_level: GrowthLevel,
    pub growth_percentile: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    #[serde(rename = "Grade Level")]
    GradeLevel,
    Ethnicity,
    #[serde(rename = "Socioeconomic Status")]
    SocioeconomicStatus,
    #[serde(rename = "English Learner Status")]
    EnglishLearnerStatus,
    #[serde(rename = "Special Education Status")]
    SpecialEducationStatus,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::GradeLevel,
        Category::Ethnicity,
        Category::SocioeconomicStatus,
        Category::EnglishLearnerStatus,
        Category::SpecialEducationStatus,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::GradeLevel => "Grade Level",
            Category::Ethnicity => "Ethnicity",
            Category::SocioeconomicStatus => "Socioeconomic Status",
            Category::EnglishLearnerStatus => "English Learner Status",
            Category::SpecialEducationStatus => "Special Education Status",
        }
    }

    pub fn value_of(self, record: &GrowthRecord) -> &str {
        match self {
            Category::GradeLevel => &record.grade_level,
            Category::Ethnicity => &record.ethnicity,
            Category::SocioeconomicStatus => &record.socioeconomic_status,
            Category::EnglishLearnerStatus => &record.english_learner_status,
            Category::SpecialEducationStatus => &record.special_education_status,
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "grade-level" => Ok(Category::GradeLevel),
            "ethnicity" => Ok(Category::Ethnicity),
            "socioeconomic-status" => Ok(Category::SocioeconomicStatus),
            "english-learner-status" => Ok(Category::EnglishLearnerStatus),
            "special-education-status" => Ok(Category::SpecialEducationStatus),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    ShareAdequate,
    MedianSgp,
}

impl Measure {
    pub fn label(self) -> &'static str {
        match self {
            Measure::ShareAdequate => "Adequate Growth",
            Measure::MedianSgp => "Median SGP",
        }
    }
}

impl FromStr for Measure {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "share-adequate" => Ok(Measure::ShareAdequate),
            "median-sgp" => Ok(Measure::MedianSgp),
            other => Err(format!("unknown measure '{other}'")),
        }
    }
}

/// One aligned group. `growth_level` is only populated for
/// `Measure::ShareAdequate`, where each group yields one cell per level.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedCell {
    pub test_year: i32,
    pub category_value: String,
    pub subject: Subject,
    pub growth_level: Option<GrowthLevel>,
    pub majority_enrolled: f64,
    pub day_162: Option<f64>,
}

impl AggregatedCell {
    pub fn difference(&self) -> Option<f64> {
        self.day_162.map(|day_162| day_162 - self.majority_enrolled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Day162,
    MajorityEnrolled,
    Difference,
}

impl Metric {
    pub const ORDER: [Metric; 3] = [Metric::Day162, Metric::MajorityEnrolled, Metric::Difference];

    pub fn suffix(self) -> &'static str {
        match self {
            Metric::Day162 => "162 Days",
            Metric::MajorityEnrolled => "Majority Enrolled",
            Metric::Difference => "Difference",
        }
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.suffix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WideColumn {
    pub year: i32,
    pub metric: Metric,
}

impl fmt::Display for WideColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{}", self.year, self.metric.suffix())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapedRow {
    pub category: String,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapedTable {
    pub category: Category,
    pub measure: Measure,
    pub columns: Vec<WideColumn>,
    pub rows: Vec<ShapedRow>,
}

impl ShapedTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Flat `"{year}{suffix}"` names, split downstream on the 4-character
    /// year boundary.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(ToString::to_string).collect()
    }

    /// Two parallel header rows: the year of each column and its metric.
    pub fn header_rows(&self) -> (Vec<i32>, Vec<Metric>) {
        self.columns
            .iter()
            .map(|column| (column.year, column.metric))
            .unzip()
    }

    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.columns.iter().map(|column| column.year).collect();
        years.dedup();
        years
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_levels_collapse_to_coarse_partition() {
        assert_eq!(GrowthLevel::parse("Adequate Growth"), GrowthLevel::Adequate);
        assert_eq!(GrowthLevel::parse("Not Adequate Growth"), GrowthLevel::NotAdequate);
        assert_eq!(GrowthLevel::parse("Typical"), GrowthLevel::NotAdequate);
        assert_eq!(GrowthLevel::parse("Low"), GrowthLevel::NotAdequate);
    }

    #[test]
    fn wide_column_names_split_on_year_boundary() {
        let column = WideColumn {
            year: 2022,
            metric: Metric::MajorityEnrolled,
        };
        let name = column.to_string();
        assert_eq!(name, "2022Majority Enrolled");
        let (year, suffix) = name.split_at(4);
        assert_eq!(year, "2022");
        assert_eq!(suffix, "Majority Enrolled");
    }

    #[test]
    fn header_rows_are_parallel() {
        let table = ShapedTable {
            category: Category::GradeLevel,
            measure: Measure::MedianSgp,
            columns: Metric::ORDER
                .iter()
                .map(|metric| WideColumn {
                    year: 2023,
                    metric: *metric,
                })
                .collect(),
            rows: Vec::new(),
        };
        let (years, metrics) = table.header_rows();
        assert_eq!(years, vec![2023, 2023, 2023]);
        assert_eq!(metrics, Metric::ORDER.to_vec());
        assert_eq!(table.years(), vec![2023]);
        assert!(table.is_empty());
    }

    #[test]
    fn category_slugs_parse() {
        assert_eq!("ethnicity".parse::<Category>(), Ok(Category::Ethnicity));
        assert_eq!("median-sgp".parse::<Measure>(), Ok(Measure::MedianSgp));
        assert!("gender".parse::<Category>().is_err());
    }
}
