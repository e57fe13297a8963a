use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrowthError {
    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Indicator sheet has {0} columns, expected 8")]
    SheetTooNarrow(usize),

    #[error("Invalid value in row {row}, column {column}: {value:?}")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Integrity: group {0} appears in the 162-day partition but not in the full record set")]
    Integrity(String),

    #[error("Category value {0:?} contains the row-key delimiter '|'")]
    DelimiterInLabel(String),

    #[error("Indicator block {block} has {found} value columns, expected {expected}")]
    BlockShape {
        block: &'static str,
        found: usize,
        expected: usize,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GrowthError>;
