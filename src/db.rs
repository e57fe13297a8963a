use std::path::Path;

use anyhow::Context;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::indicators::{Cell, IndicatorSheet, SHEET_WIDTH};
use crate::loader;
use crate::models::{GrowthLevel, GrowthRecord, Subject};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Replaces the school's records for every test year present in the file.
pub async fn import_growth_csv(
    pool: &PgPool,
    school_id: i32,
    csv_path: &Path,
) -> anyhow::Result<usize> {
    let records = loader::read_growth_records_from_path(csv_path)
        .with_context(|| format!("failed to read {}", csv_path.display()))?;

    let mut years: Vec<i32> = records.iter().map(|record| record.test_year).collect();
    years.sort_unstable();
    years.dedup();

    let mut tx = pool.begin().await?;
    sqlx::query(
        "DELETE FROM charter_dashboard.growth_records WHERE school_id = $1 AND test_year = ANY($2)",
    )
    .bind(school_id)
    .bind(&years)
    .execute(&mut *tx)
    .await?;

    for record in &records {
        sqlx::query(
            r#"
            INSERT INTO charter_dashboard.growth_records
            (id, school_id, test_year, grade_level, subject, ethnicity, socioeconomic_status,
             english_learner_status, special_education_status, day_162, growth_level,
             growth_percentile)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(school_id)
        .bind(record.test_year)
        .bind(&record.grade_level)
        .bind(record.subject.label())
        .bind(&record.ethnicity)
        .bind(&record.socioeconomic_status)
        .bind(&record.english_learner_status)
        .bind(&record.special_education_status)
        .bind(record.day_162)
        .bind(record.growth_level.label())
        .bind(i16::from(record.growth_percentile))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(school_id, years = ?years, count = records.len(), "imported growth records");
    Ok(records.len())
}

pub async fn fetch_growth_records(pool: &PgPool, school_id: i32) -> anyhow::Result<Vec<GrowthRecord>> {
    let rows = sqlx::query(
        "SELECT test_year, grade_level, subject, ethnicity, socioeconomic_status, \
         english_learner_status, special_education_status, day_162, growth_level, \
         growth_percentile \
         FROM charter_dashboard.growth_records \
         WHERE school_id = $1 \
         ORDER BY test_year, imported_at",
    )
    .bind(school_id)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let subject: String = row.get("subject");
        let growth_level: String = row.get("growth_level");
        let percentile: i16 = row.get("growth_percentile");

        records.push(GrowthRecord {
            test_year: row.get("test_year"),
            grade_level: row.get("grade_level"),
            subject: subject
                .parse::<Subject>()
                .map_err(|_| anyhow::anyhow!("unknown subject {subject:?} for school {school_id}"))?,
            ethnicity: row.get("ethnicity"),
            socioeconomic_status: row.get("socioeconomic_status"),
            english_learner_status: row.get("english_learner_status"),
            special_education_status: row.get("special_education_status"),
            day_162: row.get("day_162"),
            growth_level: GrowthLevel::parse(&growth_level),
            growth_percentile: u8::try_from(percentile)
                .with_context(|| format!("growth percentile {percentile} out of range"))?,
        });
    }

    info!(school_id, count = records.len(), "fetched growth records");
    Ok(records)
}

/// Stores the sheet row by row, replacing any sheet already held for the
/// school and year.
pub async fn import_indicator_csv(
    pool: &PgPool,
    school_id: i32,
    year: &str,
    csv_path: &Path,
) -> anyhow::Result<usize> {
    let sheet = loader::read_indicator_sheet_from_path(csv_path)
        .with_context(|| format!("failed to read {}", csv_path.display()))?;

    let mut tx = pool.begin().await?;
    sqlx::query(
        "DELETE FROM charter_dashboard.indicator_rows WHERE school_id = $1 AND report_year = $2",
    )
    .bind(school_id)
    .bind(year)
    .execute(&mut *tx)
    .await?;

    for (row_index, cells) in sheet.rows().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO charter_dashboard.indicator_rows (school_id, report_year, row_index, cells)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(school_id)
        .bind(year)
        .bind(i32::try_from(row_index)?)
        .bind(cells)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(school_id, year, rows = sheet.len(), "imported indicator sheet");
    Ok(sheet.len())
}

pub async fn fetch_indicator_sheet(
    pool: &PgPool,
    school_id: i32,
    year: &str,
) -> anyhow::Result<IndicatorSheet> {
    let rows = sqlx::query(
        "SELECT cells FROM charter_dashboard.indicator_rows \
         WHERE school_id = $1 AND report_year = $2 \
         ORDER BY row_index",
    )
    .bind(school_id)
    .bind(year)
    .fetch_all(pool)
    .await?;

    let mut sheet = Vec::with_capacity(rows.len());
    for row in rows {
        let mut cells: Vec<Cell> = row.get("cells");
        anyhow::ensure!(
            cells.len() >= SHEET_WIDTH,
            "indicator row for school {school_id} ({year}) has {} columns, expected {SHEET_WIDTH}",
            cells.len()
        );
        cells.truncate(SHEET_WIDTH);
        sheet.push(cells);
    }

    info!(school_id, year, rows = sheet.len(), "fetched indicator sheet");
    Ok(IndicatorSheet::new(sheet))
}
