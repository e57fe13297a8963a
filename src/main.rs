use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod db;
mod error;
mod growth;
mod indicators;
mod layout;
mod loader;
mod models;
mod report;
mod shape;

use models::{Category, Measure};
use report::Report;

#[derive(Parser)]
#[command(name = "charter-growth-dashboard")]
#[command(about = "Academic growth and report-card indicator tables for charter schools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Import per-student growth records for a school
    ImportGrowth {
        #[arg(long)]
        school_id: i32,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import a report-card indicator sheet for a school and year
    ImportIndicators {
        #[arg(long)]
        school_id: i32,
        #[arg(long, value_parser = parse_year)]
        year: String,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Compare Majority Enrolled and 162-day growth by category
    #[command(group(
        ArgGroup::new("source")
            .args(["csv", "school_id"])
            .required(true)
            .multiple(false)
    ))]
    Growth {
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        school_id: Option<i32>,
        /// grade-level, ethnicity, socioeconomic-status, english-learner-status
        /// or special-education-status; all categories when omitted
        #[arg(long)]
        category: Option<Category>,
        /// share-adequate or median-sgp; both, side by side, when omitted
        #[arg(long)]
        measure: Option<Measure>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Slice the report-card indicator sheet into its tables
    #[command(group(
        ArgGroup::new("source")
            .args(["csv", "school_id"])
            .required(true)
            .multiple(false)
    ))]
    Indicators {
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long, requires = "year")]
        school_id: Option<i32>,
        #[arg(long, value_parser = parse_year)]
        year: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn parse_year(value: &str) -> Result<String, String> {
    if value.len() == 4 && value.chars().all(|c| c.is_ascii_digit()) {
        Ok(value.to_string())
    } else {
        Err(format!("expected a four-digit year, got '{value}'"))
    }
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn emit<T: Serialize>(
    payload: &Report<'_, T>,
    format: OutputFormat,
    render: impl Fn(&mut String, &T),
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let output = match format {
        OutputFormat::Markdown => report::build_markdown(payload, render),
        OutputFormat::Json => serde_json::to_string_pretty(payload)?,
    };

    match out {
        Some(path) => {
            std::fs::write(path, output)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Report written to {}.", path.display());
        }
        None => println!("{output}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&connect().await?).await?;
            println!("Schema ready.");
        }
        Commands::ImportGrowth { school_id, csv } => {
            let inserted = db::import_growth_csv(&connect().await?, school_id, &csv).await?;
            println!("Inserted {inserted} growth records from {}.", csv.display());
        }
        Commands::ImportIndicators {
            school_id,
            year,
            csv,
        } => {
            let rows = db::import_indicator_csv(&connect().await?, school_id, &year, &csv).await?;
            println!("Stored {rows} indicator rows from {}.", csv.display());
        }
        Commands::Growth {
            csv,
            school_id,
            category,
            measure,
            format,
            out,
        } => {
            let (records, source) = match (csv, school_id) {
                (Some(path), _) => (
                    loader::read_growth_records_from_path(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?,
                    path.display().to_string(),
                ),
                (None, Some(id)) => (
                    db::fetch_growth_records(&connect().await?, id).await?,
                    format!("school {id}"),
                ),
                (None, None) => anyhow::bail!("either --csv or --school-id is required"),
            };
            if records.is_empty() {
                warn!(source = %source, "no growth records");
            }

            let categories = category.map_or_else(|| Category::ALL.to_vec(), |c| vec![c]);
            let share = match measure {
                None | Some(Measure::ShareAdequate) => {
                    Some(shape::growth_tables(&records, Measure::ShareAdequate, &categories)?)
                }
                Some(Measure::MedianSgp) => None,
            };
            let median = match measure {
                None | Some(Measure::MedianSgp) => {
                    Some(shape::growth_tables(&records, Measure::MedianSgp, &categories)?)
                }
                Some(Measure::ShareAdequate) => None,
            };

            let growth_report = Report {
                title: report::growth_title(measure),
                source,
                generated_at: Utc::now(),
                sections: report::growth_sections(
                    share.as_deref(),
                    median.as_deref(),
                    &categories,
                ),
            };
            info!(sections = growth_report.sections.len(), "growth report ready");
            emit(&growth_report, format, report::render_shaped_table, out.as_deref())?;
        }
        Commands::Indicators {
            csv,
            school_id,
            year,
            format,
            out,
        } => {
            let (mut sheet, source) = match (csv, school_id, year) {
                (Some(path), _, _) => (
                    loader::read_indicator_sheet_from_path(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?,
                    path.display().to_string(),
                ),
                (None, Some(id), Some(year)) => (
                    db::fetch_indicator_sheet(&connect().await?, id, &year).await?,
                    format!("school {id} ({year})"),
                ),
                _ => anyhow::bail!("either --csv or --school-id with --year is required"),
            };
            if sheet.is_empty() {
                warn!(source = %source, "no indicator sheet");
            }

            indicators::clean_sheet(&mut sheet);
            let blocks = indicators::slice_all(&sheet)?;
            let indicator_report = Report {
                title: "Report Card Indicators",
                source,
                generated_at: Utc::now(),
                sections: report::indicator_sections(&blocks),
            };
            info!(sections = indicator_report.sections.len(), "indicator report ready");
            emit(&indicator_report, format, report::render_indicator_table, out.as_deref())?;
        }
    }

    Ok(())
}
