use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

mod aggregate;
mod coach;
mod config;
mod db;
mod error;
mod models;
mod pipeline;
mod rank;
mod report;
mod score;
mod zone;

use config::{CoachSettings, MetricWeights};
use error::AnalysisError;
use models::WeekRange;
use pipeline::Pipeline;
use rank::RankDirection;

#[derive(Parser)]
#[command(name = "student-motivation")]
#[command(
    about = "Weekly motivation scoring and coaching for Group Scholar students",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(clap::Args)]
struct WeekArgs {
    #[arg(long, default_value_t = 1)]
    week_from: i32,
    /// Defaults to the current ISO week
    #[arg(long)]
    week_to: Option<i32>,
}

impl WeekArgs {
    fn range(&self) -> Result<WeekRange, AnalysisError> {
        let week_to = self
            .week_to
            .unwrap_or_else(|| Utc::now().iso_week().week() as i32);
        WeekRange::new(self.week_from, week_to)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Import weekly metric rows from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Score one student over a week range
    Analyse {
        #[arg(long)]
        email: String,
        #[command(flatten)]
        weeks: WeekArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Rank students by motivation score
    Rank {
        #[arg(long, value_enum, default_value_t = RankDirection::Highest)]
        direction: RankDirection,
        #[command(flatten)]
        weeks: WeekArgs,
        #[arg(long, default_value = "5")]
        num_students: NonZeroUsize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Generate a markdown report of ranked students
    Report {
        #[arg(long, value_enum, default_value_t = RankDirection::Lowest)]
        direction: RankDirection,
        #[command(flatten)]
        weeks: WeekArgs,
        #[arg(long, default_value = "10")]
        num_students: NonZeroUsize,
        #[arg(long, default_value = "motivation-report.md")]
        out: PathBuf,
    },
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
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

fn build_pipeline(pool: PgPool) -> anyhow::Result<Pipeline> {
    let lookup = |key: &str| std::env::var(key).ok();
    let weights = Arc::new(MetricWeights::from_lookup(lookup).context("invalid metric weights")?);
    let coach_settings = CoachSettings::from_lookup(lookup).context("invalid coach settings")?;

    let source = db::PgMetricSource::new(pool, &weights)?;
    let coach = coach::build_provider(&coach_settings)?;

    Ok(Pipeline::new(
        Box::new(source),
        coach,
        weights,
        coach_settings.timeout,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();
    let pool = connect().await?;

    match cli.command {
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} weekly rows from {}.", csv.display());
        }
        Commands::Analyse {
            email,
            weeks,
            format,
        } => {
            let range = weeks.range()?;
            let pipeline = build_pipeline(pool)?;

            let student = match pipeline.analyse_student(&email, range).await {
                Ok(student) => student,
                Err(AnalysisError::NoData { .. }) => {
                    println!("No data found for {email} in weeks {range}.");
                    return Ok(());
                }
                Err(err) => {
                    if matches!(err, AnalysisError::EmptyMetricSet) {
                        tracing::error!(
                            "Check WEIGHT_* against recorded metrics and WEAKNESS_EXCLUDE"
                        );
                    }
                    return Err(err.into());
                }
            };

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&student)?),
                OutputFormat::Text => print!("{}", report::render_student(&student)),
            }
        }
        Commands::Rank {
            direction,
            weeks,
            num_students,
            format,
        } => {
            let range = weeks.range()?;
            let pipeline = build_pipeline(pool)?;
            let summary = pipeline
                .rank_students(direction, range, Some(num_students))
                .await?;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&summary.students)?)
                }
                OutputFormat::Text => {
                    if summary.students.is_empty() {
                        println!("No students with metrics in weeks {range}.");
                        return Ok(());
                    }

                    println!("{}:", direction.heading());
                    for student in &summary.students {
                        println!("- {}", report::student_line(student));
                        println!("  {}", student.coaching_message);
                    }
                    if !summary.skipped.is_empty() {
                        println!("{} students could not be scored.", summary.skipped.len());
                    }
                }
            }
        }
        Commands::Report {
            direction,
            weeks,
            num_students,
            out,
        } => {
            let range = weeks.range()?;
            let pipeline = build_pipeline(pool)?;
            let summary = pipeline
                .rank_students(direction, range, Some(num_students))
                .await?;
            let report = report::build_report(direction, range, &summary, Utc::now());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
