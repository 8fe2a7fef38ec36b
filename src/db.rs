use std::collections::HashMap;

use anyhow::{bail, Context};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::config::{MetricWeights, DEFAULT_METRICS};
use crate::models::{MetricSample, WeekRange};
use crate::pipeline::MetricSource;

/// Metric columns of `student_metrics`. Only these names are ever placed
/// into SQL text.
pub fn is_metric_column(name: &str) -> bool {
    DEFAULT_METRICS.iter().any(|(column, _)| *column == name)
}

/// `m.<column>::DOUBLE PRECISION AS <column>` for each column, in order.
fn select_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|column| format!("m.{column}::DOUBLE PRECISION AS {column}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Column names for the weighted metrics, rejecting anything that is not a
/// known metric column.
fn metric_columns(weights: &MetricWeights) -> anyhow::Result<Vec<String>> {
    let mut columns = Vec::new();
    for name in weights.names() {
        if !is_metric_column(name) {
            bail!("metric {name} is not a student_metrics column");
        }
        columns.push(name.to_string());
    }
    Ok(columns)
}

pub struct PgMetricSource {
    pool: PgPool,
    columns: Vec<String>,
}

impl PgMetricSource {
    pub fn new(pool: PgPool, weights: &MetricWeights) -> anyhow::Result<Self> {
        Ok(Self {
            pool,
            columns: metric_columns(weights)?,
        })
    }

    fn select_list(&self) -> String {
        select_list(&self.columns)
    }

    fn sample_from_row(&self, row: &PgRow) -> anyhow::Result<MetricSample> {
        let week: i32 = row.try_get("week")?;
        let mut values = Vec::with_capacity(self.columns.len());

        for column in &self.columns {
            let value: Option<f64> = row
                .try_get(column.as_str())
                .with_context(|| format!("failed to read {column} for week {week}"))?;
            if let Some(value) = value {
                values.push((column.clone(), value));
            }
        }

        Ok(MetricSample::new(week, values))
    }
}

#[async_trait]
impl MetricSource for PgMetricSource {
    async fn resolve_student(&self, email: &str) -> anyhow::Result<Option<i64>> {
        let row = sqlx::query("SELECT id::BIGINT AS id FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .context("failed to look up student")?;

        Ok(row.map(|row| row.get("id")))
    }

    async fn student_samples(
        &self,
        student_id: i64,
        range: WeekRange,
    ) -> anyhow::Result<Vec<MetricSample>> {
        let query = format!(
            "SELECT m.week::INT AS week, {} \
             FROM student_metrics m \
             WHERE m.user_id = $1 AND m.week BETWEEN $2 AND $3 \
             ORDER BY m.week",
            self.select_list()
        );

        let rows = sqlx::query(&query)
            .bind(student_id)
            .bind(range.week_from)
            .bind(range.week_to)
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch student metrics")?;

        rows.iter().map(|row| self.sample_from_row(row)).collect()
    }

    async fn cohort_samples(&self, range: WeekRange) -> anyhow::Result<Vec<(i64, MetricSample)>> {
        let query = format!(
            "SELECT m.user_id::BIGINT AS user_id, m.week::INT AS week, {} \
             FROM student_metrics m \
             WHERE m.week BETWEEN $1 AND $2 \
             ORDER BY m.user_id, m.week",
            self.select_list()
        );

        let rows = sqlx::query(&query)
            .bind(range.week_from)
            .bind(range.week_to)
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch cohort metrics")?;

        let mut samples = Vec::with_capacity(rows.len());
        for row in &rows {
            let student_id: i64 = row.try_get("user_id")?;
            samples.push((student_id, self.sample_from_row(row)?));
        }

        Ok(samples)
    }

    async fn student_emails(&self, student_ids: &[i64]) -> anyhow::Result<HashMap<i64, String>> {
        if student_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query("SELECT id::BIGINT AS id, email FROM users WHERE id = ANY($1)")
            .bind(student_ids)
            .fetch_all(&self.pool)
            .await
            .context("failed to resolve student emails")?;

        let mut emails = HashMap::with_capacity(rows.len());
        for row in rows {
            emails.insert(row.try_get("id")?, row.try_get("email")?);
        }

        Ok(emails)
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct CsvRow {
    pub email: String,
    pub week: i32,
    pub homework_submitted: Option<f64>,
    pub homework_on_time: Option<f64>,
    pub homework_score: Option<f64>,
    pub attendance: Option<f64>,
    pub student_participation: Option<f64>,
    pub teacher_participation: Option<f64>,
    pub silence: Option<f64>,
    pub test_score: Option<f64>,
}

impl CsvRow {
    fn metrics(&self) -> [(&'static str, Option<f64>); 8] {
        [
            ("homework_submitted", self.homework_submitted),
            ("homework_on_time", self.homework_on_time),
            ("homework_score", self.homework_score),
            ("attendance", self.attendance),
            ("student_participation", self.student_participation),
            ("teacher_participation", self.teacher_participation),
            ("silence", self.silence),
            ("test_score", self.test_score),
        ]
    }

    /// Rejects values off the 0..=1 scale before they reach the table.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (metric, value) in self.metrics() {
            if let Some(value) = value {
                if !(0.0..=1.0).contains(&value) {
                    bail!(
                        "{metric} for {} week {} is {value}; metrics are fractions between 0 and 1",
                        self.email,
                        self.week
                    );
                }
            }
        }
        Ok(())
    }
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid CSV record {}", index + 1))?;
        row.validate()?;

        let user_id: i64 = sqlx::query(
            r#"
            INSERT INTO users (email)
            VALUES ($1)
            ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
            RETURNING id::BIGINT AS id
            "#,
        )
        .bind(&row.email)
        .fetch_one(pool)
        .await?
        .get("id");

        let result = sqlx::query(
            r#"
            INSERT INTO student_metrics
            (user_id, week, homework_submitted, homework_on_time, homework_score,
             attendance, student_participation, teacher_participation, silence, test_score)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (user_id, week) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(row.week)
        .bind(row.homework_submitted)
        .bind(row.homework_on_time)
        .bind(row.homework_score)
        .bind(row.attendance)
        .bind(row.student_participation)
        .bind(row.teacher_participation)
        .bind(row.silence)
        .bind(row.test_score)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    tracing::info!(inserted, path = %csv_path.display(), "Imported weekly metrics");
    Ok(inserted)
}
