use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::aggregate::aggregate_samples;
use crate::coach::{coaching_message, CoachMessageProvider, CoachRequest};
use crate::config::MetricWeights;
use crate::error::AnalysisError;
use crate::models::{
    MetricSample, RankedSummary, ScoreResult, SkippedStudent, StudentReport, WeekRange,
};
use crate::rank::{rank_by_score, RankDirection};
use crate::score::score_averages;

/// Where weekly metric rows come from.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Internal id for a student email, if the student exists.
    async fn resolve_student(&self, email: &str) -> anyhow::Result<Option<i64>>;

    async fn student_samples(
        &self,
        student_id: i64,
        range: WeekRange,
    ) -> anyhow::Result<Vec<MetricSample>>;

    /// Samples for every student with rows in `range`, tagged by student id.
    async fn cohort_samples(&self, range: WeekRange) -> anyhow::Result<Vec<(i64, MetricSample)>>;

    async fn student_emails(&self, student_ids: &[i64]) -> anyhow::Result<HashMap<i64, String>>;
}

pub fn placeholder_identifier(student_id: i64) -> String {
    format!("user-{student_id}@unknown.local")
}

pub fn resolve_identifier(student_id: i64, emails: &HashMap<i64, String>) -> String {
    emails
        .get(&student_id)
        .cloned()
        .unwrap_or_else(|| placeholder_identifier(student_id))
}

/// Aggregate, weight and classify one student's samples.
pub fn score_student(
    identifier: &str,
    samples: &[MetricSample],
    range: WeekRange,
    weights: &MetricWeights,
) -> Result<ScoreResult, AnalysisError> {
    let averages = aggregate_samples(identifier, samples, range, weights)?;
    score_averages(&averages, weights)
}

pub struct Pipeline {
    source: Box<dyn MetricSource>,
    coach: Box<dyn CoachMessageProvider>,
    weights: Arc<MetricWeights>,
    coach_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn MetricSource>,
        coach: Box<dyn CoachMessageProvider>,
        weights: Arc<MetricWeights>,
        coach_timeout: Duration,
    ) -> Self {
        Self {
            source,
            coach,
            weights,
            coach_timeout,
        }
    }

    pub async fn analyse_student(
        &self,
        email: &str,
        range: WeekRange,
    ) -> Result<StudentReport, AnalysisError> {
        let started = Instant::now();
        tracing::info!(%email, weeks = %range, "Start: student analysis");

        let student_id = self
            .source
            .resolve_student(email)
            .await?
            .ok_or_else(|| AnalysisError::UnknownIdentifier(email.to_string()))?;

        let samples = self.source.student_samples(student_id, range).await?;
        tracing::debug!(student_id, rows = samples.len(), "Fetched metric rows");

        let score = score_student(email, &samples, range, &self.weights)?;
        let report = self.with_message(email.to_string(), score).await;

        tracing::info!(
            %email,
            total_score = report.score.total_score,
            zone = %report.score.zone,
            "Analysis completed in {:.2} seconds",
            started.elapsed().as_secs_f64()
        );
        Ok(report)
    }

    /// Scores every student with data in `range` and ranks them.
    ///
    /// A student whose numbers cannot be computed is logged and listed in
    /// `skipped`; the rest of the batch carries on. Messages are only
    /// requested for students kept after truncation.
    pub async fn rank_students(
        &self,
        direction: RankDirection,
        range: WeekRange,
        limit: Option<NonZeroUsize>,
    ) -> Result<RankedSummary, AnalysisError> {
        let started = Instant::now();
        tracing::info!(?direction, weeks = %range, "Start: ranked motivation analysis");

        let rows = self.source.cohort_samples(range).await?;
        tracing::debug!(rows = rows.len(), "Fetched cohort metric rows");

        let mut by_student: BTreeMap<i64, Vec<MetricSample>> = BTreeMap::new();
        for (student_id, sample) in rows {
            by_student.entry(student_id).or_default().push(sample);
        }

        let ids: Vec<i64> = by_student.keys().copied().collect();
        let emails = self.source.student_emails(&ids).await?;

        let mut scored = Vec::with_capacity(by_student.len());
        let mut skipped = Vec::new();

        for (student_id, samples) in &by_student {
            let identifier = resolve_identifier(*student_id, &emails);
            match score_student(&identifier, samples, range, &self.weights) {
                Ok(score) => scored.push((identifier, score)),
                Err(err) => {
                    tracing::warn!(student_id, %identifier, "Failed to analyse metrics: {err}");
                    skipped.push(SkippedStudent {
                        identifier,
                        reason: err.to_string(),
                    });
                }
            }
        }

        let ranked = rank_by_score(scored, direction, limit, |(_, score)| score.total_score);

        let mut students = Vec::with_capacity(ranked.len());
        for (identifier, score) in ranked {
            students.push(self.with_message(identifier, score).await);
        }

        tracing::info!(
            ranked = students.len(),
            skipped = skipped.len(),
            "Full analysis completed in {:.2} seconds",
            started.elapsed().as_secs_f64()
        );
        Ok(RankedSummary { students, skipped })
    }

    async fn with_message(&self, identifier: String, score: ScoreResult) -> StudentReport {
        let request = CoachRequest {
            weakest_metric: score.weakest_metric.clone(),
            zone: score.zone,
        };
        let coaching_message =
            coaching_message(self.coach.as_ref(), &request, self.coach_timeout).await;

        StudentReport {
            identifier,
            score,
            coaching_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coach::{ZoneCoach, FALLBACK_MESSAGE};
    use crate::error::CoachError;
    use crate::models::Zone;

    #[derive(Default)]
    struct MemorySource {
        emails: HashMap<i64, String>,
        rows: Vec<(i64, MetricSample)>,
        fail_cohort: bool,
    }

    impl MemorySource {
        fn student(mut self, id: i64, email: Option<&str>, weeks: &[(i32, f64, f64)]) -> Self {
            if let Some(email) = email {
                self.emails.insert(id, email.to_string());
            }
            for (week, attendance, test_score) in weeks {
                let sample = MetricSample::new(
                    *week,
                    [("attendance", *attendance), ("test_score", *test_score)],
                );
                self.rows.push((id, sample));
            }
            self
        }
    }

    #[async_trait]
    impl MetricSource for MemorySource {
        async fn resolve_student(&self, email: &str) -> anyhow::Result<Option<i64>> {
            Ok(self
                .emails
                .iter()
                .find(|(_, e)| e.as_str() == email)
                .map(|(id, _)| *id))
        }

        async fn student_samples(
            &self,
            student_id: i64,
            range: WeekRange,
        ) -> anyhow::Result<Vec<MetricSample>> {
            Ok(self
                .rows
                .iter()
                .filter(|(id, sample)| *id == student_id && range.contains(sample.week))
                .map(|(_, sample)| sample.clone())
                .collect())
        }

        async fn cohort_samples(
            &self,
            range: WeekRange,
        ) -> anyhow::Result<Vec<(i64, MetricSample)>> {
            if self.fail_cohort {
                anyhow::bail!("connection reset");
            }
            Ok(self
                .rows
                .iter()
                .filter(|(_, sample)| range.contains(sample.week))
                .cloned()
                .collect())
        }

        async fn student_emails(
            &self,
            student_ids: &[i64],
        ) -> anyhow::Result<HashMap<i64, String>> {
            Ok(student_ids
                .iter()
                .filter_map(|id| self.emails.get(id).map(|email| (*id, email.clone())))
                .collect())
        }
    }

    struct BrokenCoach;

    #[async_trait]
    impl CoachMessageProvider for BrokenCoach {
        async fn message(&self, _request: &CoachRequest) -> Result<String, CoachError> {
            Err(CoachError::Status {
                status: 503,
                body: "overloaded".to_string(),
            })
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn weights() -> Arc<MetricWeights> {
        Arc::new(MetricWeights::new([("attendance", 0.5), ("test_score", 0.5)]).unwrap())
    }

    fn pipeline(source: MemorySource, coach: Box<dyn CoachMessageProvider>) -> Pipeline {
        Pipeline::new(Box::new(source), coach, weights(), Duration::from_secs(1))
    }

    fn range(from: i32, to: i32) -> WeekRange {
        WeekRange::new(from, to).unwrap()
    }

    #[tokio::test]
    async fn analyses_single_student() {
        let source = MemorySource::default().student(
            1,
            Some("avery.lee@groupscholar.com"),
            &[(1, 0.9, 0.4), (2, 0.7, 0.6), (9, 0.0, 0.0)],
        );
        let report = pipeline(source, Box::new(ZoneCoach))
            .analyse_student("avery.lee@groupscholar.com", range(1, 2))
            .await
            .unwrap();

        assert_eq!(report.identifier, "avery.lee@groupscholar.com");
        assert!((report.score.averages.get("attendance").unwrap() - 0.8).abs() < 1e-9);
        assert_eq!(report.score.total_score, 65.0);
        assert_eq!(report.score.zone, Zone::Yellow);
        assert_eq!(report.score.weakest_metric, "test_score");
        assert!(report.coaching_message.contains("test score"));
    }

    #[tokio::test]
    async fn unknown_student_is_distinct_from_no_data() {
        let source = MemorySource::default().student(
            1,
            Some("avery.lee@groupscholar.com"),
            &[(5, 0.5, 0.5)],
        );
        let pipeline = pipeline(source, Box::new(ZoneCoach));

        let err = pipeline
            .analyse_student("nobody@groupscholar.com", range(1, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownIdentifier(_)));

        let err = pipeline
            .analyse_student("avery.lee@groupscholar.com", range(20, 30))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoData { .. }));
    }

    #[tokio::test]
    async fn coach_failure_keeps_the_score() {
        let source = MemorySource::default().student(
            1,
            Some("jules.moreno@groupscholar.com"),
            &[(3, 1.0, 1.0)],
        );
        let report = pipeline(source, Box::new(BrokenCoach))
            .analyse_student("jules.moreno@groupscholar.com", range(1, 5))
            .await
            .unwrap();

        assert_eq!(report.coaching_message, FALLBACK_MESSAGE);
        assert_eq!(report.score.total_score, 100.0);
        assert_eq!(report.score.zone, Zone::Green);
        assert_eq!(report.score.weighted.len(), 2);
    }

    #[tokio::test]
    async fn ranks_highest_and_truncates() {
        let source = MemorySource::default()
            .student(1, Some("avery.lee@groupscholar.com"), &[(1, 0.8, 0.8)])
            .student(2, Some("jules.moreno@groupscholar.com"), &[(1, 0.4, 0.4)])
            .student(3, Some("kiara.patel@groupscholar.com"), &[(1, 0.6, 0.6)]);
        let summary = pipeline(source, Box::new(ZoneCoach))
            .rank_students(RankDirection::Highest, range(1, 4), NonZeroUsize::new(2))
            .await
            .unwrap();

        let totals: Vec<f64> = summary.students.iter().map(|s| s.score.total_score).collect();
        assert_eq!(totals, vec![80.0, 60.0]);
        assert_eq!(summary.students[0].identifier, "avery.lee@groupscholar.com");
        assert_eq!(summary.students[1].identifier, "kiara.patel@groupscholar.com");
        assert!(summary.skipped.is_empty());
    }

    #[tokio::test]
    async fn unresolved_ids_get_placeholder_and_failures_are_skipped() {
        let source = MemorySource::default()
            .student(7, None, &[(2, 0.3, 0.3)])
            .student(8, Some("noor.haddad@groupscholar.com"), &[(2, 4.0, 0.5)])
            .student(9, Some("kiara.patel@groupscholar.com"), &[(2, 0.9, 0.9)]);
        let summary = pipeline(source, Box::new(BrokenCoach))
            .rank_students(RankDirection::Lowest, range(1, 4), None)
            .await
            .unwrap();

        let identifiers: Vec<&str> = summary
            .students
            .iter()
            .map(|s| s.identifier.as_str())
            .collect();
        assert_eq!(identifiers, vec!["user-7@unknown.local", "kiara.patel@groupscholar.com"]);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].identifier, "noor.haddad@groupscholar.com");
        assert!(summary
            .students
            .iter()
            .all(|s| s.coaching_message == FALLBACK_MESSAGE));
    }

    #[tokio::test]
    async fn storage_failure_propagates_for_batch() {
        let source = MemorySource {
            fail_cohort: true,
            ..MemorySource::default()
        };
        let err = pipeline(source, Box::new(ZoneCoach))
            .rank_students(RankDirection::Highest, range(1, 4), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Storage(_)));
    }

    #[test]
    fn placeholder_is_deterministic() {
        let emails = HashMap::from([(1, "avery.lee@groupscholar.com".to_string())]);
        assert_eq!(resolve_identifier(1, &emails), "avery.lee@groupscholar.com");
        assert_eq!(resolve_identifier(42, &emails), "user-42@unknown.local");
    }
}
