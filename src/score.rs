use crate::config::MetricWeights;
use crate::error::AnalysisError;
use crate::models::{round_to, MetricAverages, ScoreResult, WeightedMetric};
use crate::zone::classify_zone;

/// Weights the averages, totals them and picks the weakest metric.
///
/// Each weighted value is rounded to two decimals before summing. The weakest
/// metric is the lowest raw average among metrics not excluded from weakness
/// ranking; ties go to the metric configured first.
pub fn score_averages(
    averages: &MetricAverages,
    weights: &MetricWeights,
) -> Result<ScoreResult, AnalysisError> {
    let mut weighted = Vec::new();
    let mut scored = MetricAverages::default();
    let mut subtotal = 0.0;
    let mut weakest: Option<(&str, f64)> = None;

    for (metric, weight) in weights.iter() {
        let Some(average) = averages.get(metric) else {
            continue;
        };

        let value = round_to(average * weight, 2);
        subtotal += value;
        scored.push(metric, average);
        weighted.push(WeightedMetric {
            metric: metric.to_string(),
            value,
        });

        if weights.is_weakness_excluded(metric) {
            continue;
        }
        match weakest {
            Some((_, lowest)) if average >= lowest => {}
            _ => weakest = Some((metric, average)),
        }
    }

    if weighted.is_empty() {
        return Err(AnalysisError::EmptyMetricSet);
    }
    let (weakest_metric, _) = weakest.ok_or(AnalysisError::EmptyMetricSet)?;

    let total_score = round_to(subtotal * 100.0, 2);

    Ok(ScoreResult {
        averages: scored,
        weighted,
        subtotal,
        total_score,
        weakest_metric: weakest_metric.to_string(),
        zone: classify_zone(total_score),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Zone;

    fn averages(pairs: &[(&str, f64)]) -> MetricAverages {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn worked_example_lands_in_red() {
        let weights = MetricWeights::new([
            ("homework_submitted", 0.1),
            ("attendance", 0.2),
            ("test_score", 0.1),
        ])
        .unwrap();
        let result = score_averages(
            &averages(&[("homework_submitted", 0.8), ("attendance", 0.9), ("test_score", 0.5)]),
            &weights,
        )
        .unwrap();

        let values: Vec<f64> = result.weighted.iter().map(|w| w.value).collect();
        assert_eq!(values, vec![0.08, 0.18, 0.05]);
        assert!((result.subtotal - 0.31).abs() < 1e-9);
        assert_eq!(result.total_score, 31.0);
        assert_eq!(result.zone, Zone::Red);
        assert_eq!(result.weakest_metric, "test_score");
    }

    #[test]
    fn all_zero_scores_zero() {
        let weights = MetricWeights::new([("attendance", 0.5), ("test_score", 0.5)]).unwrap();
        let result =
            score_averages(&averages(&[("attendance", 0.0), ("test_score", 0.0)]), &weights)
                .unwrap();
        assert_eq!(result.total_score, 0.0);
        assert_eq!(result.zone, Zone::Red);
    }

    #[test]
    fn perfect_student_with_unit_weights_scores_hundred() {
        let weights = MetricWeights::new([
            ("homework_submitted", 0.25),
            ("attendance", 0.25),
            ("student_participation", 0.25),
            ("test_score", 0.25),
        ])
        .unwrap();
        let result = score_averages(
            &averages(&[
                ("homework_submitted", 1.0),
                ("attendance", 1.0),
                ("student_participation", 1.0),
                ("test_score", 1.0),
            ]),
            &weights,
        )
        .unwrap();
        assert_eq!(result.total_score, 100.0);
        assert_eq!(result.zone, Zone::Green);
    }

    #[test]
    fn weakest_tie_goes_to_first_configured_metric() {
        let weights = MetricWeights::new([
            ("test_score", 0.1),
            ("attendance", 0.1),
            ("homework_score", 0.1),
        ])
        .unwrap();
        let result = score_averages(
            &averages(&[("homework_score", 0.3), ("attendance", 0.3), ("test_score", 0.6)]),
            &weights,
        )
        .unwrap();
        assert_eq!(result.weakest_metric, "attendance");
    }

    #[test]
    fn weakest_uses_raw_average_not_weighted_value() {
        let weights = MetricWeights::new([("attendance", 0.9), ("test_score", 0.05)]).unwrap();
        let result =
            score_averages(&averages(&[("attendance", 0.4), ("test_score", 0.6)]), &weights)
                .unwrap();
        assert_eq!(result.weakest_metric, "attendance");
    }

    #[test]
    fn excluded_metric_is_reported_but_never_weakest() {
        let weights =
            MetricWeights::new([("attendance", 0.5), ("silence", 0.0), ("test_score", 0.5)])
                .unwrap()
                .with_weakness_excluded(["silence"]);
        let result = score_averages(
            &averages(&[("attendance", 0.7), ("silence", 0.05), ("test_score", 0.8)]),
            &weights,
        )
        .unwrap();
        assert_eq!(result.weakest_metric, "attendance");
        assert_eq!(result.averages.get("silence"), Some(0.05));
        assert_eq!(result.weighted.len(), 3);
    }

    #[test]
    fn no_overlap_is_empty_metric_set() {
        let weights = MetricWeights::new([("attendance", 0.5)]).unwrap();
        let err = score_averages(&averages(&[("test_score", 0.5)]), &weights).unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyMetricSet));
    }

    #[test]
    fn only_excluded_metrics_is_empty_metric_set() {
        let weights = MetricWeights::new([("silence", 0.1)])
            .unwrap()
            .with_weakness_excluded(["silence"]);
        let err = score_averages(&averages(&[("silence", 0.2)]), &weights).unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyMetricSet));
    }

    #[test]
    fn weighted_values_are_rounded_before_summing() {
        let weights = MetricWeights::new([("attendance", 0.1), ("test_score", 0.1)]).unwrap();
        let result =
            score_averages(&averages(&[("attendance", 0.333), ("test_score", 0.444)]), &weights)
                .unwrap();
        let values: Vec<f64> = result.weighted.iter().map(|w| w.value).collect();
        assert_eq!(values, vec![0.03, 0.04]);
        assert_eq!(result.total_score, 7.0);
    }
}
