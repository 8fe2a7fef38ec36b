use crate::config::MetricWeights;
use crate::error::AnalysisError;
use crate::models::{MetricAverages, MetricSample, WeekRange};

/// Averages each weighted metric over the samples that fall inside `range`.
///
/// A sample that lacks a metric is left out of that metric's mean rather than
/// counted as zero. Metrics recorded by no sample are omitted.
pub fn aggregate_samples(
    identifier: &str,
    samples: &[MetricSample],
    range: WeekRange,
    weights: &MetricWeights,
) -> Result<MetricAverages, AnalysisError> {
    let in_range: Vec<&MetricSample> = samples
        .iter()
        .filter(|sample| range.contains(sample.week))
        .collect();

    if in_range.is_empty() {
        return Err(AnalysisError::NoData {
            identifier: identifier.to_string(),
            week_from: range.week_from,
            week_to: range.week_to,
        });
    }

    let mut averages = MetricAverages::default();

    for metric in weights.names() {
        let mut total = 0.0;
        let mut count = 0usize;

        for sample in &in_range {
            let Some(value) = sample.value(metric) else {
                continue;
            };
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(AnalysisError::MetricOutOfRange {
                    metric: metric.to_string(),
                    value,
                    week: sample.week,
                });
            }
            total += value;
            count += 1;
        }

        if count > 0 {
            averages.push(metric, total / count as f64);
        }
    }

    Ok(averages)
}
