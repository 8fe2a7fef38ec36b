use std::fmt;

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::error::AnalysisError;

/// Inclusive range of academic weeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekRange {
    pub week_from: i32,
    pub week_to: i32,
}

impl WeekRange {
    pub fn new(week_from: i32, week_to: i32) -> Result<Self, AnalysisError> {
        if week_from > week_to {
            return Err(AnalysisError::InvalidWeekRange { week_from, week_to });
        }
        Ok(Self { week_from, week_to })
    }

    pub fn contains(&self, week: i32) -> bool {
        (self.week_from..=self.week_to).contains(&week)
    }
}

impl fmt::Display for WeekRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.week_from, self.week_to)
    }
}

/// One student's observations for one week. Metrics the row did not record
/// are simply absent.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub week: i32,
    pub values: Vec<(String, f64)>,
}

impl MetricSample {
    pub fn new<I, S>(week: i32, values: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            week,
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn value(&self, metric: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(name, _)| name == metric)
            .map(|(_, value)| *value)
    }
}

/// Mean value per metric, in weight order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricAverages(Vec<(String, f64)>);

impl MetricAverages {
    pub fn push(&mut self, metric: impl Into<String>, average: f64) {
        self.0.push((metric.into(), average));
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(name, _)| name == metric)
            .map(|(_, value)| *value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for MetricAverages {
    fn from_iter<T: IntoIterator<Item = (S, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl Serialize for MetricAverages {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (metric, average) in &self.0 {
            map.serialize_entry(metric, &round_to(*average, 4))?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Zone {
    Red,
    Yellow,
    Green,
}

impl Zone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Red => "Red",
            Zone::Yellow => "Yellow",
            Zone::Green => "Green",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedMetric {
    pub metric: String,
    pub value: f64,
}

impl Serialize for WeightedMetric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("WeightedMetric", 2)?;
        state.serialize_field("label", &metric_label(&self.metric))?;
        state.serialize_field("value", &self.value)?;
        state.end()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub averages: MetricAverages,
    pub weighted: Vec<WeightedMetric>,
    pub subtotal: f64,
    pub total_score: f64,
    pub weakest_metric: String,
    pub zone: Zone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentReport {
    pub identifier: String,
    pub score: ScoreResult,
    pub coaching_message: String,
}

impl Serialize for StudentReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("StudentReport", 8)?;
        state.serialize_field("identifier", &self.identifier)?;
        state.serialize_field("averages", &self.score.averages)?;
        state.serialize_field("weighted", &self.score.weighted)?;
        state.serialize_field("subtotal", &round_to(self.score.subtotal, 4))?;
        state.serialize_field("total_score_percent", &format_percent(self.score.total_score))?;
        state.serialize_field("zone", &self.score.zone)?;
        state.serialize_field("weakest_metric", &self.score.weakest_metric)?;
        state.serialize_field("coaching_message", &self.coaching_message)?;
        state.end()
    }
}

/// A student left out of a ranked summary because their numbers could not
/// be computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedStudent {
    pub identifier: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankedSummary {
    pub students: Vec<StudentReport>,
    pub skipped: Vec<SkippedStudent>,
}

/// Rounds half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// `homework_on_time` -> `Homework On Time`.
pub fn metric_label(metric: &str) -> String {
    metric
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Percent string with at least one decimal: `31.0%`, `62.5%`, `45.01%`.
pub fn format_percent(total_score: f64) -> String {
    if total_score.fract() == 0.0 {
        format!("{total_score:.1}%")
    } else {
        format!("{total_score}%")
    }
}
