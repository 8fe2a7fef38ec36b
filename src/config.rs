use std::collections::HashSet;
use std::time::Duration;

use anyhow::{bail, Context};

/// Tracked metrics and their default weights, in column order.
///
/// Every metric is a fraction in `0..=1`. `silence` is reported but carries no
/// weight by default and is excluded from weakest-metric selection. The
/// defaults sum to 0.9, so a perfect student scores 90 unless overridden.
pub const DEFAULT_METRICS: [(&str, f64); 8] = [
    ("homework_submitted", 0.1),
    ("homework_on_time", 0.1),
    ("homework_score", 0.2),
    ("attendance", 0.2),
    ("student_participation", 0.1),
    ("teacher_participation", 0.1),
    ("silence", 0.0),
    ("test_score", 0.1),
];

pub const DEFAULT_WEAKNESS_EXCLUDE: &str = "silence";
pub const DEFAULT_COACH_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_COACH_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_COACH_TIMEOUT_SECS: u64 = 20;

/// Ordered metric weights. Built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricWeights {
    entries: Vec<(String, f64)>,
    weakness_excluded: HashSet<String>,
}

impl MetricWeights {
    pub fn new<I, S>(entries: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();

        for (name, weight) in entries {
            let name = name.into();
            if !weight.is_finite() || weight < 0.0 {
                bail!("weight for {name} must be a non-negative number, got {weight}");
            }
            if !seen.insert(name.clone()) {
                bail!("metric {name} is weighted more than once");
            }
            ordered.push((name, weight));
        }

        Ok(Self {
            entries: ordered,
            weakness_excluded: HashSet::new(),
        })
    }

    /// Reads `WEIGHT_<METRIC>` overrides and `WEAKNESS_EXCLUDE` through `lookup`,
    /// falling back to [`DEFAULT_METRICS`].
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut entries = Vec::with_capacity(DEFAULT_METRICS.len());
        for (name, default) in DEFAULT_METRICS {
            let key = weight_key(name);
            let weight = match lookup(&key) {
                Some(raw) => raw
                    .trim()
                    .parse::<f64>()
                    .with_context(|| format!("{key} must be a number, got {raw:?}"))?,
                None => default,
            };
            entries.push((name, weight));
        }

        let excluded = lookup("WEAKNESS_EXCLUDE")
            .unwrap_or_else(|| DEFAULT_WEAKNESS_EXCLUDE.to_string());
        let excluded = excluded
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        Ok(Self::new(entries)?.with_weakness_excluded(excluded))
    }

    /// Marks metrics that are still scored and reported but never chosen as
    /// the weakest metric.
    pub fn with_weakness_excluded<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.weakness_excluded = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(name, weight)| (name.as_str(), *weight))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    #[cfg(test)]
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(name, _)| name == metric)
            .map(|(_, weight)| *weight)
    }

    pub fn is_weakness_excluded(&self, metric: &str) -> bool {
        self.weakness_excluded.contains(metric)
    }
}

pub fn weight_key(metric: &str) -> String {
    format!("WEIGHT_{}", metric.to_ascii_uppercase())
}

#[derive(Debug, Clone)]
pub struct CoachSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl CoachSettings {
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let timeout_secs = match lookup("COACH_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("COACH_TIMEOUT_SECS must be whole seconds, got {raw:?}"))?,
            None => DEFAULT_COACH_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            bail!("COACH_TIMEOUT_SECS must be at least 1");
        }

        Ok(Self {
            api_key: lookup("OPENAI_API_KEY").filter(|key| !key.trim().is_empty()),
            model: lookup("OPENAI_API_MODEL").unwrap_or_else(|| DEFAULT_COACH_MODEL.to_string()),
            base_url: lookup("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_COACH_BASE_URL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}
