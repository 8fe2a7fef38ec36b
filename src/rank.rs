use std::num::NonZeroUsize;

use clap::ValueEnum;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RankDirection {
    /// Highest total score first
    Highest,
    /// Lowest total score first
    Lowest,
}

impl RankDirection {
    pub fn heading(&self) -> &'static str {
        match self {
            RankDirection::Highest => "Most Motivated Students",
            RankDirection::Lowest => "Least Motivated Students",
        }
    }
}

/// Stable sort by `total_score` in `direction`, then keep the first `limit`.
///
/// Only successfully scored entries reach this point; failures are recorded
/// upstream as skipped students.
pub fn rank_by_score<T, F>(
    mut entries: Vec<T>,
    direction: RankDirection,
    limit: Option<NonZeroUsize>,
    total_score: F,
) -> Vec<T>
where
    F: Fn(&T) -> f64,
{
    match direction {
        RankDirection::Highest => {
            entries.sort_by(|a, b| total_score(b).total_cmp(&total_score(a)))
        }
        RankDirection::Lowest => {
            entries.sort_by(|a, b| total_score(a).total_cmp(&total_score(b)))
        }
    }

    if let Some(limit) = limit {
        entries.truncate(limit.get());
    }
    entries
}
