//! Temporal decay scoring with activity-aware recency.
//!
//! A memory's decay score is `2^(-age_days / half_life)` floored at the
//! type's minimum score. Age is normally measured against the current
//! time; when the project's last activity timestamp is supplied and the
//! memory predates it, age is measured against that activity instead, so a
//! long project pause does not make every memory look stale.

use crate::models::Memory;
use chrono::{DateTime, Utc};

/// Boost applied to memories younger than [`RECENT_WINDOW_HOURS`].
const RECENT_BOOST: f64 = 1.2;

/// Window for the recent boost, in hours.
const RECENT_WINDOW_HOURS: f64 = 24.0;

/// Weight of the strategy relevance when mixed into the effective score.
const RELEVANCE_WEIGHT: f64 = 0.3;

/// Fractional days between two instants, clamped at zero.
fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let seconds = (later - earlier).num_seconds();
    if seconds <= 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let days = seconds as f64 / 86_400.0;
    days
}

/// Breakdown of one memory's decay computation, for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct DecayExplanation {
    /// The age actually used for scoring, in days.
    pub age_days: f64,
    /// Age relative to absolute now, in days.
    pub absolute_age_days: f64,
    /// Whether age was measured against project activity instead of now.
    pub activity_aware_mode: bool,
    /// Length of the project pause, when activity-aware mode applied.
    pub gap_duration_days: Option<f64>,
    /// The type's half-life in days.
    pub half_life_days: f64,
    /// The type's score floor.
    pub min_score: f64,
    /// The decay score before weighting.
    pub decay_score: f64,
    /// Whether the recent boost applied.
    pub recent_boost_applied: bool,
}

/// Temporal decay engine.
#[derive(Debug, Clone)]
pub struct TemporalDecayEngine {
    /// Multiplier applied to every decay score.
    base_weight: f64,
}

impl TemporalDecayEngine {
    /// Creates an engine with the default base weight.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_weight: 1.0 }
    }

    /// Overrides the base weight.
    #[must_use]
    pub const fn with_base_weight(mut self, base_weight: f64) -> Self {
        self.base_weight = base_weight;
        self
    }

    /// Returns the age used for scoring and whether activity-aware mode
    /// applied.
    fn effective_age(
        memory: &Memory,
        now: DateTime<Utc>,
        project_last_activity: Option<DateTime<Utc>>,
    ) -> (f64, bool) {
        match project_last_activity {
            Some(activity) if memory.created_at <= activity => {
                (days_between(memory.created_at, activity), true)
            },
            _ => (days_between(memory.created_at, now), false),
        }
    }

    /// Computes the temporal decay score in `[min_score(type), 1.0]`.
    #[must_use]
    pub fn temporal_score(
        &self,
        memory: &Memory,
        now: DateTime<Utc>,
        project_last_activity: Option<DateTime<Utc>>,
    ) -> f64 {
        let (age_days, _) = Self::effective_age(memory, now, project_last_activity);
        let half_life = memory.memory_type.half_life_days();
        let decayed = (-age_days / half_life).exp2();
        let floored = decayed.max(memory.memory_type.min_score());

        let boosted = if age_days * 24.0 < RECENT_WINDOW_HOURS {
            (floored * RECENT_BOOST).min(1.0)
        } else {
            floored
        };

        boosted * self.base_weight
    }

    /// Computes the effective ranking score, mixing in the strategy's
    /// relevance when one is available.
    #[must_use]
    pub fn effective_score(
        &self,
        memory: &Memory,
        now: DateTime<Utc>,
        project_last_activity: Option<DateTime<Utc>>,
        relevance: Option<f64>,
    ) -> f64 {
        let temporal = self.temporal_score(memory, now, project_last_activity);
        relevance.map_or(temporal, |relevance| {
            (1.0 - RELEVANCE_WEIGHT) * temporal + RELEVANCE_WEIGHT * relevance.clamp(0.0, 1.0)
        })
    }

    /// Explains the decay computation for one memory.
    #[must_use]
    pub fn explain(
        &self,
        memory: &Memory,
        now: DateTime<Utc>,
        project_last_activity: Option<DateTime<Utc>>,
    ) -> DecayExplanation {
        let (age_days, activity_aware_mode) =
            Self::effective_age(memory, now, project_last_activity);
        let absolute_age_days = days_between(memory.created_at, now);
        let gap_duration_days = if activity_aware_mode {
            project_last_activity.map(|activity| days_between(activity, now))
        } else {
            None
        };

        DecayExplanation {
            age_days,
            absolute_age_days,
            activity_aware_mode,
            gap_duration_days,
            half_life_days: memory.memory_type.half_life_days(),
            min_score: memory.memory_type.min_score(),
            decay_score: self.temporal_score(memory, now, project_last_activity),
            recent_boost_applied: age_days * 24.0 < RECENT_WINDOW_HOURS,
        }
    }
}

impl Default for TemporalDecayEngine {
    fn default() -> Self {
        Self::new()
    }
}
