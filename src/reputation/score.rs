//! Reputation Score Types and Scoring Law
//!
//! The score is a pure function of an address's history and the scoring configuration:
//!
//! ```text
//! score = base
//!       + ens_bonus                     (if a verified ENS name was ever bound)
//!       + min(successes * per_success, success_cap)
//!       + max(failures * per_failure, failure_cap_neg)
//!       - min(excess_events * penalty_per_excess_event, rate_penalty_max)
//! ```
//!
//! `excess_events` counts outcomes inside the rolling rate window above `rate_threshold`.
//! Success/failure counters are all-time.

use anyhow::{Result, bail};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scoring parameters. Validated once and handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Starting score for every address
    pub base: i32,
    /// Bonus once the address has bound a verified ENS name
    pub ens_bonus: i32,
    /// Points per successful verification
    pub per_success: i32,
    /// Ceiling on the success term
    pub success_cap: i32,
    /// Points per failed verification (negative)
    pub per_failure: i32,
    /// Floor on the failure term (negative)
    pub failure_cap_neg: i32,
    /// Width of the rolling event window
    pub rate_window_hours: u32,
    /// Events tolerated inside the window before penalties start
    pub rate_threshold: u32,
    /// Penalty per event above the threshold
    pub penalty_per_excess_event: i32,
    /// Ceiling on the rate penalty
    pub rate_penalty_max: i32,
    /// Score at or above which an address is trusted
    pub trusted_threshold: i32,
    /// Score below which an address is on probation
    pub probation_threshold: i32,
    /// Failure count at which an address is blocked regardless of score
    pub blocked_failure_count: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base: 50,
            ens_bonus: 20,
            per_success: 2,
            success_cap: 10,
            per_failure: -5,
            failure_cap_neg: -6,
            rate_window_hours: 24,
            rate_threshold: 20,
            penalty_per_excess_event: 1,
            rate_penalty_max: 20,
            trusted_threshold: 80,
            probation_threshold: 30,
            blocked_failure_count: 6,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        if self.per_success < 0 || self.success_cap < 0 {
            bail!("per_success and success_cap must be non-negative");
        }
        if self.per_failure > 0 {
            bail!("per_failure must be zero or negative, got {}", self.per_failure);
        }
        if self.failure_cap_neg > 0 {
            bail!(
                "failure_cap_neg is a floor and must be zero or negative, got {}",
                self.failure_cap_neg
            );
        }
        if self.rate_window_hours == 0 {
            bail!("rate_window_hours must be non-zero");
        }
        if self.penalty_per_excess_event < 0 || self.rate_penalty_max < 0 {
            bail!("rate penalties must be non-negative");
        }
        if self.probation_threshold > self.trusted_threshold {
            bail!(
                "probation_threshold ({}) must not exceed trusted_threshold ({})",
                self.probation_threshold,
                self.trusted_threshold
            );
        }
        if self.blocked_failure_count == 0 {
            bail!("blocked_failure_count must be non-zero");
        }
        Ok(())
    }

    pub fn rate_window(&self) -> Duration {
        Duration::hours(i64::from(self.rate_window_hours))
    }
}

/// Trust tier derived from score and failure history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReputationStatus {
    Blocked,
    Probation,
    Active,
    Trusted,
}

impl ReputationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReputationStatus::Blocked => "blocked",
            ReputationStatus::Probation => "probation",
            ReputationStatus::Active => "active",
            ReputationStatus::Trusted => "trusted",
        }
    }
}

impl fmt::Display for ReputationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReputationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blocked" => Ok(ReputationStatus::Blocked),
            "probation" => Ok(ReputationStatus::Probation),
            "active" => Ok(ReputationStatus::Active),
            "trusted" => Ok(ReputationStatus::Trusted),
            other => Err(format!("unknown reputation status: {}", other)),
        }
    }
}

/// A verification outcome attributed to an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { verified_ens: bool },
    Failure { reason: String },
}

impl Outcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        Outcome::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::Failure { .. } => "failure",
        }
    }
}

/// Everything the scoring law reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReputationHistory {
    pub success_count: u64,
    pub failure_count: u64,
    pub has_verified_ens: bool,
    /// Outcomes recorded inside the current rate window
    pub events_in_window: u64,
}

impl ReputationHistory {
    /// Fold one outcome into the cumulative counters
    pub fn apply(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Success { verified_ens } => {
                self.success_count = self.success_count.saturating_add(1);
                self.has_verified_ens |= *verified_ens;
            }
            Outcome::Failure { .. } => {
                self.failure_count = self.failure_count.saturating_add(1);
            }
        }
    }
}

/// Score and tier at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standing {
    pub score: i32,
    pub status: ReputationStatus,
}

fn count_as_i64(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// The scoring law. Pure; no clock, no storage.
pub fn evaluate(history: &ReputationHistory, config: &ScoringConfig) -> Standing {
    let ens_term = if history.has_verified_ens {
        i64::from(config.ens_bonus)
    } else {
        0
    };

    let success_term = count_as_i64(history.success_count)
        .saturating_mul(i64::from(config.per_success))
        .min(i64::from(config.success_cap));

    let failure_term = count_as_i64(history.failure_count)
        .saturating_mul(i64::from(config.per_failure))
        .max(i64::from(config.failure_cap_neg));

    let excess = history
        .events_in_window
        .saturating_sub(u64::from(config.rate_threshold));
    let rate_term = -count_as_i64(excess)
        .saturating_mul(i64::from(config.penalty_per_excess_event))
        .min(i64::from(config.rate_penalty_max));

    let total = i64::from(config.base)
        .saturating_add(ens_term)
        .saturating_add(success_term)
        .saturating_add(failure_term)
        .saturating_add(rate_term);
    let score = total.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;

    let status = if history.failure_count >= u64::from(config.blocked_failure_count) {
        ReputationStatus::Blocked
    } else if score >= config.trusted_threshold {
        ReputationStatus::Trusted
    } else if score < config.probation_threshold {
        ReputationStatus::Probation
    } else {
        ReputationStatus::Active
    };

    Standing { score, status }
}

/// Current reputation of one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationRecord {
    pub address: String,
    pub score: i32,
    pub status: ReputationStatus,
    pub success_count: u64,
    pub failure_count: u64,
    pub has_verified_ens: bool,
    pub events_in_window: u64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl ReputationRecord {
    pub fn from_history(
        address: &str,
        history: &ReputationHistory,
        config: &ScoringConfig,
        window_end: DateTime<Utc>,
    ) -> Self {
        let standing = evaluate(history, config);
        Self {
            address: address.to_string(),
            score: standing.score,
            status: standing.status,
            success_count: history.success_count,
            failure_count: history.failure_count,
            has_verified_ens: history.has_verified_ens,
            events_in_window: history.events_in_window,
            window_start: window_end - config.rate_window(),
            window_end,
        }
    }
}
