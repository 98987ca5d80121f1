#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pipeline stage, commit policy, and run report types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use efficiency_index_appliance_models::Category;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Stages a category passes through, in order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    /// Downloading raw records from the upstream dataset
    Fetching,
    /// Projecting raw records onto the normalized schema
    Normalizing,
    /// Computing category-relative scores and percentiles
    Scoring,
    /// Pricing energy use and emissions per region
    ComputingRegionalImpact,
    /// Written to a published snapshot
    Persisted,
}

impl Stage {
    /// The stage that follows this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Fetching => Some(Self::Normalizing),
            Self::Normalizing => Some(Self::Scoring),
            Self::Scoring => Some(Self::ComputingRegionalImpact),
            Self::ComputingRegionalImpact => Some(Self::Persisted),
            Self::Persisted => None,
        }
    }
}

/// A transition the state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition from {from} to {to}")]
pub struct TransitionError {
    /// State the category was in.
    pub from: String,
    /// State that was requested.
    pub to: String,
}

/// Where a category's run currently stands.
///
/// Starts at [`Stage::Fetching`] and only ever moves one stage forward.
/// `Failed` can be entered from any stage before `Persisted`; both are
/// terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CategoryState {
    /// Running (or finished) the given stage.
    Active {
        /// Current stage.
        stage: Stage,
    },
    /// Aborted with an unrecoverable error.
    Failed {
        /// Stage that was running when the error happened.
        stage: Stage,
        /// Human-readable cause.
        reason: String,
    },
}

impl std::fmt::Display for CategoryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active { stage } => write!(f, "{stage}"),
            Self::Failed { stage, .. } => write!(f, "failed during {stage}"),
        }
    }
}

impl Default for CategoryState {
    fn default() -> Self {
        Self::Active {
            stage: Stage::Fetching,
        }
    }
}

impl CategoryState {
    /// Current stage, or the stage that failed.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Active { stage } | Self::Failed { stage, .. } => *stage,
        }
    }

    /// `true` once the category has failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// `true` for `Persisted` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Failed { .. }
                | Self::Active {
                    stage: Stage::Persisted
                }
        )
    }

    /// Moves to `to`, which must be the next stage.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if `to` is not the immediate successor
    /// or the category already failed.
    pub fn advance(&mut self, to: Stage) -> Result<(), TransitionError> {
        match self {
            Self::Active { stage } if stage.next() == Some(to) => {
                *stage = to;
                Ok(())
            }
            _ => Err(TransitionError {
                from: self.to_string(),
                to: to.to_string(),
            }),
        }
    }

    /// Marks the category failed in its current stage.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the category is already terminal.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError {
                from: self.to_string(),
                to: "failed".to_string(),
            });
        }
        *self = Self::Failed {
            stage: self.stage(),
            reason: reason.into(),
        };
        Ok(())
    }
}

/// When a run publishes a new snapshot.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommitPolicy {
    /// Publish only if every requested category succeeded.
    #[default]
    AllOrNothing,
    /// Publish whichever categories succeeded.
    SucceededOnly,
}

impl CommitPolicy {
    /// Decides whether a run with these outcomes publishes.
    ///
    /// A run with no successful category never publishes.
    #[must_use]
    pub const fn should_commit(self, succeeded: usize, failed: usize) -> bool {
        if succeeded == 0 {
            return false;
        }
        match self {
            Self::AllOrNothing => failed == 0,
            Self::SucceededOnly => true,
        }
    }
}

/// Counters and outcome for one category in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryReport {
    /// Category.
    pub category: Category,
    /// Upstream dataset name.
    pub source: String,
    /// Final state.
    pub state: CategoryState,
    /// Raw records downloaded.
    pub fetched: u64,
    /// Records that normalized cleanly.
    pub normalized: u64,
    /// Records that scored cleanly and reached the catalog.
    pub scored: u64,
    /// Dropped records per reason code.
    pub dropped: BTreeMap<String, u64>,
    /// Wall-clock time spent on the category, in milliseconds.
    pub elapsed_ms: u64,
}

impl CategoryReport {
    /// A fresh report at the first stage.
    #[must_use]
    pub fn new(category: Category, source: impl Into<String>) -> Self {
        Self {
            category,
            source: source.into(),
            state: CategoryState::default(),
            fetched: 0,
            normalized: 0,
            scored: 0,
            dropped: BTreeMap::new(),
            elapsed_ms: 0,
        }
    }

    /// Counts one dropped record.
    pub fn record_drop(&mut self, reason: &str) {
        *self.dropped.entry(reason.to_string()).or_insert(0) += 1;
    }

    /// Total dropped records across all reasons.
    #[must_use]
    pub fn total_dropped(&self) -> u64 {
        self.dropped.values().sum()
    }

    /// `true` if the category produced output that can be published.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        !self.state.is_failed()
    }
}

/// Everything one pipeline run did, persisted next to its snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Policy the run was configured with.
    pub commit_policy: CommitPolicy,
    /// Whether a snapshot was published.
    pub committed: bool,
    /// Id of the published snapshot.
    pub snapshot_id: Option<String>,
    /// Whether the run was cancelled before finishing.
    pub cancelled: bool,
    /// Threshold table version used.
    pub thresholds_version: String,
    /// Region table version used.
    pub regions_version: String,
    /// Per-category reports, in category order.
    pub categories: Vec<CategoryReport>,
}

impl RunReport {
    /// Reports for categories that succeeded.
    pub fn succeeded(&self) -> impl Iterator<Item = &CategoryReport> {
        self.categories.iter().filter(|c| c.succeeded())
    }

    /// Reports for categories that failed.
    pub fn failed(&self) -> impl Iterator<Item = &CategoryReport> {
        self.categories.iter().filter(|c| !c.succeeded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_every_stage_in_order() {
        let mut state = CategoryState::default();
        let mut stage = Stage::Fetching;
        while let Some(next) = stage.next() {
            state.advance(next).unwrap();
            stage = next;
        }
        assert_eq!(state.stage(), Stage::Persisted);
        assert!(state.is_terminal());
        assert!(!state.is_failed());
    }

    #[test]
    fn rejects_skipped_and_backward_transitions() {
        let mut state = CategoryState::default();
        assert!(state.advance(Stage::Scoring).is_err());
        state.advance(Stage::Normalizing).unwrap();
        assert!(state.advance(Stage::Fetching).is_err());
        assert!(state.advance(Stage::Normalizing).is_err());
    }

    #[test]
    fn failure_is_terminal_and_keeps_the_stage() {
        let mut state = CategoryState::default();
        state.fail("upstream unreachable").unwrap();
        assert_eq!(
            state,
            CategoryState::Failed {
                stage: Stage::Fetching,
                reason: "upstream unreachable".to_string(),
            }
        );
        assert!(state.advance(Stage::Normalizing).is_err());
        assert!(state.fail("again").is_err());
    }

    #[test]
    fn persisted_cannot_fail() {
        let mut state = CategoryState::Active {
            stage: Stage::Persisted,
        };
        assert!(state.fail("late").is_err());
    }

    #[test]
    fn commit_policy_decisions() {
        assert!(CommitPolicy::AllOrNothing.should_commit(4, 0));
        assert!(!CommitPolicy::AllOrNothing.should_commit(3, 1));
        assert!(CommitPolicy::SucceededOnly.should_commit(3, 1));
        assert!(!CommitPolicy::SucceededOnly.should_commit(0, 4));
        assert_eq!(CommitPolicy::default(), CommitPolicy::AllOrNothing);
        assert_eq!(
            "succeeded_only".parse::<CommitPolicy>().unwrap(),
            CommitPolicy::SucceededOnly
        );
    }

    #[test]
    fn state_serializes_with_tag() {
        let failed = CategoryState::Failed {
            stage: Stage::Scoring,
            reason: "boom".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({"state": "failed", "stage": "scoring", "reason": "boom"})
        );
    }

    #[test]
    fn report_counts_drops_by_reason() {
        let mut report = CategoryReport::new(Category::Dishwashers, "ENERGY STAR Dishwashers");
        report.record_drop("missing_field");
        report.record_drop("missing_field");
        report.record_drop("zero_capacity");
        assert_eq!(report.total_dropped(), 3);
        assert_eq!(report.dropped["missing_field"], 2);
        assert!(report.succeeded());
    }
}
