//! # Goal Progress
//!
//! The read model behind the streaming overlay: how far a tenant's running
//! total has come toward its fundraising goal.

use serde::{Deserialize, Serialize};

use crate::payment::{DonationRecord, RunningTotal};

/// Number of most recent donations carried in [`Progress::recent`].
pub const RECENT_DONATIONS: usize = 5;

/// Default goal title shown on a fresh overlay.
pub const DEFAULT_GOAL_TITLE: &str = "斗內目標";

/// Default goal amount for a fresh tenant.
pub const DEFAULT_GOAL_AMOUNT: i64 = 1000;

/// A tenant's fundraising goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub title: String,
    pub amount: i64,
    /// Offset added to the ledger total, for campaigns that began elsewhere.
    #[serde(default)]
    pub start_from: i64,
}

impl Default for Goal {
    fn default() -> Self {
        Self {
            title: DEFAULT_GOAL_TITLE.to_string(),
            amount: DEFAULT_GOAL_AMOUNT,
            start_from: 0,
        }
    }
}

/// Snapshot pushed to overlays and returned by the progress endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub title: String,
    pub current: i64,
    pub goal: i64,
    pub percent: u8,
    pub donation_count: u64,
    /// Newest last.
    pub recent: Vec<DonationRecord>,
}

impl Progress {
    /// Compute progress from the goal, the running total and the recent
    /// records (any order; the newest [`RECENT_DONATIONS`] are kept).
    pub fn compute(goal: &Goal, total: RunningTotal, mut recent: Vec<DonationRecord>) -> Self {
        let current = goal.start_from.saturating_add(total.total_amount);
        recent.sort_by(|a, b| a.applied_at.cmp(&b.applied_at));
        let skip = recent.len().saturating_sub(RECENT_DONATIONS);
        recent.drain(..skip);

        Self {
            title: goal.title.clone(),
            current,
            goal: goal.amount,
            percent: percent(current, goal.amount),
            donation_count: total.donation_count,
            recent,
        }
    }
}

/// `min(100, round(current / goal * 100))`, or 0 for a non-positive goal.
fn percent(current: i64, goal: i64) -> u8 {
    if goal <= 0 || current <= 0 {
        return 0;
    }
    let pct = (current as f64 / goal as f64 * 100.0).round();
    pct.min(100.0) as u8
}
