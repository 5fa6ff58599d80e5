//! Per-user energy, xp and level
//!
//! Every mutating operation is a single conditional statement in the
//! backing store so concurrent requests for the same user can neither
//! overdraw energy nor lose an xp grant.

mod sqlite;

pub use sqlite::SqliteProgressionLedger;

use async_trait::async_trait;
use bilingo_common::models::ProgressionState;
use bilingo_common::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of an xp grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XpGrant {
    pub state: ProgressionState,
    pub leveled_up: bool,
}

#[async_trait]
pub trait ProgressionLedger: Send + Sync {
    /// Create the user's state with configured defaults unless it already exists
    async fn provision(&self, user_id: &str) -> Result<ProgressionState>;

    /// Current state, `NotFound` for unknown users
    async fn snapshot(&self, user_id: &str) -> Result<ProgressionState>;

    async fn can_afford(&self, user_id: &str) -> Result<bool> {
        Ok(self.snapshot(user_id).await?.can_afford())
    }

    /// Conditional `energy -= amount`; `InsufficientEnergy` leaves the state unchanged
    async fn consume(&self, user_id: &str, amount: i64) -> Result<ProgressionState>;

    /// `xp += amount`, levelling up once the threshold is reached
    ///
    /// A level-up raises the level by one, grows max energy and resets xp
    /// to 0. Any xp past the threshold is discarded.
    async fn grant_xp(&self, user_id: &str, amount: i64) -> Result<XpGrant>;

    /// Refill energy unless the last recharge happened on the UTC day of `now`
    ///
    /// Returns whether a recharge took place.
    async fn recharge_if_new_day(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool>;
}
