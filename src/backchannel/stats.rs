use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::backchannel::types::UserId;
use crate::backchannel::Backchannel;

/// One observation in an append-only counter series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsPoint {
    pub count: u64,
    /// Unix seconds.
    pub time_stamp: i64,
}

/// A user's activity series plus their involvement rate at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub channels_joined: Vec<StatsPoint>,
    pub dms_joined: Vec<StatsPoint>,
    pub messages_sent: Vec<StatsPoint>,
    pub involvement_rate: f64,
}

/// Workspace-wide series plus the utilization rate at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceStats {
    pub channels_exist: Vec<StatsPoint>,
    pub dms_exist: Vec<StatsPoint>,
    pub messages_exist: Vec<StatsPoint>,
    pub utilization_rate: f64,
}

/// Timestamped counter. Every relevant event appends a new point; history
/// is never rewritten.
#[derive(Debug, Clone)]
pub(crate) struct Series {
    points: Vec<StatsPoint>,
}

impl Series {
    fn new(at: DateTime<Utc>) -> Self {
        Self {
            points: vec![StatsPoint {
                count: 0,
                time_stamp: at.timestamp(),
            }],
        }
    }

    fn latest(&self) -> u64 {
        self.points.last().map_or(0, |p| p.count)
    }

    fn bump(&mut self, at: DateTime<Utc>) {
        self.points.push(StatsPoint {
            count: self.latest() + 1,
            time_stamp: at.timestamp(),
        });
    }

    fn drop_one(&mut self, at: DateTime<Utc>) {
        self.points.push(StatsPoint {
            count: self.latest().saturating_sub(1),
            time_stamp: at.timestamp(),
        });
    }

    fn points(&self) -> Vec<StatsPoint> {
        self.points.clone()
    }
}

#[derive(Debug, Clone)]
struct UserSeries {
    channels_joined: Series,
    dms_joined: Series,
    messages_sent: Series,
}

impl UserSeries {
    fn new(at: DateTime<Utc>) -> Self {
        Self {
            channels_joined: Series::new(at),
            dms_joined: Series::new(at),
            messages_sent: Series::new(at),
        }
    }

    fn latest_total(&self) -> u64 {
        self.channels_joined.latest() + self.dms_joined.latest() + self.messages_sent.latest()
    }
}

/// Append-only usage counters, per user and workspace-wide.
///
/// Per-user series never decrease — leaving a container or losing a message
/// leaves them untouched. The workspace `messages_exist` series is the one
/// deliberate exception: permanent removal appends a decreasing point.
#[derive(Debug)]
pub(crate) struct StatsLedger {
    created_at: DateTime<Utc>,
    users: HashMap<UserId, UserSeries>,
    channels_exist: Series,
    dms_exist: Series,
    messages_exist: Series,
}

impl StatsLedger {
    pub(crate) fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            users: HashMap::new(),
            channels_exist: Series::new(now),
            dms_exist: Series::new(now),
            messages_exist: Series::new(now),
        }
    }

    fn user_mut(&mut self, user: UserId, at: DateTime<Utc>) -> &mut UserSeries {
        self.users.entry(user).or_insert_with(|| UserSeries::new(at))
    }

    pub(crate) fn ensure_user(&mut self, user: UserId, at: DateTime<Utc>) {
        self.user_mut(user, at);
    }

    pub(crate) fn record_channel_joined(&mut self, user: UserId, at: DateTime<Utc>) {
        self.user_mut(user, at).channels_joined.bump(at);
    }

    pub(crate) fn record_dm_joined(&mut self, user: UserId, at: DateTime<Utc>) {
        self.user_mut(user, at).dms_joined.bump(at);
    }

    pub(crate) fn record_message_sent(&mut self, user: UserId, at: DateTime<Utc>) {
        self.user_mut(user, at).messages_sent.bump(at);
    }

    pub(crate) fn record_channel_created(&mut self, at: DateTime<Utc>) {
        self.channels_exist.bump(at);
    }

    pub(crate) fn record_dm_created(&mut self, at: DateTime<Utc>) {
        self.dms_exist.bump(at);
    }

    pub(crate) fn record_message_created(&mut self, at: DateTime<Utc>) {
        self.messages_exist.bump(at);
    }

    pub(crate) fn record_message_removed(&mut self, at: DateTime<Utc>) {
        self.messages_exist.drop_one(at);
    }

    fn workspace_total(&self) -> u64 {
        self.channels_exist.latest() + self.dms_exist.latest() + self.messages_exist.latest()
    }

    fn user_stats(&self, user: UserId) -> UserStats {
        let fallback = UserSeries::new(self.created_at);
        let series = self.users.get(&user).unwrap_or(&fallback);

        let denominator = self.workspace_total();
        let involvement_rate = if denominator == 0 {
            0.0
        } else {
            (series.latest_total() as f64 / denominator as f64).min(1.0)
        };

        UserStats {
            channels_joined: series.channels_joined.points(),
            dms_joined: series.dms_joined.points(),
            messages_sent: series.messages_sent.points(),
            involvement_rate,
        }
    }

    fn workspace_stats(&self, utilization_rate: f64) -> WorkspaceStats {
        WorkspaceStats {
            channels_exist: self.channels_exist.points(),
            dms_exist: self.dms_exist.points(),
            messages_exist: self.messages_exist.points(),
            utilization_rate,
        }
    }
}

impl Backchannel {
    /// Seeds zeroed series for a freshly registered user, stamped at
    /// registration time.
    pub async fn record_user_registered(&self, user_id: UserId) {
        let mut state = self.state.write().await;
        state.stats.ensure_user(user_id, Utc::now());
    }

    /// Records a channel creation: the workspace gains a channel and the
    /// creator's `channels_joined` gains a point.
    pub async fn record_channel_created(&self, creator_id: UserId) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        state.stats.record_channel_created(now);
        state.stats.record_channel_joined(creator_id, now);
    }

    /// Records a user entering a channel, by join or by invite.
    pub async fn record_channel_joined(&self, user_id: UserId) {
        let mut state = self.state.write().await;
        state.stats.record_channel_joined(user_id, Utc::now());
    }

    /// Records a DM creation. `member_ids` is the full member set including
    /// the creator; every member's `dms_joined` gains a point.
    pub async fn record_dm_created(&self, member_ids: &[UserId]) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        state.stats.record_dm_created(now);
        for &member in member_ids {
            state.stats.record_dm_joined(member, now);
        }
    }

    /// The user's activity series and involvement rate.
    pub async fn user_stats(&self, user_id: UserId) -> UserStats {
        let state = self.state.read().await;
        state.stats.user_stats(user_id)
    }

    /// The workspace series and utilization rate. Membership is looked up
    /// live through the directory, outside the engine lock.
    pub async fn workspace_stats(&self) -> WorkspaceStats {
        let users = self.directory.registered_users().await;
        let memberships = join_all(users.iter().map(|&user| async move {
            !self.directory.channels_of(user).await.is_empty()
                || !self.directory.dms_of(user).await.is_empty()
        }))
        .await;

        let active = memberships.iter().filter(|&&in_any| in_any).count();
        let utilization_rate = if users.is_empty() {
            0.0
        } else {
            active as f64 / users.len() as f64
        };

        let state = self.state.read().await;
        state.stats.workspace_stats(utilization_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_starts_at_zero_and_appends() {
        let now = Utc::now();
        let mut series = Series::new(now);
        assert_eq!(series.latest(), 0);

        series.bump(now);
        series.bump(now);
        assert_eq!(series.latest(), 2);
        assert_eq!(series.points().len(), 3);
        assert_eq!(series.points()[0].count, 0);
    }

    #[test]
    fn test_drop_one_appends_a_decreasing_point() {
        let now = Utc::now();
        let mut series = Series::new(now);
        series.bump(now);
        series.drop_one(now);

        let points = series.points();
        assert_eq!(points.len(), 3);
        assert_eq!(points.last().unwrap().count, 0);

        // History stays intact; removal only appends.
        assert_eq!(points[1].count, 1);
    }

    #[test]
    fn test_removal_asymmetry_between_user_and_workspace() {
        let mut ledger = StatsLedger::new();
        let now = Utc::now();

        ledger.record_message_sent(1, now);
        ledger.record_message_created(now);
        ledger.record_message_removed(now);

        let stats = ledger.user_stats(1);
        assert_eq!(stats.messages_sent.last().unwrap().count, 1);
        assert_eq!(ledger.messages_exist.latest(), 0);
    }

    #[test]
    fn test_involvement_rate_caps_at_one_and_handles_empty_workspace() {
        let mut ledger = StatsLedger::new();
        assert_eq!(ledger.user_stats(1).involvement_rate, 0.0);

        let now = Utc::now();
        ledger.record_channel_created(now);
        ledger.record_channel_joined(1, now);
        // Messages sent by user 1 that were later removed push the user's
        // numerator above the shrunk workspace denominator.
        ledger.record_message_sent(1, now);
        ledger.record_message_created(now);
        ledger.record_message_removed(now);

        assert_eq!(ledger.user_stats(1).involvement_rate, 1.0);
    }

    #[test]
    fn test_unknown_user_reads_zero_series() {
        let ledger = StatsLedger::new();
        let stats = ledger.user_stats(42);
        assert_eq!(stats.messages_sent.len(), 1);
        assert_eq!(stats.messages_sent[0].count, 0);
        assert_eq!(stats.involvement_rate, 0.0);
    }
}
