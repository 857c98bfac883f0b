use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};

/// How long a persisted plan view is trusted before the resolver re-reads the
/// identity provider and writes through.
pub const SYNC_STALENESS: Duration = Duration::minutes(5);

/// One durable row per user, keyed by the identity provider's opaque id. The
/// identity provider owns a parallel copy of the plan tier in its metadata and
/// is authoritative during synchronization; this row is the fast path.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub email: String,
    pub plan_tier: Option<String>,
    pub subscription_status: Option<String>,
    pub subscription_id: Option<String>,
    pub subscription_ends_at: Option<OffsetDateTime>,
    pub last_synced_at: Option<OffsetDateTime>,
}

/// Per-user synchronization state between the identity provider and the user
/// table. `Synced` is only reachable through the resolver's write-through path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Unsynced,
    Synced,
    Stale,
}

impl SyncState {
    pub fn of(record: Option<&UserRecord>, now: OffsetDateTime) -> Self {
        match record.and_then(|r| r.last_synced_at) {
            None => SyncState::Unsynced,
            Some(ts) if now - ts > SYNC_STALENESS => SyncState::Stale,
            Some(_) => SyncState::Synced,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Unsynced => "unsynced",
            SyncState::Synced => "synced",
            SyncState::Stale => "stale",
        }
    }
}
