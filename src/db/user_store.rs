use async_trait::async_trait;
use time::OffsetDateTime;

use crate::models::plan::{PlanTier, SubscriptionStatus};
use crate::models::user::UserRecord;

/// A payment-webhook mutation, applied through the entitlement resolver so
/// both write paths stamp the same sync metadata.
#[derive(Debug, Clone)]
pub struct BillingUpdate {
    pub user_id: String,
    pub email: Option<String>,
    pub tier: PlanTier,
    pub status: SubscriptionStatus,
    pub subscription_id: Option<String>,
    pub ends_at: Option<OffsetDateTime>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>, sqlx::Error>;

    /// Write-through from the resolver after a fresh identity-provider read.
    async fn upsert_synced(
        &self,
        user_id: &str,
        email: &str,
        tier: PlanTier,
        status: SubscriptionStatus,
        synced_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error>;

    async fn apply_billing_update(
        &self,
        update: &BillingUpdate,
        synced_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error>;

    async fn set_subscription_status(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
        synced_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error>;
}
