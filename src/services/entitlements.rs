use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::db::user_store::{BillingUpdate, UserStore};
use crate::models::plan::{PlanTier, PlanView, SubscriptionStatus};
use crate::models::user::SyncState;
use crate::services::identity::{IdentityProvider, IdentityUser};

/// Resolves a user's effective plan. The identity provider is authoritative;
/// the user table is a write-through cache trusted for a short staleness
/// window. Resolution never fails: any error on the way degrades to the entry
/// tier so metering stays available.
pub struct EntitlementResolver {
    identity: Arc<dyn IdentityProvider>,
    users: Arc<dyn UserStore>,
}

/// Picks the tier an identity-provider user is entitled to. An explicit
/// plan id in metadata wins; otherwise the highest-ranked active
/// subscription; otherwise the entry tier.
pub fn resolve_identity_plan(user: &IdentityUser) -> (PlanTier, SubscriptionStatus) {
    if let Some(tier) = user
        .plan_id
        .as_deref()
        .and_then(PlanTier::parse_known)
    {
        return (tier, SubscriptionStatus::Active);
    }

    let best = user
        .subscriptions
        .iter()
        .filter(|s| SubscriptionStatus::parse(Some(&s.status)).is_active())
        .filter_map(|s| PlanTier::parse_known(&s.plan))
        .max_by_key(PlanTier::rank);

    match best {
        Some(tier) => (tier, SubscriptionStatus::Active),
        None => (PlanTier::Free, SubscriptionStatus::Active),
    }
}

impl EntitlementResolver {
    pub fn new(identity: Arc<dyn IdentityProvider>, users: Arc<dyn UserStore>) -> Self {
        Self { identity, users }
    }

    /// The main entry point for request handlers. Trusts a fresh row,
    /// otherwise re-reads the identity provider and writes through.
    pub async fn resolve_plan(&self, user_id: &str) -> PlanView {
        if user_id.is_empty() {
            warn!("plan resolution requested for empty user id");
            return PlanView::entry();
        }

        let record = match self.users.find_user(user_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(user_id, error = %e, "user lookup failed, resolving from identity only");
                None
            }
        };

        let now = OffsetDateTime::now_utc();
        if let Some(ref record) = record {
            if SyncState::of(Some(record), now) == SyncState::Synced {
                return PlanView::from_record(record);
            }
        }

        self.sync_from_identity(user_id).await
    }

    /// Re-syncs unconditionally, ignoring the staleness window. Identity
    /// webhooks use this so a metadata change lands before the next read.
    pub async fn force_sync(&self, user_id: &str) -> PlanView {
        self.sync_from_identity(user_id).await
    }

    async fn sync_from_identity(&self, user_id: &str) -> PlanView {
        let identity_user = match self.identity.fetch_user(user_id).await {
            Ok(user) => user,
            Err(e) => {
                // A stale row is not trusted here: once the record needs a
                // re-sync, a provider outage drops the user to the entry
                // tier rather than extending an unverified paid tier.
                warn!(user_id, error = %e, "identity fetch failed, degrading to entry tier");
                return PlanView::entry();
            }
        };

        let (tier, status) = resolve_identity_plan(&identity_user);
        let email = identity_user.email.as_deref().unwrap_or_default();

        // Write-through is best effort. A failed write only costs us the
        // cache: the view we resolved is still correct for this request.
        if let Err(e) = self
            .users
            .upsert_synced(user_id, email, tier, status, OffsetDateTime::now_utc())
            .await
        {
            warn!(user_id, error = %e, "plan write-through failed");
        }

        PlanView::new(tier, status)
    }

    /// Applies a payment-webhook change. The store write is the one that must
    /// succeed so the provider retries on failure; pushing the tier back into
    /// identity metadata is best effort.
    pub async fn apply_billing_update(&self, update: &BillingUpdate) -> Result<(), sqlx::Error> {
        self.users
            .apply_billing_update(update, OffsetDateTime::now_utc())
            .await?;

        if let Err(e) = self.identity.set_plan(&update.user_id, update.tier).await {
            warn!(user_id = %update.user_id, error = %e, "plan push to identity failed");
        }

        info!(
            user_id = %update.user_id,
            tier = update.tier.as_str(),
            status = update.status.as_str(),
            "applied billing update"
        );
        Ok(())
    }

    pub async fn apply_subscription_status(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
    ) -> Result<(), sqlx::Error> {
        self.users
            .set_subscription_status(user_id, status, OffsetDateTime::now_utc())
            .await?;

        info!(user_id, status = status.as_str(), "applied subscription status");
        Ok(())
    }
}
