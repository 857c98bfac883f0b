pub mod live;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::plan::PlanTier;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("identity provider returned status {0}")]
    Status(u16),
    #[error("could not decode identity response: {0}")]
    Decode(String),
}

/// Billing-relevant slice of an identity-provider user. The provider keeps the
/// plan in public metadata; subscriptions are the fallback when no explicit
/// plan id has been written yet.
#[derive(Debug, Clone, Default)]
pub struct IdentityUser {
    pub email: Option<String>,
    pub plan_id: Option<String>,
    pub subscriptions: Vec<IdentitySubscription>,
}

#[derive(Debug, Clone)]
pub struct IdentitySubscription {
    pub plan: String,
    pub status: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn fetch_user(&self, user_id: &str) -> Result<IdentityUser, IdentityError>;

    /// Writes the resolved tier back into the provider's user metadata so
    /// client-side gating sees the same plan the backend resolved.
    async fn set_plan(&self, user_id: &str, tier: PlanTier) -> Result<(), IdentityError>;
}
