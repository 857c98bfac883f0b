use std::sync::Arc;

use crate::config::Config;
use crate::db::user_store::UserStore;
use crate::services::entitlements::EntitlementResolver;
use crate::services::identity::IdentityProvider;
use crate::services::stripe::StripeService;
use crate::services::usage::UsageLimiter;
use crate::utils::jwt::JwtKeys;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub stripe: Arc<dyn StripeService>,
    pub entitlements: Arc<EntitlementResolver>,
    pub limiter: Arc<UsageLimiter>,
    pub config: Arc<Config>,
    pub jwt_keys: Arc<JwtKeys>,
}
