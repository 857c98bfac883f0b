use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::models::plan::PlanTier;
use crate::services::identity::{
    IdentityError, IdentityProvider, IdentitySubscription, IdentityUser,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Clerk-style REST client. All calls are short-timeout so a slow provider
/// degrades a single resolution instead of wedging request handlers.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpIdentityProvider {
    pub fn new(base_url: String, secret_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url,
            secret_key,
        }
    }

    fn user_url(&self, user_id: &str) -> String {
        format!("{}/v1/users/{}", self.base_url.trim_end_matches('/'), user_id)
    }
}

fn parse_identity_user(body: &Value) -> IdentityUser {
    let email = body["email_addresses"]
        .as_array()
        .and_then(|addrs| addrs.first())
        .and_then(|a| a["email_address"].as_str())
        .map(str::to_string);

    let metadata = &body["public_metadata"];
    let plan_id = metadata["plan_id"].as_str().map(str::to_string);

    let subscriptions = metadata["subscriptions"]
        .as_array()
        .map(|subs| {
            subs.iter()
                .filter_map(|s| {
                    Some(IdentitySubscription {
                        plan: s["plan"].as_str()?.to_string(),
                        status: s["status"].as_str().unwrap_or("active").to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    IdentityUser {
        email,
        plan_id,
        subscriptions,
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn fetch_user(&self, user_id: &str) -> Result<IdentityUser, IdentityError> {
        let response = self
            .client
            .get(self.user_url(user_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IdentityError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| IdentityError::Decode(e.to_string()))?;

        debug!(user_id, "fetched identity user");
        Ok(parse_identity_user(&body))
    }

    async fn set_plan(&self, user_id: &str, tier: PlanTier) -> Result<(), IdentityError> {
        let response = self
            .client
            .patch(format!("{}/metadata", self.user_url(user_id)))
            .bearer_auth(&self.secret_key)
            .json(&json!({
                "public_metadata": { "plan_id": tier.as_str() }
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IdentityError::Status(status.as_u16()));
        }

        debug!(user_id, tier = tier.as_str(), "pushed plan to identity metadata");
        Ok(())
    }
}
