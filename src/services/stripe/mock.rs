use super::{
    CheckoutSession, CreateCheckoutSessionRequest, StripeEvent, StripeService, StripeServiceError,
    SubscriptionInfo,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Default)]
pub struct MockStripeService {
    pub last_create_requests: Arc<Mutex<Vec<CreateCheckoutSessionRequest>>>,
    pub active_subscription: Arc<Mutex<Option<SubscriptionInfo>>>,
    pub reject_webhooks: Arc<Mutex<bool>>,
}

impl MockStripeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_webhooks(&self, reject: bool) {
        *self.reject_webhooks.lock().unwrap() = reject;
    }
}

fn make_id(prefix: &str) -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{}_{}", prefix, ts)
}

#[async_trait]
impl StripeService for MockStripeService {
    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError> {
        // capture the request
        self.last_create_requests.lock().unwrap().push(req.clone());

        // synthesize a session
        Ok(CheckoutSession {
            id: make_id("cs_test"),
            url: Some("https://example.test/checkout".into()),
        })
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        _signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError> {
        if *self.reject_webhooks.lock().unwrap() {
            return Err(StripeServiceError::Webhook("signature rejected".into()));
        }
        let val: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        let id = match val.get("id").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => make_id("evt"),
        };
        let ty = val
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        Ok(StripeEvent {
            id,
            r#type: ty,
            payload: val,
        })
    }

    async fn set_subscription_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> Result<SubscriptionInfo, StripeServiceError> {
        let mut guard = self.active_subscription.lock().unwrap();
        let mut sub = guard.clone().unwrap_or(SubscriptionInfo {
            id: subscription_id.to_string(),
            status: "active".into(),
            current_period_end: 0,
            cancel_at: None,
            cancel_at_period_end: false,
        });
        sub.cancel_at_period_end = cancel_at_period_end;
        if cancel_at_period_end && sub.cancel_at.is_none() && sub.current_period_end > 0 {
            sub.cancel_at = Some(sub.current_period_end);
        }
        *guard = Some(sub.clone());
        Ok(sub)
    }
}
