use axum::Json;
use axum::{extract::State, http::HeaderMap, response::IntoResponse};
use axum::{http::StatusCode, response::Response};
use tracing::{error, info, warn};

use crate::db::user_store::BillingUpdate;
use crate::models::plan::{PlanTier, SubscriptionStatus};
use crate::responses::JsonResponse;
use crate::state::AppState;

// Small helper: nested json lookup
fn jget<'a>(val: &'a serde_json::Value, path: &[&str]) -> Option<&'a serde_json::Value> {
    let mut cur = val;
    for key in path {
        cur = cur.get(*key)?;
    }
    Some(cur)
}

fn extract_str<'a>(val: &'a serde_json::Value, path: &[&str]) -> Option<&'a str> {
    jget(val, path)?.as_str()
}

fn received() -> Response {
    Json(serde_json::json!({ "received": true })).into_response()
}

fn extract_checkout_user_id(event: &serde_json::Value) -> Option<String> {
    // client_reference_id is set at session creation; metadata is the backup
    extract_str(event, &["data", "object", "client_reference_id"])
        .or_else(|| extract_str(event, &["data", "object", "metadata", "user_id"]))
        .map(str::to_string)
}

// POST /api/billing/webhook
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let sig = match headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        Some(s) => s,
        None => return JsonResponse::bad_request("Missing Stripe-Signature").into_response(),
    };

    let evt = match state.stripe.verify_webhook(&body, sig) {
        Ok(e) => e,
        Err(err) => {
            warn!(?err, "stripe webhook verification failed");
            return (StatusCode::BAD_REQUEST, "invalid webhook").into_response();
        }
    };

    let evt_type = evt.r#type.as_str();
    let payload = &evt.payload;

    match evt_type {
        // Primary success signal for checkout-based upgrades
        "checkout.session.completed" => {
            let Some(user_id) = extract_checkout_user_id(payload) else {
                warn!("checkout.session.completed without a user reference");
                return JsonResponse::bad_request("Missing user reference").into_response();
            };
            let Some(tier) = extract_str(payload, &["data", "object", "metadata", "plan_id"])
                .and_then(PlanTier::parse_known)
            else {
                warn!(user_id, "checkout.session.completed without a known plan");
                return JsonResponse::bad_request("Missing plan metadata").into_response();
            };

            let email = extract_str(payload, &["data", "object", "customer_details", "email"])
                .map(str::to_string);
            let subscription_id = extract_str(payload, &["data", "object", "subscription"])
                .or_else(|| extract_str(payload, &["data", "object", "customer"]))
                .map(str::to_string);

            let update = BillingUpdate {
                user_id: user_id.clone(),
                email,
                tier,
                status: SubscriptionStatus::Active,
                subscription_id,
                ends_at: None,
            };
            if let Err(err) = state.entitlements.apply_billing_update(&update).await {
                error!(?err, user_id, "failed to persist checkout completion");
                // 500 so the provider retries the event
                return JsonResponse::server_error("Could not apply update").into_response();
            }

            info!(user_id, plan = tier.as_str(), "checkout completed");
            received()
        }

        "customer.subscription.updated" => {
            let Some(user_id) = extract_str(payload, &["data", "object", "metadata", "user_id"])
            else {
                warn!("subscription.updated without user metadata");
                return JsonResponse::bad_request("Missing user metadata").into_response();
            };
            let status = SubscriptionStatus::parse(extract_str(
                payload,
                &["data", "object", "status"],
            ));

            if let Err(err) = state
                .entitlements
                .apply_subscription_status(user_id, status)
                .await
            {
                error!(?err, user_id, "failed to persist subscription update");
                return JsonResponse::server_error("Could not apply update").into_response();
            }
            received()
        }

        "customer.subscription.deleted" => {
            let Some(user_id) = extract_str(payload, &["data", "object", "metadata", "user_id"])
            else {
                warn!("subscription.deleted without user metadata");
                return JsonResponse::bad_request("Missing user metadata").into_response();
            };

            if let Err(err) = state
                .entitlements
                .apply_subscription_status(user_id, SubscriptionStatus::Canceled)
                .await
            {
                error!(?err, user_id, "failed to persist subscription deletion");
                return JsonResponse::server_error("Could not apply update").into_response();
            }
            received()
        }

        other => {
            info!(event_type = other, "ignoring stripe event");
            received()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testutil::TestHarness;
    use axum::extract::State;

    fn stripe_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Stripe-Signature", "t=1,v1=test".parse().unwrap());
        headers
    }

    fn checkout_completed_body(user_id: &str, plan: &str) -> axum::body::Bytes {
        serde_json::to_vec(&serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_1",
                "client_reference_id": user_id,
                "subscription": "sub_123",
                "customer_details": { "email": "a@b.co" },
                "metadata": { "user_id": user_id, "plan_id": plan }
            }}
        }))
        .unwrap()
        .into()
    }

    #[tokio::test]
    async fn missing_signature_header_is_a_bad_request() {
        let harness = TestHarness::new();
        let resp = webhook(
            State(harness.state.clone()),
            HeaderMap::new(),
            checkout_completed_body("user_1", "pro"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejected_signature_is_a_bad_request_without_mutation() {
        let harness = TestHarness::new();
        harness.stripe.reject_webhooks(true);

        let resp = webhook(
            State(harness.state.clone()),
            stripe_headers(),
            checkout_completed_body("user_1", "pro"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(harness.users.get("user_1").is_none());
    }

    #[tokio::test]
    async fn checkout_completion_upgrades_the_user() {
        let harness = TestHarness::new();
        let resp = webhook(
            State(harness.state.clone()),
            stripe_headers(),
            checkout_completed_body("user_1", "pro"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let record = harness.users.get("user_1").unwrap();
        assert_eq!(record.plan_tier.as_deref(), Some("pro"));
        assert_eq!(record.subscription_status.as_deref(), Some("active"));
        assert_eq!(record.subscription_id.as_deref(), Some("sub_123"));
        assert_eq!(record.email, "a@b.co");

        // the resolved tier is pushed back into identity metadata
        assert_eq!(
            harness.identity.recorded_plan_writes(),
            vec![("user_1".to_string(), crate::models::plan::PlanTier::Pro)]
        );

        // and resolution now trusts the freshly stamped row
        let view = harness.state.entitlements.resolve_plan("user_1").await;
        assert_eq!(view.tier, crate::models::plan::PlanTier::Pro);
        assert!(view.status.is_active());
    }

    #[tokio::test]
    async fn checkout_without_user_reference_is_rejected_without_mutation() {
        let harness = TestHarness::new();
        let body: axum::body::Bytes = serde_json::to_vec(&serde_json::json!({
            "id": "evt_2",
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_test_2", "metadata": { "plan_id": "pro" } } }
        }))
        .unwrap()
        .into();

        let resp = webhook(State(harness.state.clone()), stripe_headers(), body).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(harness.users.get("user_1").is_none());
    }

    #[tokio::test]
    async fn store_failure_returns_500_so_the_provider_retries() {
        let harness = TestHarness::new();
        harness.users.fail_next(true);

        let resp = webhook(
            State(harness.state.clone()),
            stripe_headers(),
            checkout_completed_body("user_1", "pro"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn subscription_deletion_marks_the_user_canceled() {
        let harness = TestHarness::new();
        webhook(
            State(harness.state.clone()),
            stripe_headers(),
            checkout_completed_body("user_1", "pro"),
        )
        .await;

        let body: axum::body::Bytes = serde_json::to_vec(&serde_json::json!({
            "id": "evt_3",
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": "sub_123", "metadata": { "user_id": "user_1" } } }
        }))
        .unwrap()
        .into();
        let resp = webhook(State(harness.state.clone()), stripe_headers(), body).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let record = harness.users.get("user_1").unwrap();
        assert_eq!(record.subscription_status.as_deref(), Some("canceled"));
    }

    #[tokio::test]
    async fn subscription_events_without_user_metadata_are_rejected() {
        let harness = TestHarness::new();

        for event_type in ["customer.subscription.updated", "customer.subscription.deleted"] {
            let body: axum::body::Bytes = serde_json::to_vec(&serde_json::json!({
                "id": "evt_5",
                "type": event_type,
                "data": { "object": { "id": "sub_123", "status": "past_due" } }
            }))
            .unwrap()
            .into();

            let resp = webhook(State(harness.state.clone()), stripe_headers(), body).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{event_type}");
        }
        assert!(harness.users.get("user_1").is_none());
    }

    #[tokio::test]
    async fn unhandled_event_types_are_acknowledged() {
        let harness = TestHarness::new();
        let body: axum::body::Bytes = serde_json::to_vec(&serde_json::json!({
            "id": "evt_4",
            "type": "invoice.paid",
            "data": { "object": {} }
        }))
        .unwrap()
        .into();

        let resp = webhook(State(harness.state.clone()), stripe_headers(), body).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
