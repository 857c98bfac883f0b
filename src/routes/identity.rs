use axum::Json;
use axum::{extract::State, http::HeaderMap, response::IntoResponse, response::Response};
use tracing::{info, warn};

use crate::models::plan::PlanTier;
use crate::responses::JsonResponse;
use crate::state::AppState;
use crate::utils::webhook_sig::verify_webhook_signature;

fn received() -> Response {
    Json(serde_json::json!({ "received": true })).into_response()
}

// POST /api/identity/webhook
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let header = |name: &str| headers.get(name).and_then(|h| h.to_str().ok());
    let (Some(msg_id), Some(timestamp), Some(signature)) = (
        header("svix-id"),
        header("svix-timestamp"),
        header("svix-signature"),
    ) else {
        return JsonResponse::bad_request("Missing signature headers").into_response();
    };

    if let Err(err) = verify_webhook_signature(
        &state.config.identity.webhook_secret,
        msg_id,
        timestamp,
        &body,
        signature,
    ) {
        warn!(?err, "identity webhook verification failed");
        return JsonResponse::unauthorized("Invalid webhook signature").into_response();
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return JsonResponse::bad_request("Invalid payload").into_response(),
    };

    let event_type = payload["type"].as_str().unwrap_or_default();
    let Some(user_id) = payload["data"]["id"].as_str() else {
        return JsonResponse::bad_request("Missing user id").into_response();
    };

    match event_type {
        "user.created" => {
            // Seed the entry tier into metadata so client gating has a value
            // before the first resolution.
            if let Err(err) = state.identity.set_plan(user_id, PlanTier::Free).await {
                warn!(?err, user_id, "could not seed entry plan in identity metadata");
            }
            let view = state.entitlements.force_sync(user_id).await;
            info!(user_id, tier = view.tier.as_str(), "provisioned new user");
            received()
        }
        "user.updated" => {
            let view = state.entitlements.force_sync(user_id).await;
            info!(user_id, tier = view.tier.as_str(), "re-synced updated user");
            received()
        }
        other => {
            info!(event_type = other, "ignoring identity event");
            received()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testutil::TestHarness;
    use crate::services::identity::IdentityUser;
    use crate::utils::webhook_sig::sign_webhook;
    use axum::extract::State;
    use axum::http::StatusCode;

    fn signed_headers(harness: &TestHarness, body: &[u8]) -> HeaderMap {
        let secret = &harness.state.config.identity.webhook_secret;
        let sig = sign_webhook(secret, "msg_1", "1700000000", body).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("svix-id", "msg_1".parse().unwrap());
        headers.insert("svix-timestamp", "1700000000".parse().unwrap());
        headers.insert("svix-signature", sig.parse().unwrap());
        headers
    }

    fn event_body(event_type: &str, user_id: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": event_type,
            "data": { "id": user_id }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn missing_headers_are_a_bad_request() {
        let harness = TestHarness::new();
        let resp = webhook(
            State(harness.state.clone()),
            HeaderMap::new(),
            event_body("user.created", "user_1").into(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn bad_signature_is_unauthorized() {
        let harness = TestHarness::new();
        let body = event_body("user.created", "user_1");
        let mut headers = signed_headers(&harness, &body);
        headers.insert("svix-id", "msg_other".parse().unwrap());

        let resp = webhook(State(harness.state.clone()), headers, body.into()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn user_created_seeds_metadata_and_syncs() {
        let harness = TestHarness::new();
        harness.identity.set_user(IdentityUser {
            email: Some("a@b.co".into()),
            plan_id: Some("free".into()),
            subscriptions: vec![],
        });

        let body = event_body("user.created", "user_1");
        let headers = signed_headers(&harness, &body);
        let resp = webhook(State(harness.state.clone()), headers, body.into()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        assert_eq!(
            harness.identity.recorded_plan_writes(),
            vec![("user_1".to_string(), PlanTier::Free)]
        );
        let record = harness.users.get("user_1").unwrap();
        assert_eq!(record.plan_tier.as_deref(), Some("free"));
    }

    #[tokio::test]
    async fn user_updated_overwrites_the_cached_plan() {
        let harness = TestHarness::with_plan("user_1", "free", "active");
        harness.identity.set_user(IdentityUser {
            email: Some("a@b.co".into()),
            plan_id: Some("pro".into()),
            subscriptions: vec![],
        });

        let body = event_body("user.updated", "user_1");
        let headers = signed_headers(&harness, &body);
        let resp = webhook(State(harness.state.clone()), headers, body.into()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let record = harness.users.get("user_1").unwrap();
        assert_eq!(record.plan_tier.as_deref(), Some("pro"));
    }

    #[tokio::test]
    async fn unhandled_event_types_are_acknowledged() {
        let harness = TestHarness::new();
        let body = event_body("session.created", "user_1");
        let headers = signed_headers(&harness, &body);
        let resp = webhook(State(harness.state.clone()), headers, body.into()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
