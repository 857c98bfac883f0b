use axum::{extract::State, http::HeaderMap, response::IntoResponse, response::Response, Json};
use serde::Deserialize;
use tracing::{error, info};

use crate::models::plan::PlanTier;
use crate::responses::JsonResponse;
use crate::routes::auth::authenticated_user;
use crate::services::stripe::CreateCheckoutSessionRequest;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_id: String,
}

// POST /api/billing/checkout-session
pub async fn create_checkout_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> Response {
    let Some(claims) = authenticated_user(&state, &headers) else {
        return JsonResponse::unauthorized("Sign in to upgrade").into_response();
    };

    let Some(tier) = PlanTier::parse_known(&req.plan_id) else {
        return JsonResponse::bad_request("Unknown plan").into_response();
    };
    let Some(price) = tier.plan().stripe_price_id else {
        return JsonResponse::bad_request("Plan cannot be purchased").into_response();
    };

    let frontend = &state.config.frontend_origin;
    let request = CreateCheckoutSessionRequest {
        success_url: format!("{frontend}/subscribe?success=true"),
        cancel_url: format!("{frontend}/subscribe?canceled=true"),
        price: price.to_string(),
        client_reference_id: Some(claims.sub.clone()),
        metadata: Some(
            [
                ("user_id".to_string(), claims.sub.clone()),
                ("plan_id".to_string(), tier.as_str().to_string()),
            ]
            .into_iter()
            .collect(),
        ),
    };

    match state.stripe.create_checkout_session(request).await {
        Ok(session) => {
            info!(user_id = %claims.sub, plan = tier.as_str(), "created checkout session");
            Json(serde_json::json!({ "url": session.url })).into_response()
        }
        Err(err) => {
            error!(?err, user_id = %claims.sub, "checkout session creation failed");
            JsonResponse::server_error("Could not start checkout").into_response()
        }
    }
}

// POST /api/billing/cancel
pub async fn cancel_subscription(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(claims) = authenticated_user(&state, &headers) else {
        return JsonResponse::unauthorized("Sign in to manage billing").into_response();
    };

    let record = match state.users.find_user(&claims.sub).await {
        Ok(record) => record,
        Err(err) => {
            error!(?err, user_id = %claims.sub, "user lookup failed");
            return JsonResponse::server_error("Could not load subscription").into_response();
        }
    };

    let Some(subscription_id) = record.and_then(|r| r.subscription_id) else {
        return JsonResponse::not_found("No subscription to cancel").into_response();
    };

    match state
        .stripe
        .set_subscription_cancel_at_period_end(&subscription_id, true)
        .await
    {
        Ok(sub) => {
            info!(user_id = %claims.sub, subscription_id = %sub.id, "subscription set to cancel");
            Json(serde_json::json!({
                "cancel_at_period_end": sub.cancel_at_period_end,
                "cancel_at": sub.cancel_at,
            }))
            .into_response()
        }
        Err(err) => {
            error!(?err, user_id = %claims.sub, "subscription cancel failed");
            JsonResponse::server_error("Could not cancel subscription").into_response()
        }
    }
}
