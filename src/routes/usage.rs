use axum::{
    extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse, response::Response,
    Json,
};
use serde::Deserialize;

use crate::models::plan::ResourceKind;
use crate::responses::JsonResponse;
use crate::routes::auth::authenticated_user;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConsumeMinutesRequest {
    pub minutes: u32,
}

// POST /api/usage/minutes
pub async fn consume_minutes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ConsumeMinutesRequest>,
) -> Response {
    let Some(claims) = authenticated_user(&state, &headers) else {
        return JsonResponse::unauthorized("Sign in to record usage").into_response();
    };

    let plan = state.entitlements.resolve_plan(&claims.sub).await;
    let decision = state
        .limiter
        .check_and_consume(&claims.sub, &plan, ResourceKind::Minutes, req.minutes)
        .await;

    if !decision.allowed {
        return JsonResponse::error_with_code(
            StatusCode::TOO_MANY_REQUESTS,
            "Transcription minutes for this period are used up",
            "minutes_limit",
        )
        .into_response();
    }

    Json(decision).into_response()
}

// POST /api/usage/transformations
pub async fn consume_transformation(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let Some(claims) = authenticated_user(&state, &headers) else {
        return JsonResponse::unauthorized("Sign in to record usage").into_response();
    };

    let plan = state.entitlements.resolve_plan(&claims.sub).await;
    let decision = state
        .limiter
        .check_and_consume(&claims.sub, &plan, ResourceKind::Transformations, 1)
        .await;

    if !decision.allowed {
        return JsonResponse::error_with_code(
            StatusCode::TOO_MANY_REQUESTS,
            "Transformations for this period are used up",
            "transformations_limit",
        )
        .into_response();
    }

    Json(decision).into_response()
}
