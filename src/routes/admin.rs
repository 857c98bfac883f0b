use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    response::Response,
    Json,
};
use time::OffsetDateTime;
use tracing::error;

use crate::models::plan::ResourceKind;
use crate::models::user::SyncState;
use crate::responses::JsonResponse;
use crate::routes::auth::authenticated_user;
use crate::state::AppState;

// GET /api/admin/entitlements/{user_id}
//
// Debug view over another user's resolved entitlements. Unlike the limits
// routes this one answers anonymous callers with an explicit 401: it is an
// operator tool, not something a client widget polls.
pub async fn entitlement_snapshot(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    if authenticated_user(&state, &headers).is_none() {
        return JsonResponse::unauthorized("Authentication required").into_response();
    }

    let record = match state.users.find_user(&user_id).await {
        Ok(record) => record,
        Err(err) => {
            error!(?err, user_id, "entitlement snapshot lookup failed");
            return JsonResponse::server_error("Could not load user").into_response();
        }
    };

    let sync_state = SyncState::of(record.as_ref(), OffsetDateTime::now_utc());
    let plan = state.entitlements.resolve_plan(&user_id).await;
    let minutes = state
        .limiter
        .peek(&user_id, &plan, ResourceKind::Minutes)
        .await;
    let transformations = state
        .limiter
        .peek(&user_id, &plan, ResourceKind::Transformations)
        .await;

    Json(serde_json::json!({
        "user_id": user_id,
        "tier": plan.tier.as_str(),
        "status": plan.status.as_str(),
        "sync_state": sync_state.as_str(),
        "minutes": minutes,
        "transformations": transformations,
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testutil::{auth_header, TestHarness};
    use axum::extract::State;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn anonymous_callers_get_an_explicit_401() {
        let harness = TestHarness::new();
        let resp = entitlement_snapshot(
            State(harness.state.clone()),
            HeaderMap::new(),
            Path("user_1".to_string()),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn snapshot_reports_plan_sync_state_and_counters() {
        let harness = TestHarness::with_plan("user_2", "starter", "active");
        let headers = auth_header(&harness, "user_1");

        let resp = entitlement_snapshot(
            State(harness.state.clone()),
            headers,
            Path("user_2".to_string()),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["tier"], "starter");
        assert_eq!(json["status"], "active");
        assert_eq!(json["sync_state"], "synced");
        assert_eq!(json["minutes"]["limit"], 480);
        assert_eq!(json["transformations"]["limit"], 50);
    }
}
