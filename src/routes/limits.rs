use axum::{extract::State, http::HeaderMap, response::IntoResponse, response::Response, Json};
use serde::Serialize;

use crate::models::plan::ResourceKind;
use crate::routes::auth::authenticated_user;
use crate::state::AppState;

/// Remaining headroom for one resource. `null` means unlimited.
#[derive(Debug, Serialize)]
pub struct LimitStatus {
    pub remaining: Option<u64>,
    pub limit: Option<u64>,
}

impl LimitStatus {
    /// What anonymous callers see. A zeroed body on 200 keeps the widget
    /// rendering without leaking whether the session was merely expired.
    fn zero() -> Self {
        Self {
            remaining: Some(0),
            limit: Some(0),
        }
    }
}

async fn limit_status(state: &AppState, headers: &HeaderMap, resource: ResourceKind) -> Response {
    let Some(claims) = authenticated_user(state, headers) else {
        return Json(LimitStatus::zero()).into_response();
    };

    let plan = state.entitlements.resolve_plan(&claims.sub).await;
    let decision = state.limiter.peek(&claims.sub, &plan, resource).await;

    Json(LimitStatus {
        remaining: decision.remaining,
        limit: decision.limit,
    })
    .into_response()
}

// GET /api/limits/minutes
pub async fn minutes_left(State(state): State<AppState>, headers: HeaderMap) -> Response {
    limit_status(&state, &headers, ResourceKind::Minutes).await
}

// GET /api/limits/transformations
pub async fn transformations_left(State(state): State<AppState>, headers: HeaderMap) -> Response {
    limit_status(&state, &headers, ResourceKind::Transformations).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testutil::{auth_header, TestHarness};
    use axum::extract::State;

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn anonymous_callers_get_a_zeroed_body_on_200() {
        let harness = TestHarness::new();
        let resp = minutes_left(State(harness.state.clone()), HeaderMap::new()).await;
        assert_eq!(resp.status(), axum::http::StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["remaining"], 0);
        assert_eq!(json["limit"], 0);
    }

    #[tokio::test]
    async fn authenticated_free_user_sees_full_headroom() {
        let harness = TestHarness::new();
        let headers = auth_header(&harness, "user_1");

        let resp = minutes_left(State(harness.state.clone()), headers).await;
        assert_eq!(resp.status(), axum::http::StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["remaining"], 5);
        assert_eq!(json["limit"], 5);
    }

    #[tokio::test]
    async fn unlimited_resources_report_null() {
        let harness = TestHarness::with_plan("user_1", "pro", "active");
        let headers = auth_header(&harness, "user_1");

        let resp = transformations_left(State(harness.state.clone()), headers).await;
        let json = body_json(resp).await;
        assert_eq!(json["remaining"], serde_json::Value::Null);
        assert_eq!(json["limit"], serde_json::Value::Null);
    }
}
