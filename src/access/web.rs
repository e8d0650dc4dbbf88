use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::access::evaluator::PolicyEvaluator;
use crate::access::types::{CheckRequest, CheckResponse, LevelsRequest, LevelsResponse, PolicyKey};

pub fn router(evaluator: Arc<PolicyEvaluator>) -> Router {
    Router::new()
        .route("/v1/check", post(handle_check))
        .route("/v1/levels", post(handle_levels))
        .route(
            "/v1/policies/{key}",
            get(get_policy).put(put_policy).delete(reset_policy),
        )
        .route("/healthz", get(health))
        .with_state(evaluator)
}

/// Run store work on the blocking pool. `FileStore` reads and writes with
/// `std::fs`, which must stay off the async workers.
async fn blocking<T, F>(evaluator: Arc<PolicyEvaluator>, work: F) -> Result<T, Response>
where
    F: FnOnce(&PolicyEvaluator) -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || work(&evaluator))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Policy task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "policy task failed" })),
            )
                .into_response()
        })
}

async fn handle_check(
    State(evaluator): State<Arc<PolicyEvaluator>>,
    Json(req): Json<CheckRequest>,
) -> Response {
    let decision = match blocking(evaluator, move |evaluator| {
        evaluator.evaluate(req.module, req.level, req.user.as_ref())
    })
    .await
    {
        Ok(decision) => decision,
        Err(response) => return response,
    };
    Json(CheckResponse {
        allowed: decision.allowed,
        reason: decision.reason,
    })
    .into_response()
}

async fn handle_levels(
    State(evaluator): State<Arc<PolicyEvaluator>>,
    Json(req): Json<LevelsRequest>,
) -> Response {
    match blocking(evaluator, move |evaluator| {
        evaluator.accessible_levels(req.module, req.user.as_ref())
    })
    .await
    {
        Ok(levels) => Json(LevelsResponse { levels }).into_response(),
        Err(response) => response,
    }
}

async fn get_policy(
    State(evaluator): State<Arc<PolicyEvaluator>>,
    Path(key): Path<String>,
) -> Response {
    let key = match key.parse::<PolicyKey>() {
        Ok(key) => key,
        Err(e) => return e.into_response(),
    };
    match blocking(evaluator, move |evaluator| evaluator.store().get_value(key)).await {
        Ok(value) => Json(value).into_response(),
        Err(response) => response,
    }
}

async fn put_policy(
    State(evaluator): State<Arc<PolicyEvaluator>>,
    Path(key): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let key = match key.parse::<PolicyKey>() {
        Ok(key) => key,
        Err(e) => return e.into_response(),
    };
    match blocking(evaluator, move |evaluator| evaluator.store().set_value(key, body)).await {
        Ok(Ok(())) => {
            tracing::info!(%key, "Policy updated");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(Err(e)) => e.into_response(),
        Err(response) => response,
    }
}

async fn reset_policy(
    State(evaluator): State<Arc<PolicyEvaluator>>,
    Path(key): Path<String>,
) -> Response {
    let key = match key.parse::<PolicyKey>() {
        Ok(key) => key,
        Err(e) => return e.into_response(),
    };
    match blocking(evaluator, move |evaluator| evaluator.store().reset(key)).await {
        Ok(Ok(())) => {
            tracing::info!(%key, "Policy reset to default");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(Err(e)) => e.into_response(),
        Err(response) => response,
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
