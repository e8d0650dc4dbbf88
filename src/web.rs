use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::Router;
use miette::IntoDiagnostic;

use crate::access::PolicyEvaluator;
use crate::settings::Settings;

async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store"),
    );

    response
}

/// Full application router: the access API plus response headers.
pub fn app(evaluator: Arc<PolicyEvaluator>) -> Router {
    crate::access::web::router(evaluator).layer(middleware::from_fn(security_headers))
}

pub async fn serve(settings: Settings, evaluator: PolicyEvaluator) -> miette::Result<()> {
    let addr: SocketAddr = settings
        .listen_addr()
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let router = app(Arc::new(evaluator));

    // NOTE: the policy endpoints carry no authentication of their own; expose
    // them only behind the application's admin gateway.
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    tracing::info!(%addr, "Access control API listening");
    axum::serve(listener, router).await.into_diagnostic()?;
    Ok(())
}
