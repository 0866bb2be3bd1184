use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use hyper::Server;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::app::{PredictError, PredictUseCase, PredictionRequest};
use crate::observability::render_metrics;

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "mortality-pipeline",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn error_response(e: PredictError) -> Response {
    match e {
        PredictError::Invalid(failure) => (StatusCode::UNPROCESSABLE_ENTITY, Json(failure)).into_response(),
        PredictError::Pipeline(e) => {
            error!(error = %e, "prediction backend failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn join_failure(e: tokio::task::JoinError) -> Response {
    error!(error = %e, "prediction task panicked");
    (StatusCode::INTERNAL_SERVER_ERROR, "prediction task failed").into_response()
}

/// Observed levels per form field, for the dropdowns
async fn levels(Extension(use_case): Extension<Arc<PredictUseCase>>) -> Response {
    match tokio::task::spawn_blocking(move || use_case.levels()).await {
        Ok(Ok(levels)) => Json(levels).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(e) => join_failure(e),
    }
}

async fn predict(
    Extension(use_case): Extension<Arc<PredictUseCase>>,
    Json(request): Json<PredictionRequest>,
) -> Response {
    // fitting on a cache miss is CPU bound
    match tokio::task::spawn_blocking(move || use_case.execute(&request)).await {
        Ok(Ok(response)) => Json(response).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(e) => join_failure(e),
    }
}

async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        render_metrics().unwrap_or_default(),
    )
}

/// Create the HTTP router for the prediction boundary
pub fn create_server(use_case: Arc<PredictUseCase>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/levels", get(levels))
        .route("/predict", post(predict))
        .route("/metrics", get(metrics))
        .layer(Extension(use_case))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on `host:port`
pub async fn start_server(use_case: Arc<PredictUseCase>, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_server(use_case);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", host, port))?;

    info!(%addr, "prediction server listening");
    println!("HTTP server running on http://{addr}");
    println!("Health check: http://{addr}/health");

    Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .context("server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::FixedModel;
    use crate::model::{fit, FitOptions};
    use crate::pipeline::ingestion::RawTable;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn router() -> Router {
        let mut rows = Vec::new();
        for region in ["Northeast", "South"] {
            for (i, y) in ["1", "0", "0", "1", "1", "0"].iter().enumerate() {
                let race = if i % 2 == 0 { "Asian" } else { "White" };
                rows.push(vec![region.to_string(), race.to_string(), y.to_string()]);
            }
        }
        let table = RawTable::new(vec!["region".into(), "race".into(), "y".into()], rows);
        let model = fit(&table, "y", &["region".into(), "race".into()], &FitOptions::default()).unwrap();
        create_server(Arc::new(PredictUseCase::new(Box::new(FixedModel(Arc::new(model))), 0.01)))
    }

    fn predict_request(region: &str) -> Request<Body> {
        let body = serde_json::json!({
            "region": region,
            "race": "white",
            "education": "unknown",
            "age": "15-24"
        });
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_predict_returns_probability() {
        let response = router().oneshot(predict_request("south")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let p = body["probability"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&p));
        assert_eq!(body["threshold"], 0.01);
    }

    #[tokio::test]
    async fn test_unseen_level_is_unprocessable() {
        let response = router().oneshot(predict_request("Midwest")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["field"], "region");
        assert_eq!(body["message"], "selected region level not present in training data");
    }

    #[tokio::test]
    async fn test_levels_lists_training_levels() {
        let response = router()
            .oneshot(Request::builder().uri("/levels").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["region"], serde_json::json!(["Northeast", "South"]));
        assert_eq!(body["race"], serde_json::json!(["Asian", "White"]));
    }

    #[tokio::test]
    async fn test_metrics_endpoint_is_plain_text() {
        let response = router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }
}
