//! HTTP front end: one JSON endpoint that scans a local chart directory.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::{Deserialize, Serialize};

use crate::pipeline::{Pipeline, validate_chart_path};

pub const HELM_IMAGES_PATH: &str = "/api/helm-images";

/// Upper bound on a single scan; pulls of large images can take a long time.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(1500);

#[derive(Debug, Serialize, Deserialize)]
pub struct ChartPath {
    #[serde(default)]
    pub chart_url: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

/// Serve until ctrl-c.
pub async fn serve(addr: SocketAddr, pipeline: Pipeline) -> Result<()> {
    let pipeline = Arc::new(pipeline);
    let make_svc = make_service_fn(move |_conn| {
        let pipeline = pipeline.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let pipeline = pipeline.clone();
                async move { Ok::<_, Infallible>(handle(req, &pipeline).await) }
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind {addr}"))?
        .serve(make_svc);
    tracing::info!(addr = %addr, "server starting");

    server
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
        .context("server error")
}

/// Route a request. Only `POST /api/helm-images` is accepted.
pub async fn handle(req: Request<Body>, pipeline: &Pipeline) -> Response<Body> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = if path != HELM_IMAGES_PATH {
        error_response(StatusCode::NOT_FOUND, "not found".to_string())
    } else if method != Method::POST {
        error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("method {method} not allowed for this endpoint"),
        )
    } else {
        helm_images(req, pipeline).await
    };

    tracing::info!(%method, path, status = response.status().as_u16(), "request");
    response
}

async fn helm_images(req: Request<Body>, pipeline: &Pipeline) -> Response<Body> {
    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(body) => body,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Error reading request body: {e}"),
            );
        }
    };

    let request: ChartPath = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Error decoding request to struct: {e}"),
            );
        }
    };

    let chart = match validate_chart_path(&request.chart_url) {
        Ok(chart) => chart,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match tokio::time::timeout(REQUEST_TIMEOUT, pipeline.run(&chart)).await {
        Ok(Ok(report)) => json_response(StatusCode::OK, &report),
        Ok(Err(e)) => {
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            tracing::warn!(
                chart = %chart.display(),
                stage = %e.stage(),
                image = e.image(),
                error = %e,
                "scan failed"
            );
            error_response(status, e.to_string())
        }
        Err(_) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("scan timed out after {}s", REQUEST_TIMEOUT.as_secs()),
        ),
    }
}

fn error_response(status: StatusCode, message: String) -> Response<Body> {
    json_response(status, &ErrorResponse { message })
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let (status, bytes, content_type) = match serde_json::to_vec(body) {
        Ok(bytes) => (status, bytes, "application/json"),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                b"Unable to encode response".to_vec(),
                "text/plain",
            )
        }
    };
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
