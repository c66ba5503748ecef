#![allow(dead_code)]

//! Shared fixtures for integration tests.

use axum::body::Bytes;
use axum::extract::Multipart;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use axum::routing::post;
use indexkit_http::{HttpClient, HttpClientBuilder};

/// Serve `router` on an ephemeral local port; returns the base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// `POST /echo` answers with the request body and reports the request's
/// content type in `x-echo-content-type`.
pub fn echo_router() -> Router {
    async fn echo(headers: HeaderMap, body: Bytes) -> Response {
        let content_type = headers.get(CONTENT_TYPE).cloned();
        let mut response = body.into_response();
        if let Some(content_type) = content_type {
            response
                .headers_mut()
                .insert("x-echo-content-type", content_type);
        }
        response
    }

    Router::new().route("/echo", post(echo))
}

/// `POST /multipart` parses a `multipart/form-data` body and answers with one
/// JSON object per part, in wire order: `name`, `filename`, `contentType` and
/// the raw `bytes`.
pub fn multipart_router() -> Router {
    async fn parts(
        mut multipart: Multipart,
    ) -> Result<Json<Vec<serde_json::Value>>, (StatusCode, String)> {
        let mut parts = Vec::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| (e.status(), e.body_text()))?
        {
            let name = field.name().map(str::to_owned);
            let filename = field.file_name().map(str::to_owned);
            let content_type = field.content_type().map(str::to_owned);
            let bytes = field.bytes().await.map_err(|e| (e.status(), e.body_text()))?;
            parts.push(serde_json::json!({
                "name": name,
                "filename": filename,
                "contentType": content_type,
                "bytes": bytes.to_vec(),
            }));
        }
        Ok(Json(parts))
    }

    Router::new().route("/multipart", post(parts))
}

/// Client allowed to talk plain HTTP to local fixtures.
pub fn test_client() -> HttpClient {
    HttpClientBuilder::new().allow_insecure_http().build().unwrap()
}

pub fn test_builder() -> HttpClientBuilder {
    HttpClientBuilder::new().allow_insecure_http()
}
