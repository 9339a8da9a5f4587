use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body as HttpBody, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::dispatch::{Body, Dispatcher, LdRequest, LdResponse};

/// Every path belongs to the dispatcher, so the whole router is one fallback.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .fallback(serve)
        .with_state(dispatcher)
        .layer(TraceLayer::new_for_http())
}

async fn serve(
    State(dispatcher): State<Arc<Dispatcher>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| uri.authority().map(|a| a.to_string()));
    let request = LdRequest { method, host, path: uri.path().to_string(), headers, body };
    // The store is synchronous, so requests are handled on the blocking pool.
    let handled = tokio::task::spawn_blocking(move || dispatcher.handle(&request)).await;
    match handled {
        Ok(response) => into_http(response),
        Err(e) => {
            warn!(error = %e, "Join error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Join error").into_response()
        }
    }
}

fn into_http(response: LdResponse) -> Response {
    let body = match response.body {
        Body::Empty => HttpBody::empty(),
        Body::Full(text) => HttpBody::from(text),
        Body::Stream(chunks) => HttpBody::from_stream(tokio_stream::iter(chunks.map(Ok::<_, Infallible>))),
    };
    let mut http = Response::new(body);
    *http.status_mut() = response.status;
    *http.headers_mut() = response.headers;
    http
}
