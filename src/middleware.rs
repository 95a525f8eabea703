use axum::extract::Request;
use axum::http::header::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

/// Middleware: tags each response with a fresh `x-request-id`.
/// Token values are never logged in full, so a scanner reporting a failed
/// redemption quotes this id to find the matching log line.
pub async fn request_id(req: Request, next: Next) -> Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let path = req.uri().path().to_owned();
    let mut resp = next.run(req).await;

    let status = resp.status();
    if status.is_client_error() || status.is_server_error() {
        tracing::info!(request_id = %req_id, %path, status = status.as_u16(), "request failed");
    }

    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: hardening headers on every response. Token values travel in
/// response bodies and filenames, so nothing may be cached or referred.
pub async fn security_headers(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    for (name, value) in [
        ("x-content-type-options", "nosniff"),
        ("x-frame-options", "DENY"),
        ("cache-control", "no-store"),
        ("referrer-policy", "no-referrer"),
    ] {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    headers.remove("server");

    resp
}
