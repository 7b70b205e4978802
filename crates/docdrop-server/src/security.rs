use axum::http::header::{self, HeaderName};
use axum::http::HeaderValue;

pub async fn security_headers_middleware(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    response
}

/// `Content-Security-Policy` for stored uploads: served files render sandboxed.
pub fn upload_content_policy() -> HeaderValue {
    HeaderValue::from_static("sandbox")
}
