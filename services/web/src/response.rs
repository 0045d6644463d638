//! Response envelope and content negotiation
//!
//! Machine clients get the `{success, message, data?, errors?}` envelope;
//! browser clients get redirects or a minimal HTML error page. Full view
//! rendering is outside this service.

use axum::{
    Json,
    http::{HeaderMap, StatusCode, header},
    response::Html,
};
use serde_json::{Value, json};

/// Success envelope without payload
pub fn ok(message: &str) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": message,
    }))
}

/// Success envelope with payload
pub fn ok_with(message: &str, data: Value) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": message,
        "data": data,
    }))
}

/// True when the client prefers a JSON response over an HTML page.
///
/// An `Accept` naming `application/json` wins; one naming `text/html`
/// selects the HTML path; anything else (absent, `*/*`) is treated as a
/// machine client.
pub fn prefers_json(headers: &HeaderMap) -> bool {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if accept.contains("application/json") {
        true
    } else {
        !accept.contains("text/html")
    }
}

/// Minimal HTML error page for browser clients
pub fn error_page(status: StatusCode, message: &str) -> (StatusCode, Html<String>) {
    let reason = status.canonical_reason().unwrap_or("Error");
    let html = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{code} {reason}</title></head>\n\
         <body>\n<h1>{code} {reason}</h1>\n<p>{message}</p>\n</body>\n</html>\n",
        code = status.as_u16(),
    );

    (status, Html(html))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(accept: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(accept) = accept {
            headers.insert(header::ACCEPT, HeaderValue::from_str(accept).unwrap());
        }
        headers
    }

    #[test]
    fn test_json_preference() {
        assert!(prefers_json(&headers(Some("application/json"))));
        assert!(prefers_json(&headers(Some("application/json, text/plain"))));
        assert!(prefers_json(&headers(None)));
        assert!(prefers_json(&headers(Some("*/*"))));
    }

    #[test]
    fn test_html_preference() {
        assert!(!prefers_json(&headers(Some(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
        ))));
        assert!(!prefers_json(&headers(Some("text/html"))));
    }

    #[test]
    fn test_error_page_includes_status_and_message() {
        let (status, Html(html)) = error_page(StatusCode::FORBIDDEN, "Insufficient permissions");
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(html.contains("403 Forbidden"));
        assert!(html.contains("Insufficient permissions"));
    }
}
