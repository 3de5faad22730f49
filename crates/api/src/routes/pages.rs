//! HTML pages and fallback

use axum::response::Html;

use crate::ApiError;

const INDEX_HTML: &str = include_str!("../html/index.html");
const HOME_ASSISTANT_HTML: &str = include_str!("../html/home_assistant.html");

/// Browser client page
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Home Assistant integration help
pub async fn home_assistant() -> Html<&'static str> {
    Html(HOME_ASSISTANT_HTML)
}

/// Anything that is not a known endpoint
pub async fn not_found() -> ApiError {
    ApiError::NotFound("Endpoint not found".to_string())
}
