use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use routespec::ErrorBody;
use serde_json::{json, Value};

const DEFAULT_TITLE: &str = "API Reference";

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub fn json_document(document: Value) -> Response {
    ([(header::CACHE_CONTROL, "no-store")], Json(document)).into_response()
}

pub fn yaml_document(document: &Value) -> Response {
    match serde_yaml::to_string(document) {
        Ok(text) => (
            [
                (header::CONTENT_TYPE, "application/yaml"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to render the API document as YAML");
            ErrorBody::from_status(StatusCode::INTERNAL_SERVER_ERROR.as_u16()).into_response()
        }
    }
}

/// Scalar viewer for the document served at `spec_url`.
pub fn scalar_page(spec_url: &str, title: Option<&str>, description: Option<&str>) -> Html<String> {
    let title = escape(title.unwrap_or(DEFAULT_TITLE));
    let description = escape(description.unwrap_or(DEFAULT_TITLE));
    let configuration = escape(&json!({ "spec": { "url": spec_url } }).to_string());
    Html(format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8"/>
  <meta name="viewport" content="width=device-width, initial-scale=1"/>
  <meta name="description" content="{description}"/>
  <title>{title}</title>
</head>
<body>
  <script id="api-reference" data-configuration="{configuration}"></script>
  <script src="https://cdn.jsdelivr.net/npm/@scalar/api-reference"></script>
</body>
</html>"#
    ))
}

pub fn redoc_page(spec_url: &str) -> Html<String> {
    let spec_url = escape(spec_url);
    Html(format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8"/>
  <meta name="viewport" content="width=device-width, initial-scale=1"/>
  <title>Redoc</title>
</head>
<body>
  <redoc spec-url="{spec_url}"></redoc>
  <script src="https://cdn.redoc.ly/redoc/latest/bundles/redoc.standalone.js"></script>
</body>
</html>"#
    ))
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
