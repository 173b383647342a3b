use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SWAGGER_UI_VERSION: &str = "5";

/// Error loading an API schema document.
#[derive(thiserror::Error, Debug)]
pub enum DocsError {
    #[error("cannot read schema {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A static API schema plus how to present it.
#[derive(Clone, Debug)]
pub struct ApiDocs {
    title: String,
    schema: Arc<Value>,
}

impl ApiDocs {
    pub fn new(title: impl Into<String>, schema: Value) -> Self {
        Self {
            title: title.into(),
            schema: Arc::new(schema),
        }
    }

    pub fn from_json_str(title: impl Into<String>, json: &str) -> Result<Self, DocsError> {
        Ok(Self::new(title, serde_json::from_str(json)?))
    }

    pub fn from_file(title: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, DocsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| DocsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(title, &json)
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Viewer page. The schema is fetched from `configuration` relative
    /// to wherever the router is mounted.
    pub fn viewer_html(&self) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>{title}</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@{version}/swagger-ui.css" />
  <style>.swagger-ui .topbar {{ display: none }}</style>
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@{version}/swagger-ui-bundle.js"></script>
  <script>
    window.onload = function () {{
      var base = window.location.pathname.replace(/\/?$/, '/');
      window.ui = SwaggerUIBundle({{ url: base + 'configuration', dom_id: '#swagger-ui' }});
    }};
  </script>
</body>
</html>
"#,
            title = escape_html(&self.title),
            version = SWAGGER_UI_VERSION,
        )
    }
}

/// Router serving `GET /` (interactive viewer) and `GET /configuration`
/// (the raw schema document).
pub fn router<S>(docs: ApiDocs) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let page = Html(docs.viewer_html());
    let schema = docs.schema;
    Router::new()
        .route("/", get(move || async move { page }))
        .route(
            "/configuration",
            get(move || async move { (StatusCode::OK, Json(schema.as_ref().clone())) }),
        )
}

/// Nest the docs router at `path` unless `env` is `production`.
pub fn mount_unless_production<S>(app: Router<S>, path: &str, env: &str, docs: ApiDocs) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    if env.eq_ignore_ascii_case("production") {
        app
    } else {
        app.nest(path, router(docs))
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
