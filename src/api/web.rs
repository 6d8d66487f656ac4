//! Bundled web UI.

use std::sync::Arc;

use axum::{
    response::{Html, Redirect},
    routing::get,
    Router,
};

use super::routes::AppState;

const INDEX_HTML: &str = include_str!("../../static/index.html");

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(|| async { Redirect::temporary("/dev-ui/") }))
        .route("/dev-ui", get(index))
        .route("/dev-ui/", get(index))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
