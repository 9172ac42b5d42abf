//! Stylesheets and other static files, embedded in the binary.

use axum::{
    body::Body,
    extract::Path,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;
use tracing::{debug, instrument};

#[derive(RustEmbed)]
#[folder = "ui/static/"]
pub struct Assets;

/// Serve `/static/{*path}` from the embedded assets.
#[instrument]
pub async fn serve_static(Path(path): Path<String>) -> Response {
    let Some(content) = Assets::get(&path) else {
        debug!("No embedded asset at {path}");
        return StatusCode::NOT_FOUND.into_response();
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    (
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
        ],
        Body::from(content.data.into_owned()),
    )
        .into_response()
}
