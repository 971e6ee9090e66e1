//! File downloads and exports.

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use taskdesk_common::AppResult;
use taskdesk_core::FileDownload;

use crate::{
    extractors::{AdminUser, header_str},
    middleware::AppState,
};

async fn download(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> AppResult<Response> {
    let file = state.asset_service.download(id).await?;
    Ok(serve(&headers, file))
}

async fn thumbnail(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> AppResult<Response> {
    let file = state.asset_service.thumbnail(id).await?;
    Ok(serve(&headers, file))
}

/// Subscriber list as CSV.
async fn export_subscribers(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> AppResult<Response> {
    let csv = state.marketing_service.export_csv().await?;
    tracing::info!(admin_id = admin.id, "Subscribers exported");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=subscribers.csv",
            ),
        ],
        csv,
    )
        .into_response())
}

/// Answer with the file, or 304 when the client's copy is current.
fn serve(headers: &HeaderMap, file: FileDownload) -> Response {
    let etag = file.etag_header();
    let cache_control = file.cache_control();

    if header_str(headers, header::IF_NONE_MATCH.as_str()).is_some_and(|tag| file.matches_etag(tag)) {
        return (
            StatusCode::NOT_MODIFIED,
            [(header::ETAG, etag), (header::CACHE_CONTROL, cache_control)],
        )
            .into_response();
    }

    (
        [
            (header::CONTENT_TYPE, file.content_type.clone()),
            (header::CONTENT_DISPOSITION, file.content_disposition()),
            (header::ETAG, etag),
            (header::CACHE_CONTROL, cache_control),
        ],
        file.data,
    )
        .into_response()
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/files/{id}", get(download))
        .route("/files/{id}/thumb", get(thumbnail))
        .route("/subscribers/export.csv", get(export_subscribers))
}
