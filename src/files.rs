//! 文件列表与下载处理器。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use httpdate::fmt_http_date;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::storage::{FileEntry, Storage};

#[derive(Serialize)]
pub(crate) struct FileListResponse {
    files: Vec<FileEntry>,
}

/// 列出存储目录中的全部文件。
pub async fn list_files(
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<JsonResponse<FileListResponse>, ApiError> {
    let files = storage.list().await?;
    info!(count = files.len(), "list files");
    Ok(JsonResponse(FileListResponse { files }))
}

/// 按存储名下载文件。
pub async fn download_file(
    Path(name): Path<String>,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<Response, ApiError> {
    let object = storage.open(&name).await.inspect_err(|err| {
        debug!(name, error = %err, "download rejected");
    })?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(object.content_type.essence_str())
            .map_err(|_| ApiError::Internal("invalid content type".into()))?,
    );
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(object.size));
    if let Some(modified) = object.modified {
        response_headers.insert(
            header::LAST_MODIFIED,
            HeaderValue::from_str(&fmt_http_date(modified))
                .map_err(|_| ApiError::Internal("invalid last-modified header".into()))?,
        );
    }

    info!(name, size = object.size, "download file");
    let stream = ReaderStream::new(object.file);
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(stream),
    )
        .into_response())
}
