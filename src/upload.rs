//! 多文件上传处理器：每个 `files` 字段写入一个新生成名称的文件。

use axum::extract::multipart::MultipartError;
use axum::extract::{Extension, Multipart};
use axum::http::StatusCode;
use axum::response::Json as JsonResponse;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::UPLOAD_FIELD_NAME;
use crate::error::ApiError;
use crate::storage::Storage;

const UPLOAD_SUCCESS_MESSAGE: &str = "Files uploaded successfully";

#[derive(Serialize)]
pub(crate) struct UploadResponse {
    message: String,
    file_urls: Vec<String>,
}

/// 接收 multipart 上传。任一文件失败时整批回滚。
pub async fn upload_files(
    Extension(storage): Extension<Arc<Storage>>,
    mut multipart: Multipart,
) -> Result<JsonResponse<UploadResponse>, ApiError> {
    let mut batch = storage.begin_batch();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "invalid multipart body");
                batch.rollback().await;
                return Err(multipart_error(err));
            }
        };
        if field.name() != Some(UPLOAD_FIELD_NAME) {
            debug!(field = field.name().unwrap_or_default(), "skip multipart field");
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        if let Err(err) = batch.store(&original_name, field).await {
            warn!(original_name, error = %err, "upload failed, rolling back batch");
            batch.rollback().await;
            return Err(err.into());
        }
    }

    if batch.is_empty() {
        return Err(ApiError::BadRequest("no files provided".into()));
    }

    let stored = batch.commit();
    let total_size: u64 = stored.iter().map(|file| file.size).sum();
    info!(count = stored.len(), total_size, "upload batch stored");

    Ok(JsonResponse(UploadResponse {
        message: UPLOAD_SUCCESS_MESSAGE.into(),
        file_urls: stored.iter().map(|file| file.url()).collect(),
    }))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}
