//! 嵌入式前端页面：拖拽上传、进度显示与文件列表。

use axum::body::Body as AxumBody;
use axum::http::{HeaderMap, HeaderValue, Request, header};
use axum::response::{IntoResponse, Response};
use rust_embed::RustEmbed;

use crate::error::ApiError;

#[derive(RustEmbed)]
#[folder = "frontend/dist"]
/// 嵌入式前端资源。
pub struct FrontendAssets;

/// 返回首页 `index.html`。
pub async fn serve_index() -> Result<Response, ApiError> {
    load_embedded_asset("index.html")?
        .ok_or_else(|| ApiError::NotFound("Not Found".into()))
}

/// 未匹配路由的回退：命中嵌入资源则返回，否则 404。
pub async fn serve_fallback(req: Request<AxumBody>) -> Result<Response, ApiError> {
    let path = req.uri().path().trim_start_matches('/');
    if !path.is_empty()
        && let Some(response) = load_embedded_asset(path)?
    {
        return Ok(response);
    }
    Err(ApiError::NotFound("Not Found".into()))
}

fn load_embedded_asset(path: &str) -> Result<Option<Response>, ApiError> {
    let Some(asset) = FrontendAssets::get(path) else {
        return Ok(None);
    };
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .map_err(|_| ApiError::Internal("invalid content type".into()))?,
    );
    Ok(Some(
        (headers, AxumBody::from(asset.data.into_owned())).into_response(),
    ))
}
