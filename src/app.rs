//! 路由组装：上传、列表、下载与前端页面。

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Router, middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::http::resolve_client_ip;
use crate::storage::Storage;
use crate::{files, frontend, http, upload};

/// 构建应用路由。`upload_max_size` 为 0 时不限制上传请求体大小。
pub fn build_router(storage: Arc<Storage>, upload_max_size: u64) -> Router {
    let body_limit = if upload_max_size == 0 {
        DefaultBodyLimit::disable()
    } else {
        DefaultBodyLimit::max(usize::try_from(upload_max_size).unwrap_or(usize::MAX))
    };

    Router::new()
        .route("/", get(frontend::serve_index))
        .route("/upload/", post(upload::upload_files).layer(body_limit))
        .route("/files/", get(files::list_files))
        .route("/files/{name}", get(files::download_file))
        .fallback(frontend::serve_fallback)
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = resolve_client_ip(request.headers(), connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{StatusCode, header};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::config::DEFAULT_UPLOAD_MAX_SIZE;

    const BOUNDARY: &str = "file-drop-test-boundary";

    fn make_app(max_size: u64) -> (tempfile::TempDir, Arc<Storage>, Router) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("uploads");
        std::fs::create_dir_all(&root).expect("create storage root");
        let storage = Arc::new(Storage::new(root));
        let app = build_router(storage.clone(), max_size);
        (temp, storage, app)
    }

    fn multipart_body(parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (field, filename, content) in parts {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
                     filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("build request")
    }

    async fn send_get(app: &Router, uri: &str) -> Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("build request"),
            )
            .await
            .expect("router is infallible")
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes()
            .to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).expect("json body")
    }

    fn stored_file_count(storage: &Storage) -> usize {
        std::fs::read_dir(storage.root_path())
            .expect("read storage dir")
            .count()
    }

    #[tokio::test]
    async fn same_name_uploads_are_stored_separately() {
        let (_temp, _storage, app) = make_app(DEFAULT_UPLOAD_MAX_SIZE);
        let first: &[u8] = &[0x01, 0x02, 0x03];
        let second: &[u8] = &[0x0a, 0x0b, 0x0c, 0x0d, 0x0e];
        let body = multipart_body(&[("files", "a.png", first), ("files", "a.png", second)]);

        let response = app
            .clone()
            .oneshot(upload_request(body))
            .await
            .expect("router is infallible");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["message"], "Files uploaded successfully");
        let urls: Vec<String> = json["file_urls"]
            .as_array()
            .expect("file_urls array")
            .iter()
            .map(|url| url.as_str().expect("url string").to_string())
            .collect();
        assert_eq!(urls.len(), 2);
        assert_ne!(urls[0], urls[1]);
        assert!(urls.iter().all(|url| url.starts_with("/files/") && url.ends_with(".png")));

        let download = send_get(&app, &urls[0]).await;
        assert_eq!(download.status(), StatusCode::OK);
        assert_eq!(download.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(download.headers()[header::CONTENT_LENGTH], "3");
        assert_eq!(body_bytes(download).await, first);
        assert_eq!(body_bytes(send_get(&app, &urls[1]).await).await, second);

        let listing = body_json(send_get(&app, "/files/").await).await;
        let entries = listing["files"].as_array().expect("files array");
        assert_eq!(entries.len(), 2);
        let mut sizes: Vec<u64> = entries
            .iter()
            .map(|entry| entry["size"].as_u64().expect("size"))
            .collect();
        sizes.sort();
        assert_eq!(sizes, vec![3, 5]);
        for entry in entries {
            let name = entry["name"].as_str().expect("name");
            assert_eq!(entry["url"], format!("/files/{name}"));
            assert!(urls.contains(&format!("/files/{name}")));
        }
    }

    #[tokio::test]
    async fn traversal_filename_is_stored_inside_root() {
        let (temp, storage, app) = make_app(DEFAULT_UPLOAD_MAX_SIZE);
        let body = multipart_body(&[("files", "../../etc/passwd", &b"root:x:0:0"[..])]);

        let response = app
            .clone()
            .oneshot(upload_request(body))
            .await
            .expect("router is infallible");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let url = json["file_urls"][0].as_str().expect("url").to_string();
        let name = url.trim_start_matches("/files/");
        assert!(!name.contains('/'));
        assert!(storage.root_path().join(name).is_file());
        assert!(!temp.path().join("etc").exists());
    }

    #[tokio::test]
    async fn unknown_file_is_not_found() {
        let (_temp, _storage, app) = make_app(DEFAULT_UPLOAD_MAX_SIZE);
        let response = send_get(&app, "/files/does-not-exist.txt").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["detail"], "File not found");
    }

    #[tokio::test]
    async fn encoded_traversal_is_rejected() {
        let (temp, _storage, app) = make_app(DEFAULT_UPLOAD_MAX_SIZE);
        std::fs::write(temp.path().join("secret.txt"), b"secret").expect("write secret");

        let response = send_get(&app, "/files/..%2Fsecret.txt").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_without_files_is_rejected() {
        let (_temp, storage, app) = make_app(DEFAULT_UPLOAD_MAX_SIZE);
        let body = multipart_body(&[("other", "a.txt", &b"ignored"[..])]);

        let response = app
            .clone()
            .oneshot(upload_request(body))
            .await
            .expect("router is infallible");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["detail"], "no files provided");
        assert_eq!(stored_file_count(&storage), 0);
    }

    #[tokio::test]
    async fn write_failure_names_original_file() {
        let temp = tempdir().expect("tempdir");
        let storage = Arc::new(Storage::new(temp.path().join("missing")));
        let app = build_router(storage, DEFAULT_UPLOAD_MAX_SIZE);
        let body = multipart_body(&[("files", "report.pdf", &b"%PDF"[..])]);

        let response = app
            .oneshot(upload_request(body))
            .await
            .expect("router is infallible");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = body_json(response).await["detail"]
            .as_str()
            .expect("detail")
            .to_string();
        assert!(detail.starts_with("Error uploading report.pdf"), "{detail}");
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_files() {
        let (_temp, storage, app) = make_app(DEFAULT_UPLOAD_MAX_SIZE);
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; \
                 filename=\"one.txt\"\r\n\r\nfirst\r\n\
                 --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; \
                 filename=\"two.txt\"\r\n\r\ntruncated"
            )
            .as_bytes(),
        );

        let response = app
            .clone()
            .oneshot(upload_request(body))
            .await
            .expect("router is infallible");
        assert!(!response.status().is_success());
        assert_eq!(stored_file_count(&storage), 0);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let (_temp, storage, app) = make_app(64);
        let content = vec![b'x'; 1024];
        let body = multipart_body(&[("files", "big.bin", content.as_slice())]);

        let response = app
            .clone()
            .oneshot(upload_request(body))
            .await
            .expect("router is infallible");
        assert!(!response.status().is_success());
        assert_eq!(stored_file_count(&storage), 0);
    }

    #[tokio::test]
    async fn index_page_is_served_with_security_headers() {
        let (_temp, _storage, app) = make_app(DEFAULT_UPLOAD_MAX_SIZE);
        let response = send_get(&app, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        let html = String::from_utf8(body_bytes(response).await).expect("utf8");
        assert!(html.contains("dropzone"));

        let script = send_get(&app, "/app.js").await;
        assert_eq!(script.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_json_not_found() {
        let (_temp, _storage, app) = make_app(DEFAULT_UPLOAD_MAX_SIZE);
        let response = send_get(&app, "/nope").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["detail"], "Not Found");
    }

    #[tokio::test]
    async fn listing_missing_root_is_server_error() {
        let temp = tempdir().expect("tempdir");
        let storage = Arc::new(Storage::new(temp.path().join("vanished")));
        let app = build_router(storage, DEFAULT_UPLOAD_MAX_SIZE);

        let response = send_get(&app, "/files/").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_ne!(body_json(response).await["detail"], "File not found");
    }

    #[tokio::test]
    async fn empty_listing_has_files_key() {
        let (_temp, _storage, app) = make_app(DEFAULT_UPLOAD_MAX_SIZE);
        let json = body_json(send_get(&app, "/files/").await).await;
        assert_eq!(json["files"].as_array().map(Vec::len), Some(0));
    }
}
