//! TLS 证书加载。

use axum_server::tls_rustls::RustlsConfig;
use tracing::info;

use crate::config::Args;

/// 同时提供证书与私钥时构建 Rustls 配置，否则返回 None（使用明文 HTTP）。
pub async fn load_rustls_config(args: &Args) -> Result<Option<RustlsConfig>, std::io::Error> {
    let (Some(cert), Some(key)) = (&args.tls_cert, &args.tls_key) else {
        return Ok(None);
    };
    let config = RustlsConfig::from_pem_file(cert, key).await?;
    info!(cert = %cert, key = %key, "loaded tls certificate");
    Ok(Some(config))
}
