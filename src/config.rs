//! CLI arguments and server configuration defaults.

use clap::Parser;
use shadow_rs::formatcp;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_STORAGE_DIR: &str = "uploads";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_UPLOAD_MAX_SIZE: u64 = 1024 * 1024 * 1024;
pub const DEFAULT_TEMP_TTL_SECS: u64 = 24 * 60 * 60;
pub const TEMP_SWEEP_INTERVAL_SECS: u64 = 900;
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// Multipart field name carrying uploaded files.
pub const UPLOAD_FIELD_NAME: &str = "files";
/// Route prefix under which stored files are served.
pub const FILES_URL_PREFIX: &str = "/files/";

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "file-drop", version = VERSION_INFO, about = "File drop upload server")]
pub struct Args {
    #[arg(
        short = 's',
        long,
        env = "FILE_DROP_STORAGE_DIR",
        default_value = DEFAULT_STORAGE_DIR,
        help = "Directory uploaded files are stored in"
    )]
    pub storage_dir: String,
    #[arg(
        short = 'b',
        long,
        env = "FILE_DROP_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "FILE_DROP_PORT",
        default_value_t = DEFAULT_PORT,
        help = "Listen port"
    )]
    pub port: u16,
    #[arg(
        short = 'c',
        long,
        env = "FILE_DROP_TLS_CERT",
        requires = "tls_key",
        help = "TLS cert path (serves HTTPS together with --tls-key)"
    )]
    pub tls_cert: Option<String>,
    #[arg(
        short = 'k',
        long,
        env = "FILE_DROP_TLS_KEY",
        requires = "tls_cert",
        help = "TLS key path"
    )]
    pub tls_key: Option<String>,
    #[arg(
        long,
        env = "FILE_DROP_CORS_ORIGINS",
        help = "Comma separated CORS origins"
    )]
    pub cors_origins: Option<String>,
    #[arg(
        long,
        env = "FILE_DROP_UPLOAD_MAX_SIZE",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Max upload request size in bytes (0 to disable)"
    )]
    pub upload_max_size: u64,
    #[arg(
        long,
        env = "FILE_DROP_TEMP_TTL_SECS",
        default_value_t = DEFAULT_TEMP_TTL_SECS,
        help = "Age in seconds after which orphaned temp files are removed (0 to disable)"
    )]
    pub temp_ttl_secs: u64,
}
