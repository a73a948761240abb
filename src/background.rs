//! 后台任务：定期清理中断上传留下的临时文件。

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::TEMP_SWEEP_INTERVAL_SECS;
use crate::storage::Storage;

/// 启动临时文件清理任务；`temp_ttl` 为 0 时不启动。
pub fn spawn_background_tasks(storage: Arc<Storage>, temp_ttl: Duration) {
    if temp_ttl.is_zero() {
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(TEMP_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match storage.remove_stale_temp_files(temp_ttl).await {
                Ok(removed) => debug!(removed, "temp file sweep finished"),
                Err(err) => warn!(error = %err, "temp file sweep failed"),
            }
        }
    });
}
