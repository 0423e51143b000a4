//! 宿主运行时

use pubsub_config::RelayConfig;
use pubsub_telemetry::{init_metrics, init_tracing, init_tracing_json};
use tracing::{info, warn};

/// 初始化宿主运行时
///
/// 需要在 tokio runtime 内调用（指标导出器会启动 HTTP 监听）
pub fn init_runtime(config: &RelayConfig) {
    // 初始化 tracing
    if config.is_production() {
        init_tracing_json(&config.telemetry.log_level);
    } else {
        init_tracing(&config.telemetry.log_level);
    }

    if let Some(addr) = config.telemetry.metrics_addr {
        match init_metrics(addr) {
            Ok(()) => info!(%addr, "Prometheus exporter listening"),
            Err(e) => warn!(%addr, error = %e, "Failed to install Prometheus exporter"),
        }
    }

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        "Runtime initialized"
    );
}
