//! Graceful Shutdown
//!
//! 适配器只接受取消令牌，进程信号在这里转换

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 等待 Ctrl+C 或 SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// 收到关闭信号时取消的令牌
pub fn shutdown_token() -> CancellationToken {
    cancel_on(shutdown_signal())
}

/// `signal` 完成时取消返回的令牌
pub fn cancel_on<F>(signal: F) -> CancellationToken
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = signal => trigger.cancel(),
            _ = trigger.cancelled() => {}
        }
    });
    token
}
