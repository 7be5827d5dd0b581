use std::future::Future;
use std::time::Duration;

use tokio::{
    signal,
    sync::{broadcast, watch},
    time::timeout,
};
use tracing::{debug, info, warn};

/// 优雅关闭管理器
///
/// 各组件通过 [`subscribe`](Self::subscribe) 拿到广播接收器；
/// 关闭触发后再订阅的接收器会立即收到信号。
#[derive(Clone)]
pub struct ShutdownManager {
    notify: broadcast::Sender<()>,
    triggered: watch::Sender<bool>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(16);
        let (triggered, _) = watch::channel(false);
        Self { notify, triggered }
    }

    /// 订阅关闭信号
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        if self.is_shutdown() {
            let (tx, rx) = broadcast::channel(1);
            let _ = tx.send(());
            return rx;
        }
        self.notify.subscribe()
    }

    /// 触发关闭，重复调用无副作用
    pub fn shutdown(&self) {
        if self.triggered.send_replace(true) {
            debug!("关闭信号已经发送过");
            return;
        }

        let receivers = self.notify.send(()).unwrap_or(0);
        info!("关闭信号已发送给 {} 个订阅者", receivers);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.triggered.borrow()
    }

    /// 等待关闭被触发
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.triggered.subscribe();
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// 触发关闭并在限定时间内等待组件退出
    ///
    /// 返回 `false` 表示等待超时。
    pub async fn shutdown_within<F>(&self, grace: Duration, stopped: F) -> bool
    where
        F: Future,
    {
        self.shutdown();
        match timeout(grace, stopped).await {
            Ok(_) => true,
            Err(_) => {
                warn!("等待组件退出超时（{:?}）", grace);
                false
            }
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 等待 Ctrl+C 或 SIGTERM
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("监听Ctrl+C信号失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("安装SIGTERM信号处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到Ctrl+C信号"),
        _ = terminate => info!("收到SIGTERM信号"),
    }
}
