use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Arg, Command};
use tracing::{error, info, warn};

use slicer::app::{AppMode, Application};
use slicer::common::{init_logging, load_config, StartupConfig};
use slicer::shutdown::{wait_for_shutdown_signal, ShutdownManager};

/// Worker 停机宽限之外留给其余组件的时间
const SHUTDOWN_SLACK: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("slicer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("分布式图像分片处理系统")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，缺省时查找 config/slicer.toml"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("运行模式")
                .value_parser(["api", "worker", "all"])
                .default_value("all"),
        )
        .arg(
            Arg::new("worker-id")
                .long("worker-id")
                .value_name("ID")
                .help("Worker ID，缺省时使用主机名"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let startup = StartupConfig {
        config_path: matches.get_one::<String>("config").cloned(),
        log_level: matches.get_one::<String>("log-level").cloned(),
        log_format: matches.get_one::<String>("log-format").cloned(),
        worker_id: matches.get_one::<String>("worker-id").cloned(),
    };
    let app_mode: AppMode = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("all")
        .parse()?;

    let config = load_config(&startup)?;
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;

    info!("启动分布式图像分片处理系统");
    info!(
        "配置文件: {}",
        startup.config_path.as_deref().unwrap_or("<默认路径>")
    );
    info!("运行模式: {:?}", app_mode);

    let grace = Duration::from_secs(config.worker.shutdown_grace_seconds) + SHUTDOWN_SLACK;
    let app = Arc::new(Application::new(config, app_mode).await?);
    let shutdown_manager = ShutdownManager::new();

    let mut app_handle = {
        let app = Arc::clone(&app);
        let shutdown_rx = shutdown_manager.subscribe();
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("收到关闭信号，开始优雅关闭...");
        }
        finished = &mut app_handle => {
            shutdown_manager.shutdown();
            return match finished {
                Ok(result) => result,
                Err(e) => Err(anyhow::anyhow!("应用任务异常退出: {e}")),
            };
        }
    }

    let mut outcome = None;
    let stopped = shutdown_manager
        .shutdown_within(grace, async { outcome = Some(app_handle.await) })
        .await;

    match outcome {
        Some(Ok(Ok(()))) => info!("系统已优雅关闭"),
        Some(Ok(Err(e))) => error!("应用关闭时发生错误: {:#}", e),
        Some(Err(e)) => error!("应用任务异常退出: {}", e),
        None if !stopped => warn!("系统关闭超时，强制退出"),
        None => {}
    }

    Ok(())
}
