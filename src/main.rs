use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use tracing::{error, info, warn};

use orchestrator::{wait_for_shutdown_signal, Application, ShutdownManager};
use orchestrator_core::config::AppConfig;
use orchestrator_observability::{
    init_metrics_exporter, init_structured_logging, LogFormat, LoggingConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("orchestrator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("周期任务调度与系统健康监控引擎")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时按默认路径查找"),
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
                .value_parser(["json", "pretty", "compact"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let mut config = AppConfig::load(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("加载配置文件失败: {}", path.display()),
        None => "加载配置失败".to_string(),
    })?;
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }

    init_logging(&config)?;
    info!("启动周期任务调度与系统健康监控引擎");

    if let Some(listen) = &config.observability.prometheus_listen {
        let addr = listen
            .parse()
            .with_context(|| format!("无效的Prometheus监听地址: {listen}"))?;
        init_metrics_exporter(addr)?;
        info!("Prometheus指标端点已启动: {}", listen);
    }

    let shutdown_timeout = Duration::from_secs(config.scheduler.shutdown_timeout_seconds + 10);
    let app = Arc::new(Application::new(config).await?);
    let shutdown_manager = ShutdownManager::new();

    let mut app_handle = {
        let app = Arc::clone(&app);
        let shutdown_rx = shutdown_manager.subscribe().await;
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    // 启动失败时应用任务会先于关闭信号结束
    let finished_early = tokio::select! {
        result = wait_for_shutdown_signal() => {
            if let Err(e) = result {
                error!("监听关闭信号失败: {e}");
            }
            None
        }
        result = &mut app_handle => Some(result),
    };

    let result = match finished_early {
        Some(result) => result,
        None => {
            info!("开始优雅关闭...");
            shutdown_manager.shutdown().await;
            match tokio::time::timeout(shutdown_timeout, app_handle).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("应用关闭超时，强制退出");
                    return Ok(());
                }
            }
        }
    };

    match result {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => {
            error!("应用运行失败: {e:#}");
            return Err(e);
        }
        Err(e) => error!("应用任务异常退出: {e}"),
    }

    info!("引擎已退出");
    Ok(())
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let format: LogFormat = config
        .observability
        .log_format
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    init_structured_logging(LoggingConfig {
        level: config.observability.log_level.clone(),
        format,
        ..LoggingConfig::default()
    })
    .context("初始化日志系统失败")
}
