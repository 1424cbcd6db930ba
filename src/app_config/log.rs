use std::env;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, FmtSubscriber};

/// 设置日志
///
/// LOCAL 环境输出到控制台，其他环境按天滚动写入 info/error 两个文件。
/// 返回的 guard 需要持有到进程结束，否则异步写入线程会提前退出。
pub fn setup_logging() -> anyhow::Result<Vec<WorkerGuard>> {
    let app_env = env::var("APP_ENV").unwrap_or_else(|_| "LOCAL".to_string());

    if app_env == "LOCAL" {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::INFO)
            .with_ansi(true)
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        Ok(Vec::new())
    } else {
        let info_file = RollingFileAppender::new(Rotation::DAILY, "log_files", "info.log");
        let error_file = RollingFileAppender::new(Rotation::DAILY, "log_files", "error.log");

        let (info_non_blocking, info_guard) = tracing_appender::non_blocking(info_file);
        let (error_non_blocking, error_guard) = tracing_appender::non_blocking(error_file);

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(info_non_blocking)
                    .with_filter(EnvFilter::new("info")),
            )
            .with(
                fmt::layer()
                    .with_writer(error_non_blocking)
                    .with_filter(EnvFilter::new("error")),
            )
            .init();
        Ok(vec![info_guard, error_guard])
    }
}
