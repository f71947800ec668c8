use crate::config::AppConfig;
use anyhow::Result;
use std::path::Path;
use std::str::FromStr;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

pub fn init_logging(config: &AppConfig) -> Result<()> {
    // 目标名用下划线形式，与crate名对应
    let target = config.service_name.replace('-', "_");
    let env_filter = EnvFilter::from_str(&format!("{}={}", target, config.logging.level))
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // 如果配置了日志文件路径，添加按天滚动的文件输出
    let file_layer = match &config.logging.file_path {
        Some(file_path) => {
            let path = Path::new(file_path);
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "jazzcash-gateway.log".into());
            let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, file_name);

            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            // guard必须活到进程结束，否则缓冲日志会丢
            Box::leak(Box::new(guard));

            Some(fmt::layer().with_ansi(false).with_writer(non_blocking))
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    if config.logging.json_format {
        subscriber
            .with(fmt::layer().json().with_span_events(FmtSpan::CLOSE))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_span_events(FmtSpan::CLOSE))
            .init();
    }

    tracing::info!("Logging initialized with level: {}", config.logging.level);

    Ok(())
}
