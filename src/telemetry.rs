//! 日志与追踪系统
//! 结构化日志：EnvFilter + 写到 stderr 的 fmt 层

use crate::config::LoggingConfig;
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// stderr 上的格式化层：json / pretty / compact（未知值按 compact）
fn stderr_layer<S>(format: &str) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    match format.to_lowercase().as_str() {
        "json" => layer
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        "pretty" => layer.pretty().boxed(),
        _ => layer.compact().boxed(),
    }
}

/// 初始化日志与追踪系统
///
/// 日志写到 stderr，stdout 留给命令输出（导出的 JSON/CSV 可以直接重定向）。
/// RUST_LOG 优先于配置中的级别。
pub fn init_telemetry(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer(&config.format))
        .try_init()
    {
        tracing::debug!(error = %e, "Global subscriber already set");
    }

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        format = %config.format,
        "Telemetry initialized"
    );
}
