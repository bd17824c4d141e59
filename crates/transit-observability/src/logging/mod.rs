//! 结构化日志模块
//!
//! 基于 tracing 的结构化日志，过滤器可在运行时重新加载。

use tracing_subscriber::{
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::config::{Config, LoggingConfig};
use crate::error::{ObservabilityError, Result};

/// 日志级别重新加载句柄类型
type ReloadHandle = Handle<EnvFilter, Registry>;

/// 日志管理器
#[derive(Debug)]
pub struct LogManager {
    /// 配置
    config: LoggingConfig,

    /// 过滤器重新加载句柄
    reload_handle: ReloadHandle,
}

impl LogManager {
    /// 安装全局 subscriber，输出到 stderr
    ///
    /// 每个进程只能安装一次，重复安装返回错误。
    pub fn new(config: &Config) -> Result<Self> {
        let config = config.logging.clone();

        let filter = build_filter(&config.level, &config)?;
        let (filter, reload_handle) = reload::Layer::new(filter);
        let registry = tracing_subscriber::registry().with(filter);

        let installed = if config.json_format {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(config.include_target)
                .with_thread_ids(config.include_thread_id)
                .with_line_number(config.include_line_number)
                .with_ansi(false)
                .with_writer(std::io::stderr);
            registry.with(layer).try_init()
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_target(config.include_target)
                .with_thread_ids(config.include_thread_id)
                .with_line_number(config.include_line_number)
                .with_ansi(config.ansi_colors)
                .with_writer(std::io::stderr);
            registry.with(layer).try_init()
        };
        installed.map_err(|e| {
            ObservabilityError::logging(format!("Failed to install subscriber: {}", e))
        })?;

        tracing::info!(
            target: "transit_observability",
            "Log manager initialized with level: {}",
            config.level
        );

        Ok(Self {
            config,
            reload_handle,
        })
    }

    /// 动态更新日志级别
    pub fn update_level(&mut self, level: &str) -> Result<()> {
        let new_filter = build_filter(level, &self.config)?;

        self.reload_handle
            .modify(|filter| *filter = new_filter)
            .map_err(|e| {
                ObservabilityError::logging(format!("Failed to update log level: {}", e))
            })?;
        self.config.level = level.to_string();

        tracing::info!(
            target: "transit_observability",
            "Log level updated to: {}",
            level
        );
        Ok(())
    }

    /// 获取当前配置
    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }
}

/// 构建环境过滤器，模块级别的指令追加在基础级别之后
fn build_filter(level: &str, config: &LoggingConfig) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(level)
        .map_err(|e| ObservabilityError::logging(format!("Invalid log level: {}", e)))?;

    for (module, module_level) in &config.module_levels {
        filter = filter.add_directive(
            format!("{}={}", module, module_level)
                .parse()
                .map_err(|e| ObservabilityError::logging(format!("Invalid directive: {}", e)))?,
        );
    }

    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter() {
        let config = Config::default()
            .with_module_level("tokio_tungstenite", "warn")
            .logging;
        assert!(build_filter("debug", &config).is_ok());
        assert!(build_filter("transit_session=trace,info", &config).is_ok());
    }

    #[test]
    fn test_invalid_module_directive() {
        let config = Config::default()
            .with_module_level("transit_session", "loud")
            .logging;
        let err = build_filter("info", &config).unwrap_err();
        assert_eq!(err.category(), "logging");
    }
}
