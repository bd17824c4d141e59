//! Transit Observability Infrastructure
//!
//! 提供统一的日志和指标功能。

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{Config, LoggingConfig, MetricsConfig};
pub use error::{ObservabilityError, Result};
pub use logging::LogManager;
pub use metrics::MetricsCollector;

use parking_lot::RwLock;
use std::sync::Arc;

/// 统一的观测性句柄
#[derive(Debug)]
pub struct Observability {
    /// 日志管理器
    log_manager: Arc<RwLock<LogManager>>,
    /// 指标收集器
    metrics: Arc<MetricsCollector>,
    /// 配置
    config: Config,
}

impl Observability {
    /// 初始化观测性基础设施
    ///
    /// 安装全局 subscriber 和 recorder，每个进程调用一次。
    pub fn init(config: Config) -> Result<Self> {
        let log_manager = Arc::new(RwLock::new(LogManager::new(&config)?));
        let metrics = Arc::new(MetricsCollector::new(&config)?);

        tracing::info!(
            target: "transit_observability",
            level = %config.logging.level,
            metrics = config.metrics.enabled,
            "Observability infrastructure initialized"
        );

        Ok(Self {
            log_manager,
            metrics,
            config,
        })
    }

    /// 获取日志管理器
    pub fn log_manager(&self) -> Arc<RwLock<LogManager>> {
        Arc::clone(&self.log_manager)
    }

    /// 获取指标收集器
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    /// 获取配置
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 动态更新日志级别
    pub fn update_log_level(&self, level: &str) -> Result<()> {
        self.log_manager.write().update_level(level)
    }

    /// Prometheus 文本格式的当前指标
    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }
}

/// 常用导入
pub mod prelude {
    pub use crate::{Config, Observability, ObservabilityError, Result};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}
