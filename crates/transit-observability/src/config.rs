//! 配置管理模块
//!
//! 观测性配置，可由 transit-config 的 `logging` 段转换而来。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 观测性配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,

    /// 指标配置
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// 设置日志级别
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    /// 设置是否使用 JSON 格式
    pub fn with_json_format(mut self, json: bool) -> Self {
        self.logging.json_format = json;
        self
    }

    /// 设置是否启用 ANSI 颜色
    pub fn with_ansi_colors(mut self, ansi: bool) -> Self {
        self.logging.ansi_colors = ansi;
        self
    }

    /// 添加模块特定的日志级别
    pub fn with_module_level(mut self, module: impl Into<String>, level: impl Into<String>) -> Self {
        self.logging.module_levels.insert(module.into(), level.into());
        self
    }

    /// 启用或关闭指标收集
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics.enabled = enabled;
        self
    }
}

#[cfg(feature = "transit-config")]
impl From<&transit_config::LoggingConfig> for Config {
    fn from(logging: &transit_config::LoggingConfig) -> Self {
        Config::default()
            .with_log_level(logging.level.to_string())
            .with_json_format(logging.json)
            .with_ansi_colors(logging.ansi)
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（trace, debug, info, warn, error）或完整的过滤指令
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否使用 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 模块级别的日志配置
    #[serde(default)]
    pub module_levels: HashMap<String, String>,

    /// 是否启用 ANSI 颜色
    #[serde(default = "default_true")]
    pub ansi_colors: bool,

    /// 是否包含目标（target）
    #[serde(default = "default_true")]
    pub include_target: bool,

    /// 是否包含线程 ID
    #[serde(default)]
    pub include_thread_id: bool,

    /// 是否包含行号
    #[serde(default)]
    pub include_line_number: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            module_levels: HashMap::new(),
            ansi_colors: true,
            include_target: true,
            include_thread_id: false,
            include_line_number: false,
        }
    }
}

/// 指标配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// 是否启用指标收集
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 是否安装 Prometheus recorder
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prometheus_enabled: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
