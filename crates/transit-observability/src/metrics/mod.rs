//! 指标收集模块
//!
//! 注册 transit-session 发出的计数器描述，并可选安装 Prometheus recorder。

use metrics::{describe_counter, Unit};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::{Config, MetricsConfig};
#[cfg(feature = "prometheus")]
use crate::error::ObservabilityError;
use crate::error::Result;

/// Counters emitted per channel, labelled `channel = cp | ab`
pub const CHANNEL_COUNTERS: &[(&str, &str)] = &[
    ("transit_connect_attempts_total", "Connection attempts"),
    ("transit_connections_total", "Connections established"),
    ("transit_connect_failures_total", "Connection attempts that failed"),
    ("transit_disconnects_total", "Established connections that closed"),
    ("transit_reconnects_scheduled_total", "Reconnect timers scheduled"),
    ("transit_frames_received_total", "Text frames received"),
    ("transit_binary_frames_total", "Binary frames received and ignored"),
    ("transit_malformed_frames_total", "Text frames that were not valid envelopes"),
    ("transit_send_errors_total", "Sends that failed or found the channel down"),
];

/// Counter for rejected control plane `setconfig` commands
pub const REMOTE_CONFIG_REJECTED: &str = "transit_remote_config_rejected_total";

/// 指标收集器
pub struct MetricsCollector {
    /// Prometheus 句柄
    #[cfg(feature = "prometheus")]
    handle: Option<PrometheusHandle>,

    /// 配置
    config: MetricsConfig,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("config", &self.config)
            .finish()
    }
}

impl MetricsCollector {
    /// 创建指标收集器；启用 Prometheus 时安装全局 recorder
    pub fn new(config: &Config) -> Result<Self> {
        let mut collector = Self {
            #[cfg(feature = "prometheus")]
            handle: None,
            config: config.metrics.clone(),
        };

        if !collector.config.enabled {
            return Ok(collector);
        }

        #[cfg(feature = "prometheus")]
        if collector.config.prometheus_enabled {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();

            metrics::set_global_recorder(recorder).map_err(|e| {
                ObservabilityError::metrics(format!("Failed to set global recorder: {}", e))
            })?;

            collector.handle = Some(handle);
        }

        register_descriptions();

        tracing::info!(
            target: "transit_observability",
            "Metrics collector initialized"
        );

        Ok(collector)
    }

    /// 是否启用
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// 获取 Prometheus 格式的指标
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        {
            self.handle
                .as_ref()
                .map(|h| h.render())
                .unwrap_or_default()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            String::new()
        }
    }
}

/// 注册指标描述
fn register_descriptions() {
    for (name, description) in CHANNEL_COUNTERS {
        describe_counter!(*name, Unit::Count, *description);
    }
    describe_counter!(
        REMOTE_CONFIG_REJECTED,
        Unit::Count,
        "Remote setconfig commands rejected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_collector_renders_nothing() {
        let collector = MetricsCollector::new(&Config::default().with_metrics(false)).unwrap();
        assert!(!collector.is_enabled());
        assert_eq!(collector.render(), "");
    }

    #[test]
    fn test_counter_names_are_unique() {
        let mut names: Vec<_> = CHANNEL_COUNTERS.iter().map(|(name, _)| *name).collect();
        names.push(REMOTE_CONFIG_REJECTED);
        let count = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), count);
        assert!(names.iter().all(|name| name.starts_with("transit_") && name.ends_with("_total")));
    }
}
