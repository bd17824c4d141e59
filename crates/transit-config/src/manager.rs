use crate::config::{ConfigError, ConfigResult, FileConfig, SessionConfig};
use crate::options::SessionOptions;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// 配置管理器
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
    config: Arc<RwLock<FileConfig>>,
}

impl ConfigManager {
    /// 加载配置文件
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::InvalidPath(format!(
                "Config file not found: {:?} (run `transit config init` first)",
                path
            )));
        }

        info!("Loading config from {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let content = Self::expand_env_vars(&content)?;
        let config: FileConfig = serde_json::from_str(&content)?;

        Ok(Self {
            path: path.to_path_buf(),
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// 从默认位置加载配置
    pub async fn load_default() -> ConfigResult<Self> {
        let config_path = Self::default_config_path()?;
        Self::load(&config_path).await
    }

    /// 获取默认配置路径 (~/.transit/config.json)
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        crate::default_config_path()
            .ok_or_else(|| ConfigError::InvalidPath("Could not find home directory".to_string()))
    }

    /// 创建一个新的配置管理器（用于测试）
    pub fn new(config: FileConfig, path: PathBuf) -> Self {
        Self {
            path,
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// Write a template config for `applet_id` and return a manager over it.
    pub async fn init(path: &Path, applet_id: &str) -> ConfigResult<Self> {
        let template = FileConfig {
            session: SessionOptions::new(applet_id),
            ..FileConfig::default()
        };
        let manager = Self::new(template, path.to_path_buf());
        manager.save().await?;
        Ok(manager)
    }

    /// 获取配置的只读引用
    pub fn get(&self) -> Arc<RwLock<FileConfig>> {
        Arc::clone(&self.config)
    }

    /// Validated session configuration from the current file contents
    pub async fn session_config(&self) -> ConfigResult<SessionConfig> {
        let options = self.config.read().await.session.clone();
        SessionConfig::from_options(options)
    }

    /// 保存配置到文件
    pub async fn save(&self) -> ConfigResult<()> {
        self.save_to(&self.path).await?;
        info!("Config saved to {:?}", self.path);
        Ok(())
    }

    /// 保存配置到指定路径
    pub async fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let config = self.config.read().await;
        let content = serde_json::to_string_pretty(&*config)?;
        drop(config);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// 更新配置
    pub async fn update<F>(&self, f: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut FileConfig) -> ConfigResult<()>,
    {
        let mut config = self.config.write().await;
        f(&mut config)?;
        drop(config);
        self.save().await
    }

    /// 展开环境变量 ${VAR} 或 ${VAR:-default}
    pub fn expand_env_vars(content: &str) -> ConfigResult<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::Validation(format!("Invalid env pattern: {}", e)))?;

        let mut result = content.to_string();
        for cap in re.captures_iter(content) {
            let (full_match, var_expr) = match (cap.get(0), cap.get(1)) {
                (Some(full), Some(expr)) => (full.as_str(), expr.as_str()),
                _ => continue,
            };

            let (var_name, default_value) = match var_expr.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (var_expr, None),
            };

            let replacement = match std::env::var(var_name) {
                Ok(val) => val,
                Err(_) => match default_value {
                    Some(default) => default.to_string(),
                    None => return Err(ConfigError::EnvVarNotFound(var_name.to_string())),
                },
            };

            result = result.replace(full_match, &replacement);
        }

        Ok(result)
    }

    /// 获取配置文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }
}
