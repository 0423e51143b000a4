//! pubsub-config - 配置加载库
//!
//! 合并顺序：`default.toml` → `{APP_ENV}.toml` → `RELAY_` 前缀环境变量（`__` 分隔层级）。
//! 环境变量键会被转为小写，组件属性（如 `consumerGroup`）请在 TOML 中配置。

use std::collections::HashMap;
use std::net::SocketAddr;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use pubsub_ports::Metadata;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Prometheus 监听地址，未配置时不导出指标
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_addr: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Pub/Sub 组件配置
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentConfig {
    /// 组件名称（用于日志）
    pub name: String,
    /// 透传给适配器的扁平属性
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl ComponentConfig {
    /// 转换为适配器元数据
    pub fn metadata(&self) -> Metadata {
        Metadata::new(self.properties.clone())
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    pub component: ComponentConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_app_env() -> String {
    "development".to_string()
}

impl RelayConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| default_app_env());

        let figment = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("RELAY_").split("__"));

        Self::from_figment(figment)
    }

    /// 从已组装的 figment 提取
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        Ok(figment.extract()?)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}
