//! 配置管理系统 (Configuration Management)
//!
//! 负责 `config.toml` 的反序列化及其层级结构映射，支持环境变量与默认值回退机制。

use std::collections::HashMap;
use std::path::Path;

use bon::Builder;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::core::error::{Result, SpiderError};

/// 全局应用配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct AppConfig {
    /// 字节缓存根目录
    #[serde(default = "default_cache_path")]
    #[builder(default = default_cache_path())]
    pub cache_path: String,

    /// HTTP 客户端参数
    #[serde(default)]
    #[builder(default)]
    pub http: HttpConfig,

    /// 打包阶段默认参数 (setter 改名，避开 builder 自身的 `build()`)
    #[serde(default)]
    #[builder(default, name = build_config)]
    pub build: BuildConfig,

    /// 站点特定配置覆盖映射
    #[serde(default)]
    #[builder(default)]
    pub sites: HashMap<String, SiteConfig>,
}

/// HTTP 客户端配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct HttpConfig {
    /// 浏览器请求头 (部分站点会拦截无标识客户端)
    #[serde(default = "default_headers")]
    #[builder(default = default_headers())]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_connect_timeout")]
    #[builder(default = default_connect_timeout())]
    pub connect_timeout_secs: u64,
    /// 单次请求总时限
    #[serde(default = "default_timeout")]
    #[builder(default = default_timeout())]
    pub timeout_secs: u64,
    /// 瞬时错误 (连接失败、429、5xx) 的重试次数
    #[serde(default = "default_retry_count")]
    #[builder(default = default_retry_count())]
    pub retry_count: u32,
    /// 线性退避基数 (毫秒)
    #[serde(default = "default_retry_backoff")]
    #[builder(default = default_retry_backoff())]
    pub retry_backoff_ms: u64,
}

/// 打包配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct BuildConfig {
    /// 默认输出格式
    #[serde(default = "default_format")]
    #[builder(default = default_format())]
    pub format: String,
    /// 默认站点适配器
    #[serde(default = "default_adapter")]
    #[builder(default = default_adapter())]
    pub adapter: String,
    /// 卷并行度，未设置时串行
    pub parallel: Option<usize>,
    /// 默认输出目录
    #[serde(default = "default_output_dir")]
    #[builder(default = default_output_dir())]
    pub output_dir: String,
}

/// 站点特定配置覆盖
#[derive(Debug, Deserialize, Builder, Clone, Default)]
pub struct SiteConfig {
    /// 自定义域名 (用于镜像站点)
    pub base_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn default_cache_path() -> String {
    "cache".to_string()
}
fn default_headers() -> HashMap<String, String> {
    [
        (
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        ),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.8,fr;q=0.6"),
        ("Cache-Control", "max-age=0"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_timeout() -> u64 {
    30
}
fn default_retry_count() -> u32 {
    2
}
fn default_retry_backoff() -> u64 {
    500
}
fn default_format() -> String {
    "epub".to_string()
}
fn default_adapter() -> String {
    "auto".to_string()
}
fn default_output_dir() -> String {
    ".".to_string()
}

impl AppConfig {
    /// 从文件系统中加载并解析配置
    ///
    /// 显式路径必须存在；缺省时仅在 `config.toml` 存在时读取。
    /// `MANGA_SPIDER__HTTP__TIMEOUT_SECS=60` 形式的环境变量覆盖文件配置。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let builder = Config::builder();

        let builder = match path {
            Some(p) => builder.add_source(File::from(p)),
            None => {
                let default_path = Path::new("config.toml");
                if default_path.exists() {
                    builder.add_source(File::from(default_path))
                } else {
                    builder
                }
            }
        };

        let builder = builder.add_source(
            Environment::with_prefix("MANGA_SPIDER")
                .prefix_separator("__")
                .separator("__"),
        );

        let settings = builder.build().map_err(SpiderError::Config)?;
        settings.try_deserialize().map_err(SpiderError::Config)
    }

    /// 站点配置，未配置时返回默认值
    pub fn site(&self, id: &str) -> SiteConfig {
        self.sites.get(id).cloned().unwrap_or_default()
    }
}
