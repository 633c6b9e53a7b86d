//! 错误处理体系 (Error Handling System)
//!
//! 定义抓取、描述文件、打包及修复流程中的领域错误，以及全局 Result 别名。

use std::path::PathBuf;

use thiserror::Error;

/// 全局错误定义 (Spider Domain Errors)
#[derive(Error, Debug)]
pub enum SpiderError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    /// 非 2xx 响应，不做本地恢复
    #[error("FetchError({status} at {url})")]
    Fetch { status: u16, url: String },

    /// 页面缺少预期的结构元素
    #[error("{url} does not contain {element}")]
    AdapterStructure { url: String, element: String },

    /// URL 不属于所选站点
    #[error("URL {url} does not match the {adapter} pattern")]
    AdapterMismatch { adapter: String, url: String },

    /// 适配器/格式名称无法解析等配置问题
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Corrupt archive {}: {reason}", path.display())]
    ArchiveCorruption { path: PathBuf, reason: String },

    /// 旧条目名规范化后与已有条目重名
    #[error("Archive {} would contain {name} twice after renaming", path.display())]
    EntryCollision { path: PathBuf, name: String },

    #[error("Volume {volume} failed: {source}")]
    VolumeBuild {
        volume: String,
        #[source]
        source: Box<SpiderError>,
    },

    /// 页面未解析图片地址且无适配器可用
    #[error("Page {page} of chapter {chapter} has no image url and no adapter is available")]
    MissingImage { chapter: String, page: u32 },

    #[error("Descriptor error: {0}")]
    Descriptor(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("EPUB error: {0}")]
    Epub(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Parsing error: {0}")]
    Parse(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// 全局 Result 别名
pub type Result<T> = std::result::Result<T, SpiderError>;

impl SpiderError {
    pub fn structure(url: impl Into<String>, element: impl Into<String>) -> Self {
        SpiderError::AdapterStructure {
            url: url.into(),
            element: element.into(),
        }
    }

    /// 是否值得重试 (连接层错误、429 及 5xx)
    pub fn is_transient(&self) -> bool {
        match self {
            SpiderError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SpiderError::Middleware(_) => true,
            SpiderError::Fetch { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}
