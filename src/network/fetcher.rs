//! 内容抓取器 (Content Fetcher)
//!
//! "是否已获取过该资源" 的唯一事实来源：缓存命中时不发起任何网络请求。

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::core::config::{AppConfig, HttpConfig};
use crate::core::error::{Result, SpiderError};
use crate::interfaces::Transport;
use crate::network::cache::ByteCache;
use crate::network::service::HttpService;

/// 瞬时错误重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 首次请求之外的额外尝试次数
    pub retries: u32,
    /// 线性退避基数
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            retries: 0,
            backoff: Duration::ZERO,
        }
    }
}

impl From<&HttpConfig> for RetryPolicy {
    fn from(config: &HttpConfig) -> Self {
        Self {
            retries: config.retry_count,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

pub struct Fetcher {
    transport: Arc<dyn Transport>,
    cache: ByteCache,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, cache: ByteCache, retry: RetryPolicy) -> Self {
        Self {
            transport,
            cache,
            retry,
        }
    }

    /// 基于应用配置装配生产抓取器
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let transport = Arc::new(HttpService::new(&config.http)?);
        Ok(Self::new(
            transport,
            ByteCache::new(&config.cache_path),
            RetryPolicy::from(&config.http),
        ))
    }

    /// 获取二进制内容 (始终经过缓存)
    pub async fn fetch(&self, url: &str) -> Result<Bytes> {
        if let Some(bytes) = self.cache.read(url).await? {
            debug!("Cache hit: {}", url);
            return Ok(bytes);
        }

        let body = self.download(url).await?;
        self.cache.write(url, &body).await?;
        Ok(body)
    }

    /// 获取文本内容，可选是否经过缓存
    pub async fn fetch_text(&self, url: &str, cached: bool) -> Result<String> {
        let bytes = if cached {
            self.fetch(url).await?
        } else {
            self.download(url).await?
        };
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// 执行网络请求，仅对瞬时错误按策略重试
    async fn download(&self, url: &str) -> Result<Bytes> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let result = match self.transport.get(url).await {
                Ok(reply) if reply.is_success() => Ok(reply.body),
                Ok(reply) => Err(SpiderError::Fetch {
                    status: reply.status,
                    url: url.to_string(),
                }),
                Err(e) => Err(e),
            };

            match result {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempts <= self.retry.retries => {
                    let wait = self.retry.backoff * attempts;
                    warn!(
                        "请求失败 [{}] (第 {}/{} 次): {}。将在 {:?} 后重试...",
                        url,
                        attempts,
                        self.retry.retries + 1,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
