//! 传输层接口
//!
//! 抓取器只依赖此 Trait，生产实现为 `HttpService`，测试中替换为内存桩。

use async_trait::async_trait;
use bytes::Bytes;

use crate::core::error::Result;

/// 原始 HTTP 响应 (状态码 + 响应体)
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: Bytes,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 无缓存、无重试的单次 GET
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpReply>;
}
