//! 测试用内存传输层

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::core::config::AppConfig;
use crate::core::error::Result;
use crate::interfaces::{HttpReply, Transport};
use crate::network::cache::ByteCache;
use crate::network::context::ServiceContext;
use crate::network::fetcher::{Fetcher, RetryPolicy};

/// 按 URL 返回预设响应并记录调用；未登记的 URL 返回 404
#[derive(Default)]
pub struct StubTransport {
    routes: Mutex<HashMap<String, VecDeque<(u16, Bytes)>>>,
    calls: Mutex<Vec<String>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 固定响应
    pub fn route(self, url: &str, status: u16, body: impl AsRef<[u8]>) -> Self {
        self.sequence(url, vec![(status, body.as_ref().to_vec())])
    }

    /// 依次返回的响应序列，最后一个重复使用
    pub fn sequence(self, url: &str, replies: Vec<(u16, Vec<u8>)>) -> Self {
        self.routes.lock().insert(
            url.to_string(),
            replies
                .into_iter()
                .map(|(status, body)| (status, Bytes::from(body)))
                .collect(),
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|u| u.as_str() == url).count()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn get(&self, url: &str) -> Result<HttpReply> {
        self.calls.lock().push(url.to_string());

        let mut routes = self.routes.lock();
        let reply = match routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        Ok(match reply {
            Some((status, body)) => HttpReply { status, body },
            None => HttpReply {
                status: 404,
                body: Bytes::new(),
            },
        })
    }
}

/// 以临时目录为缓存根、以桩为传输层的服务上下文
pub fn stub_context(dir: &Path, transport: Arc<StubTransport>) -> ServiceContext {
    let config = AppConfig::builder()
        .cache_path(dir.join("cache").to_string_lossy().into_owned())
        .build();
    let fetcher = Fetcher::new(transport, ByteCache::new(&config.cache_path), RetryPolicy::none());
    ServiceContext::new(Arc::new(fetcher), Arc::new(config))
}
