use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};

use crate::core::config::HttpConfig;
use crate::core::error::{Result, SpiderError};
use crate::interfaces::{HttpReply, Transport};
use crate::network::middleware::TraceMiddleware;

/// 生产环境 HTTP 传输层
#[derive(Clone)]
pub struct HttpService {
    client: ClientWithMiddleware,
}

impl HttpService {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Self::try_build_internal_client(config)?;
        Ok(Self { client })
    }

    /// 构建底层的 HTTP 客户端
    fn try_build_internal_client(config: &HttpConfig) -> Result<ClientWithMiddleware> {
        let mut headers = HeaderMap::new();

        // 浏览器 Header 注入
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                SpiderError::Configuration(format!("invalid header name {:?}: {}", name, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                SpiderError::Configuration(format!("invalid value for header {}: {}", name, e))
            })?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(8)
            .tcp_nodelay(true)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(SpiderError::Network)?;

        Ok(ClientBuilder::new(client).with(TraceMiddleware).build())
    }
}

#[async_trait]
impl Transport for HttpService {
    async fn get(&self, url: &str) -> Result<HttpReply> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(SpiderError::Middleware)?;

        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(SpiderError::Network)?;
        Ok(HttpReply { status, body })
    }
}
