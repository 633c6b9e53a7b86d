use std::time::Instant;

use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result};
use tracing::{debug, warn};

/// 请求追踪中间件
/// 记录每次真实网络请求的方法、地址、状态码与耗时
pub struct TraceMiddleware;

#[async_trait::async_trait]
impl Middleware for TraceMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let method = req.method().clone();
        let url = req.url().to_string();
        let started = Instant::now();

        let result = next.run(req, extensions).await;

        match &result {
            Ok(resp) => debug!(
                "{} {} -> {} ({:?})",
                method,
                url,
                resp.status(),
                started.elapsed()
            ),
            Err(e) => warn!("{} {} failed after {:?}: {}", method, url, started.elapsed(), e),
        }

        result
    }
}
