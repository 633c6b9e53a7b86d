//! 服务上下文 (ServiceContext)
//!
//! 聚合抓取器、配置、优雅退出令牌与事件发送器，在适配器、格式写入器与引擎之间共享。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::config::AppConfig;
use crate::core::error::{Result, SpiderError};
use crate::core::event::{EventSender, SpiderEvent};
use crate::network::fetcher::Fetcher;

#[derive(Clone)]
pub struct ServiceContext {
    /// 带缓存的内容抓取器
    pub fetcher: Arc<Fetcher>,
    /// 应用配置
    pub config: Arc<AppConfig>,
    /// 优雅退出令牌
    pub shutdown: CancellationToken,
    /// 事件发送器（可选）
    pub events: Option<EventSender>,
}

impl ServiceContext {
    pub fn new(fetcher: Arc<Fetcher>, config: Arc<AppConfig>) -> Self {
        Self {
            fetcher,
            config,
            shutdown: CancellationToken::new(),
            events: None,
        }
    }

    /// 设置事件发送器
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// 发送事件
    pub fn emit(&self, event: SpiderEvent) {
        if let Some(ref sender) = self.events {
            sender.emit(event);
        }
    }

    /// 已收到退出信号时返回 `Cancelled`
    pub fn check_cancelled(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            Err(SpiderError::Cancelled)
        } else {
            Ok(())
        }
    }
}
