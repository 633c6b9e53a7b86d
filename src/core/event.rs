//! 事件系统定义
//!
//! 用于 Engine 与 UI 之间的完全解耦通信

use flume::{Receiver, Sender};

/// Spider 事件类型
#[derive(Debug, Clone)]
pub enum SpiderEvent {
    /// 抓取开始
    CrawlStarted { slug: String, title: String },

    /// 发现章节总数
    ChaptersDiscovered { total: usize },

    /// 单章节抓取完成 (页面与图片地址均已解析)
    ChapterCrawled {
        current: usize,
        total: usize,
        number: String,
        pages: usize,
    },

    /// 描述文件已保存
    DescriptorSaved { path: String },

    /// 打包开始
    BuildStarted { title: String, volumes: usize },

    /// 单卷打包开始
    VolumeStarted { number: String },

    /// 单卷打包完成
    VolumeBuilt {
        number: String,
        path: String,
        pages: usize,
    },

    /// 目标文件已存在，跳过
    VolumeSkipped { number: String, path: String },

    /// 单卷打包失败 (不影响其他卷)
    VolumeFailed { number: String, error: String },

    /// 任务完成
    TaskCompleted { summary: String },

    /// 任务失败
    TaskFailed { error: String },
}

/// 事件发送器
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<SpiderEvent>,
}

impl EventSender {
    pub fn new(tx: Sender<SpiderEvent>) -> Self {
        Self { tx }
    }

    /// 发送事件
    pub fn emit(&self, event: SpiderEvent) {
        let _ = self.tx.send(event);
    }
}

/// 事件接收器
pub struct EventReceiver {
    rx: Receiver<SpiderEvent>,
}

impl EventReceiver {
    pub fn new(rx: Receiver<SpiderEvent>) -> Self {
        Self { rx }
    }

    /// 异步接收事件
    pub async fn recv_async(&self) -> Option<SpiderEvent> {
        self.rx.recv_async().await.ok()
    }
}

/// 创建事件通道
pub fn create_event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = flume::unbounded();
    (EventSender::new(tx), EventReceiver::new(rx))
}
