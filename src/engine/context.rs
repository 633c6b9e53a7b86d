//! 打包运行时上下文 (Runtime Context)
//!
//! 维护并发卷任务间的共享状态、资源配额及进度统计。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;

use crate::core::event::SpiderEvent;
use crate::core::model::Metadata;
use crate::formats::naming::archive_name;
use crate::interfaces::FormatWriter;
use crate::network::context::ServiceContext;

/// 卷任务执行上下文
///
/// 只读共享：元数据、写入器与输出目录；并发配额由信号量控制。
pub struct BuildContext {
    /// 输出格式写入器
    pub writer: Arc<dyn FormatWriter>,
    /// 作品元数据 (只读)
    pub metadata: Arc<Metadata>,
    /// 全局服务上下文
    pub core: ServiceContext,
    /// 并发控制信号量
    pub semaphore: Arc<Semaphore>,
    /// 归档输出目录
    pub out_dir: PathBuf,
    /// 本次计划处理的卷数
    pub total_volumes: usize,
    /// 原子计数：已结束 (成功、跳过或失败) 的卷数
    pub finished: Arc<AtomicUsize>,
}

impl BuildContext {
    pub fn new(
        writer: Arc<dyn FormatWriter>,
        metadata: Metadata,
        core: ServiceContext,
        workers: usize,
        out_dir: &Path,
        total_volumes: usize,
    ) -> Self {
        Self {
            writer,
            metadata: Arc::new(metadata),
            core,
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            out_dir: out_dir.to_path_buf(),
            total_volumes,
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 卷的目标文件路径
    pub fn destination(&self, volume: &str) -> PathBuf {
        self.out_dir.join(archive_name(
            &self.metadata.slug,
            volume,
            self.writer.file_extension(),
        ))
    }

    /// 记录一卷结束，返回已结束的卷数
    pub fn mark_finished(&self) -> usize {
        self.finished.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 向事件总线推送消息
    pub fn emit(&self, event: SpiderEvent) {
        self.core.emit(event);
    }
}
