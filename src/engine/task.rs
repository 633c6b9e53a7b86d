//! 卷任务单元定义

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::core::error::SpiderError;
use crate::core::event::SpiderEvent;
use crate::core::model::Volume;
use crate::interfaces::BuildReport;
use crate::utils::file_exists;

use super::context::BuildContext;

/// 卷任务执行结果
#[derive(Debug)]
pub enum VolumeOutcome {
    /// 归档已生成
    Built(BuildReport),
    /// 目标文件已存在 (断点续传)
    Skipped(PathBuf),
    /// 打包失败，目标文件已清理
    Failed(SpiderError),
    /// 收到退出信号，未开始打包
    Cancelled,
}

/// 单卷任务结果
#[derive(Debug)]
pub struct TaskResult {
    pub volume: String,
    pub outcome: VolumeOutcome,
}

/// 单卷打包任务
#[derive(Debug, Clone)]
pub struct VolumeTask {
    pub volume: Volume,
}

impl std::fmt::Display for VolumeTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "打包卷 {} ({} 章)",
            self.volume.number,
            self.volume.chapters.len()
        )
    }
}

impl VolumeTask {
    pub fn new(volume: Volume) -> Self {
        Self { volume }
    }

    /// 执行任务；错误只体现在结果中，不影响其他卷
    pub async fn run(self, ctx: Arc<BuildContext>) -> TaskResult {
        let number = self.volume.number.clone();
        let outcome = self.execute(&ctx).await;
        let finished = ctx.mark_finished();
        debug!("[{}/{}] 卷 {} 结束", finished, ctx.total_volumes, number);

        TaskResult {
            volume: number,
            outcome,
        }
    }

    async fn execute(&self, ctx: &BuildContext) -> VolumeOutcome {
        let number = &self.volume.number;

        let _permit = match ctx.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return VolumeOutcome::Cancelled,
        };

        let dest = ctx.destination(number);
        if file_exists(&dest).await {
            info!("卷 {} 已存在，跳过: {:?}", number, dest);
            ctx.emit(SpiderEvent::VolumeSkipped {
                number: number.clone(),
                path: dest.display().to_string(),
            });
            return VolumeOutcome::Skipped(dest);
        }

        if ctx.core.shutdown.is_cancelled() {
            return VolumeOutcome::Cancelled;
        }

        debug!("{}", self);
        ctx.emit(SpiderEvent::VolumeStarted {
            number: number.clone(),
        });

        match ctx
            .writer
            .build_volume(&dest, &self.volume, &ctx.metadata)
            .await
        {
            Ok(report) => {
                ctx.emit(SpiderEvent::VolumeBuilt {
                    number: number.clone(),
                    path: report.path.display().to_string(),
                    pages: report.pages,
                });
                VolumeOutcome::Built(report)
            }
            Err(SpiderError::Cancelled) => VolumeOutcome::Cancelled,
            Err(e) => {
                let e = SpiderError::VolumeBuild {
                    volume: number.clone(),
                    source: Box::new(e),
                };
                error!("{}", e);
                ctx.emit(SpiderEvent::VolumeFailed {
                    number: number.clone(),
                    error: e.to_string(),
                });
                VolumeOutcome::Failed(e)
            }
        }
    }
}
