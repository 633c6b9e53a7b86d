//! 输出格式定义

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::core::descriptor::ResolvedImage;
use crate::core::error::Result;
use crate::core::model::{Metadata, Volume};

/// 单卷打包结果
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub path: PathBuf,
    pub pages: usize,
    /// 打包过程中经适配器补全的图片地址
    pub resolved: Vec<ResolvedImage>,
}

/// 格式写入器
///
/// `build_volume` 会被不同卷并发调用，实现不得在调用间共享可变状态。
/// 失败时必须删除已写入的目标文件，且只影响当前卷。
#[async_trait]
pub trait FormatWriter: Send + Sync {
    fn id(&self) -> &str;

    /// 不含点号的扩展名
    fn file_extension(&self) -> &str;

    async fn build_volume(
        &self,
        dest: &Path,
        volume: &Volume,
        metadata: &Metadata,
    ) -> Result<BuildReport>;
}
