//! 站点定义
//!
//! 每个受支持的站点实现一次 `SiteAdapter`，把各自的页面结构映射为统一的内容模型。
//!
//! 约定：
//! - 构造时校验输入 URL 属于该站点，否则返回 `AdapterMismatch`；
//! - 页面缺失预期元素时返回 `AdapterStructure`，不得静默跳过；
//! - 编号为 0 的占位页不属于页面列表。

use async_trait::async_trait;

use crate::core::error::Result;
use crate::core::model::{Chapter, Metadata, Page};

#[async_trait]
pub trait SiteAdapter: Send + Sync {
    /// 站点唯一标识 (注册表键)
    fn id(&self) -> &str;

    /// 作品 slug，从输入 URL 解析，无需联网
    fn slug(&self) -> &str;

    /// 抓取作品索引页，提取标题与封面
    async fn get_metadata(&self) -> Result<Metadata>;

    /// 章节列表 (pages 为空)
    async fn get_chapters(&self) -> Result<Vec<Chapter>>;

    /// 章节内的页面 (url + number，image_url 未解析)
    async fn get_pages(&self, chapter: &Chapter) -> Result<Vec<Page>>;

    /// 解析页面的最终图片地址
    async fn get_image(&self, page: &Page) -> Result<String>;
}
