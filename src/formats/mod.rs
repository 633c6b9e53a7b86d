//! 输出格式
//!
//! 所有格式共享同一套卷遍历与图片抓取逻辑 (`assemble`)，
//! 只在容器语义上不同，由各自的 `VolumeSink` 实现。

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::core::descriptor::ResolvedImage;
use crate::core::error::{Result, SpiderError};
use crate::core::model::{Chapter, Volume};
use crate::interfaces::{FormatWriter, SiteAdapter};
use crate::network::context::ServiceContext;
use crate::utils::{image_extension, image_mime, unqualified_name};

pub mod cbz;
pub mod comicinfo;
pub mod epub;
pub mod naming;

const NAMESPACE: &str = "formats";

/// 格式写入器的运行环境
///
/// 适配器可选：从描述文件打包时可能没有可用的站点实例。
#[derive(Clone)]
pub struct FormatContext {
    pub service: ServiceContext,
    pub adapter: Option<Arc<dyn SiteAdapter>>,
}

impl FormatContext {
    pub fn new(service: ServiceContext, adapter: Option<Arc<dyn SiteAdapter>>) -> Self {
        Self { service, adapter }
    }
}

/// 已命名的单页图片
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 归档内条目名
    pub name: String,
    pub mime: &'static str,
    pub data: Bytes,
}

/// 容器写入端
pub trait VolumeSink {
    fn begin_chapter(&mut self, _chapter: &Chapter) -> Result<()> {
        Ok(())
    }

    fn add_page(&mut self, image: PageImage) -> Result<()>;

    fn end_chapter(&mut self, _chapter: &Chapter) -> Result<()> {
        Ok(())
    }
}

/// 遍历结果
#[derive(Debug, Default)]
pub struct Assembly {
    pub pages: usize,
    pub resolved: Vec<ResolvedImage>,
}

/// 按阅读顺序遍历一卷，抓取每页图片交给写入端
///
/// 章节按章节号、页面按页码排序；缺少图片地址的页面经适配器补全。
/// 每页之间检查退出信号。
pub async fn assemble<S>(ctx: &FormatContext, volume: &Volume, sink: &mut S) -> Result<Assembly>
where
    S: VolumeSink + Send,
{
    let mut assembly = Assembly::default();

    for chapter in volume.sorted_chapters() {
        sink.begin_chapter(chapter)?;

        for page in chapter.sorted_pages() {
            ctx.service.check_cancelled()?;

            let image_url = match &page.image_url {
                Some(url) => url.clone(),
                None => {
                    let adapter = ctx.adapter.as_ref().ok_or_else(|| SpiderError::MissingImage {
                        chapter: chapter.number.clone(),
                        page: page.number,
                    })?;
                    let url = adapter.get_image(page).await?;
                    assembly.resolved.push(ResolvedImage {
                        volume: volume.number.clone(),
                        chapter: chapter.number.clone(),
                        page: page.number,
                        image_url: url.clone(),
                    });
                    url
                }
            };

            let data = ctx.service.fetcher.fetch(&image_url).await?;
            let ext = image_extension(&image_url);
            sink.add_page(PageImage {
                name: naming::entry_name(&chapter.number, page.number, &ext),
                mime: image_mime(&ext),
                data,
            })?;
            assembly.pages += 1;
        }

        sink.end_chapter(chapter)?;
    }

    debug!("Volume {}: {} pages assembled", volume.number, assembly.pages);
    Ok(assembly)
}

/// 确保目标目录存在
pub async fn prepare_destination(dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// 写入中的临时文件 `<dest>.part`
///
/// 目标文件只在写完后通过改名出现，进程被强杀也不会留下会被当作已完成而跳过的残缺归档。
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut path = dest.as_os_str().to_owned();
    path.push(".part");
    PathBuf::from(path)
}

/// 临时文件写完，替换为目标文件
pub async fn commit_partial(dest: &Path) -> Result<()> {
    tokio::fs::rename(partial_path(dest), dest).await?;
    Ok(())
}

/// 删除未完成的临时文件
pub async fn discard_partial(dest: &Path) {
    let partial = partial_path(dest);
    match tokio::fs::remove_file(&partial).await {
        Ok(()) => debug!("Removed partial output {:?}", partial),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("无法删除未完成的文件 {:?}: {}", partial, e),
    }
}

/// 容器写出是同步文件 IO，放到阻塞线程池执行
pub async fn write_blocking<F>(write: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(write)
        .await
        .map_err(|e| SpiderError::Io(std::io::Error::other(e)))?
}

// ============================================================================
// 格式注册表
// ============================================================================

type FormatFactory = Box<dyn Fn(FormatContext) -> Arc<dyn FormatWriter> + Send + Sync>;

pub struct FormatRegistry {
    factories: IndexMap<String, FormatFactory>,
    aliases: HashMap<String, String>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: IndexMap::new(),
            aliases: HashMap::new(),
        };
        registry.register(cbz::ID, &["archive"], |ctx| Arc::new(cbz::CbzWriter::new(ctx)));
        registry.register(epub::ID, &["ebook"], |ctx| Arc::new(epub::EpubWriter::new(ctx)));
        registry
    }

    pub fn register<F>(&mut self, id: &str, aliases: &[&str], factory: F)
    where
        F: Fn(FormatContext) -> Arc<dyn FormatWriter> + Send + Sync + 'static,
    {
        for alias in aliases {
            self.aliases.insert(alias.to_string(), id.to_string());
        }
        self.factories.insert(id.to_string(), Box::new(factory));
    }

    /// 解析为规范名称，不访问网络
    pub fn resolve(&self, name: &str) -> Result<String> {
        let short = unqualified_name(name.trim(), NAMESPACE)?;
        if self.factories.contains_key(short) {
            return Ok(short.to_string());
        }
        self.aliases.get(short).cloned().ok_or_else(|| {
            SpiderError::Configuration(format!(
                "unknown format `{name}` (available: {})",
                self.list().join(", ")
            ))
        })
    }

    pub fn create(&self, name: &str, ctx: FormatContext) -> Result<Arc<dyn FormatWriter>> {
        let id = self.resolve(name)?;
        let factory = self
            .factories
            .get(&id)
            .ok_or_else(|| SpiderError::Configuration(format!("unknown format `{id}`")))?;
        Ok(factory(ctx))
    }

    pub fn list(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::core::model::{Chapter, Page, Volume};

    /// 图片地址已解析的测试卷：章节与页面故意乱序
    pub fn sample_volume(number: &str, image_host: &str) -> Volume {
        let mut volume = Volume::new(number);
        for chapter_number in ["2", "1"] {
            let mut chapter = Chapter::new(
                None,
                format!("Chapter {chapter_number}"),
                chapter_number,
                Some(number.to_string()),
            );
            for page_number in [2, 1] {
                let mut page = Page::new(None, page_number);
                page.image_url = Some(format!(
                    "{image_host}/v{number}/c{chapter_number}/{page_number}.png"
                ));
                chapter.add_page(page);
            }
            volume.add_chapter(chapter);
        }
        volume
    }

    /// `sample_volume` 引用的全部图片地址
    pub fn sample_images(number: &str, image_host: &str) -> Vec<String> {
        let mut urls = Vec::new();
        for chapter_number in ["1", "2"] {
            for page_number in [1, 2] {
                urls.push(format!(
                    "{image_host}/v{number}/c{chapter_number}/{page_number}.png"
                ));
            }
        }
        urls
    }
}
