//! EPUB 编译引擎 (EPUB Compilation Engine)
//!
//! 每个章节生成一个 XHTML 内容文档并引用其图片，附内联目录，
//! 阅读顺序即章节号顺序。

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use epub_builder::{EpubBuilder, EpubContent, ReferenceType, ZipLibrary};
use quick_xml::escape::escape;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::error::{Result, SpiderError};
use crate::core::model::{Chapter, Metadata, Volume};
use crate::formats::naming::normalize_chapter_number;
use crate::formats::{
    FormatContext, PageImage, VolumeSink, assemble, commit_partial, discard_partial, partial_path,
    prepare_destination, write_blocking,
};
use crate::interfaces::{BuildReport, FormatWriter};
use crate::utils::{image_extension, image_mime};

pub const ID: &str = "epub";

const CHAPTER_DIR: &str = "Text";
const IMAGE_DIR: &str = "Images";

/// 单章内容
struct ChapterDoc {
    number: String,
    title: String,
    images: Vec<PageImage>,
}

/// 封面资源
struct Cover {
    name: String,
    mime: &'static str,
    data: Bytes,
}

#[derive(Default)]
struct EpubSink {
    chapters: Vec<ChapterDoc>,
}

impl VolumeSink for EpubSink {
    fn begin_chapter(&mut self, chapter: &Chapter) -> Result<()> {
        self.chapters.push(ChapterDoc {
            number: chapter.number.clone(),
            title: chapter.title.clone(),
            images: Vec::new(),
        });
        Ok(())
    }

    fn add_page(&mut self, image: PageImage) -> Result<()> {
        match self.chapters.last_mut() {
            Some(doc) => {
                doc.images.push(image);
                Ok(())
            }
            None => Err(SpiderError::Epub(format!("page {} outside of a chapter", image.name))),
        }
    }
}

pub struct EpubWriter {
    ctx: FormatContext,
}

impl EpubWriter {
    pub fn new(ctx: FormatContext) -> Self {
        Self { ctx }
    }

    /// 封面获取失败不影响打包
    async fn fetch_cover(&self, metadata: &Metadata) -> Option<Cover> {
        let url = metadata.cover_url.as_deref()?;
        match self.ctx.service.fetcher.fetch(url).await {
            Ok(data) => {
                let ext = image_extension(url);
                Some(Cover {
                    name: format!("{IMAGE_DIR}/cover.{ext}"),
                    mime: image_mime(&ext),
                    data,
                })
            }
            Err(e) => {
                warn!("封面下载失败 {}: {}", url, e);
                None
            }
        }
    }

    async fn write(&self, dest: &Path, volume: &Volume, metadata: &Metadata) -> Result<BuildReport> {
        prepare_destination(dest).await?;

        let mut sink = EpubSink::default();
        let assembly = assemble(&self.ctx, volume, &mut sink).await?;
        let cover = self.fetch_cover(metadata).await;
        let title = format!("Volume {} - {}", volume.number, metadata.title);

        let book = Book {
            id: book_id(&metadata.slug, &volume.number),
            title,
            cover,
            chapters: sink.chapters,
        };

        let partial = partial_path(dest);
        // 将 CPU 密集型任务 (ZIP 压缩) 卸载至专用线程池
        write_blocking(move || generate(&partial, book)).await?;
        commit_partial(dest).await?;

        Ok(BuildReport {
            path: dest.to_path_buf(),
            pages: assembly.pages,
            resolved: assembly.resolved,
        })
    }
}

#[async_trait]
impl FormatWriter for EpubWriter {
    fn id(&self) -> &str {
        ID
    }

    fn file_extension(&self) -> &str {
        "epub"
    }

    async fn build_volume(
        &self,
        dest: &Path,
        volume: &Volume,
        metadata: &Metadata,
    ) -> Result<BuildReport> {
        match self.write(dest, volume, metadata).await {
            Ok(report) => {
                info!("已生成 {:?} ({} 页)", report.path, report.pages);
                Ok(report)
            }
            Err(e) => {
                discard_partial(dest).await;
                Err(e)
            }
        }
    }
}

fn epub_error(e: impl std::fmt::Display) -> SpiderError {
    SpiderError::Epub(e.to_string())
}

/// 一卷的全部内容，交给阻塞线程写出
struct Book {
    id: Uuid,
    title: String,
    cover: Option<Cover>,
    chapters: Vec<ChapterDoc>,
}

/// 由 `<slug>-v<卷号>` 派生的稳定标识，重复打包同一卷时阅读器视为同一本书
fn book_id(slug: &str, volume: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{slug}-v{volume}").as_bytes())
}

/// 组装并写出 EPUB 容器
fn generate(dest: &Path, book: Book) -> Result<()> {
    let mut builder = EpubBuilder::new(ZipLibrary::new().map_err(epub_error)?).map_err(epub_error)?;
    builder.set_title(book.title);
    builder.add_language("en");
    builder.set_uuid(book.id);

    if let Some(cover) = book.cover {
        builder
            .add_cover_image(&cover.name, cover.data.as_ref(), cover.mime)
            .map_err(epub_error)?;
    }

    builder.inline_toc();

    for chapter in book.chapters {
        for image in &chapter.images {
            builder
                .add_resource(format!("{IMAGE_DIR}/{}", image.name), image.data.as_ref(), image.mime)
                .map_err(epub_error)?;
        }

        let file_name = format!(
            "{CHAPTER_DIR}/chap-{}.xhtml",
            normalize_chapter_number(&chapter.number)
        );
        let body = chapter_body(&chapter);
        let xhtml = wrap_html(&chapter.title, &body);

        builder
            .add_content(
                EpubContent::new(file_name, xhtml.as_bytes())
                    .title(chapter.title.as_str())
                    .reftype(ReferenceType::Text),
            )
            .map_err(epub_error)?;
    }

    let file = std::fs::File::create(dest)?;
    builder.generate(file).map_err(epub_error)?;
    Ok(())
}

fn chapter_body(chapter: &ChapterDoc) -> String {
    let mut body = format!("<h1>{}</h1>\n", escape(chapter.title.as_str()));
    for (index, image) in chapter.images.iter().enumerate() {
        body.push_str(&format!(
            "<div class=\"page\"><img src=\"../{IMAGE_DIR}/{}\" alt=\"Page {}\" /></div>\n",
            image.name,
            index + 1
        ));
    }
    body
}

/// 应用 XHTML 1.1 标准模板包装
fn wrap_html(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="en">
<head>
    <meta http-equiv="Content-Type" content="application/xhtml+xml; charset=utf-8" />
    <title>{}</title>
</head>
<body>
{}
</body>
</html>"#,
        escape(title),
        body
    )
}
