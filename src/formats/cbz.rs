//! CBZ 归档
//!
//! 图片按阅读顺序以不压缩方式存入 zip，末尾附带 ComicInfo.xml。
//! 抓取完成后在阻塞线程池中一次写出到 `<dest>.part`，成功后改名。

use std::fs::File;
use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::core::error::Result;
use crate::core::model::{Metadata, Volume};
use crate::formats::{
    FormatContext, PageImage, VolumeSink, assemble, comicinfo, commit_partial, discard_partial,
    partial_path, prepare_destination, write_blocking,
};
use crate::interfaces::{BuildReport, FormatWriter};

pub const ID: &str = "cbz";

#[derive(Default)]
struct CbzSink {
    pages: Vec<PageImage>,
}

impl VolumeSink for CbzSink {
    fn add_page(&mut self, image: PageImage) -> Result<()> {
        self.pages.push(image);
        Ok(())
    }
}

/// 写出 zip 容器 (同步)
fn write_archive(path: &Path, pages: Vec<PageImage>, comic_info: &str) -> Result<()> {
    let mut zip = ZipWriter::new(File::create(path)?);
    // 图片本身已压缩
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for page in pages {
        zip.start_file(page.name, options)?;
        zip.write_all(&page.data)?;
    }
    zip.start_file("ComicInfo.xml", options)?;
    zip.write_all(comic_info.as_bytes())?;
    zip.finish()?;
    Ok(())
}

pub struct CbzWriter {
    ctx: FormatContext,
}

impl CbzWriter {
    pub fn new(ctx: FormatContext) -> Self {
        Self { ctx }
    }

    async fn write(&self, dest: &Path, volume: &Volume, metadata: &Metadata) -> Result<BuildReport> {
        prepare_destination(dest).await?;
        let mut sink = CbzSink::default();
        let assembly = assemble(&self.ctx, volume, &mut sink).await?;
        let comic_info = comicinfo::render(metadata, volume, assembly.pages)?;

        let partial = partial_path(dest);
        write_blocking(move || write_archive(&partial, sink.pages, &comic_info)).await?;
        commit_partial(dest).await?;

        Ok(BuildReport {
            path: dest.to_path_buf(),
            pages: assembly.pages,
            resolved: assembly.resolved,
        })
    }
}

#[async_trait]
impl FormatWriter for CbzWriter {
    fn id(&self) -> &str {
        ID
    }

    fn file_extension(&self) -> &str {
        "cbz"
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
