//! 爬虫引擎调度器
//!
//! 两阶段流水线：抓取 (站点 -> 描述文件) 与打包 (描述文件 -> 归档)。
//! 打包阶段按卷隔离失败，一卷出错不影响其他卷。

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bon::Builder;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::core::descriptor::Descriptor;
use crate::core::error::{Result, SpiderError};
use crate::core::event::SpiderEvent;
use crate::core::model::Volume;
use crate::interfaces::{FormatWriter, SiteAdapter};
use crate::network::context::ServiceContext;
use crate::utils::file_exists;

use super::context::BuildContext;
use super::task::{TaskResult, VolumeOutcome, VolumeTask};

/// 打包参数
#[derive(Debug, Clone, Builder)]
pub struct BuildOptions {
    /// 归档输出目录
    #[builder(into)]
    pub out_dir: PathBuf,
    /// 卷并行度，未设置或不大于 1 时串行
    pub parallel: Option<usize>,
    /// 仅打包这些卷，为空时全部
    #[builder(default)]
    pub volumes: Vec<String>,
}

/// 打包汇总
#[derive(Debug, Default)]
pub struct BuildSummary {
    pub built: Vec<(String, PathBuf)>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub cancelled: Vec<String>,
}

impl BuildSummary {
    /// 所有卷均已生成或跳过
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }
}

impl fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} built, {} skipped, {} failed",
            self.built.len(),
            self.skipped.len(),
            self.failed.len()
        )?;
        if !self.cancelled.is_empty() {
            write!(f, ", {} cancelled", self.cancelled.len())?;
        }
        Ok(())
    }
}

/// 爬虫引擎
pub struct ScrapeEngine {
    adapter: Option<Arc<dyn SiteAdapter>>,
    writer: Option<Arc<dyn FormatWriter>>,
    core: ServiceContext,
}

impl ScrapeEngine {
    pub fn new(core: ServiceContext) -> Self {
        Self {
            adapter: None,
            writer: None,
            core,
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn SiteAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn with_writer(mut self, writer: Arc<dyn FormatWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    fn adapter(&self) -> Result<&Arc<dyn SiteAdapter>> {
        self.adapter
            .as_ref()
            .ok_or_else(|| SpiderError::Configuration("no site adapter selected".into()))
    }

    fn writer(&self) -> Result<&Arc<dyn FormatWriter>> {
        self.writer
            .as_ref()
            .ok_or_else(|| SpiderError::Configuration("no output format selected".into()))
    }

    /// 抓取阶段：元数据 -> 章节 -> 页面 -> 图片地址，按卷归组
    ///
    /// 任何错误都会中止抓取，半成品描述文件没有意义。
    pub async fn crawl(&self) -> Result<Descriptor> {
        let adapter = self.adapter()?;

        let metadata = adapter.get_metadata().await?;
        info!("开始抓取: {} ({}) via {}", metadata.title, metadata.slug, adapter.id());
        self.core.emit(SpiderEvent::CrawlStarted {
            slug: metadata.slug.clone(),
            title: metadata.title.clone(),
        });

        let chapters = adapter.get_chapters().await?;
        let total = chapters.len();
        info!("共发现 {} 个章节", total);
        self.core.emit(SpiderEvent::ChaptersDiscovered { total });

        let mut descriptor = Descriptor::new(metadata);
        for (index, mut chapter) in chapters.into_iter().enumerate() {
            self.core.check_cancelled()?;

            for mut page in adapter.get_pages(&chapter).await? {
                // 预先解析，打包阶段只需下载图片
                page.image_url = Some(adapter.get_image(&page).await?);
                chapter.add_page(page);
            }

            info!(
                "[{}/{}] 第 {} 章: {} 页",
                index + 1,
                total,
                chapter.number,
                chapter.pages.len()
            );
            self.core.emit(SpiderEvent::ChapterCrawled {
                current: index + 1,
                total,
                number: chapter.number.clone(),
                pages: chapter.pages.len(),
            });
            descriptor.add_chapter(chapter);
        }

        Ok(descriptor)
    }

    /// 抓取并保存描述文件
    pub async fn crawl_to(&self, out: &Path) -> Result<Descriptor> {
        let descriptor = match self.crawl().await {
            Ok(d) => d,
            Err(e) => {
                self.fail_task(e.to_string());
                return Err(e);
            }
        };
        self.save(&descriptor, out)?;
        Ok(descriptor)
    }

    /// 打包阶段
    ///
    /// 目标文件已存在的卷直接跳过；每卷的错误记录在汇总中，不中断其余卷。
    /// 指定 `checkpoint` 时，每成功一卷以及全部结束后都会保存描述文件。
    pub async fn build(
        &self,
        descriptor: &mut Descriptor,
        options: &BuildOptions,
        checkpoint: Option<&Path>,
    ) -> Result<BuildSummary> {
        let writer = self.writer()?.clone();
        let volumes = select_volumes(descriptor, &options.volumes);
        let workers = options.parallel.unwrap_or(1).max(1);

        info!(
            "开始打包: {} 卷, 格式 {}, 并行度 {}",
            volumes.len(),
            writer.id(),
            workers
        );
        self.core.emit(SpiderEvent::BuildStarted {
            title: descriptor.metadata.title.clone(),
            volumes: volumes.len(),
        });

        let ctx = Arc::new(BuildContext::new(
            writer,
            descriptor.metadata.clone(),
            self.core.clone(),
            workers,
            &options.out_dir,
            volumes.len(),
        ));

        let mut summary = BuildSummary::default();

        if workers == 1 {
            for volume in volumes {
                let result = VolumeTask::new(volume).run(ctx.clone()).await;
                self.record(result, descriptor, checkpoint, &mut summary);
            }
        } else {
            let mut join_set = JoinSet::new();
            for volume in volumes {
                join_set.spawn(VolumeTask::new(volume).run(ctx.clone()));
            }

            // 汇合点：等待所有卷结束
            while let Some(res) = join_set.join_next().await {
                match res {
                    Ok(result) => self.record(result, descriptor, checkpoint, &mut summary),
                    Err(e) => {
                        error!("并发调度错误: {}", e);
                        summary.failed.push(("?".to_string(), e.to_string()));
                    }
                }
            }
        }

        if let Some(path) = checkpoint {
            self.save(descriptor, path)?;
        }

        info!("打包结束: {}", summary);
        if summary.is_success() {
            self.core.emit(SpiderEvent::TaskCompleted {
                summary: summary.to_string(),
            });
        } else {
            self.fail_task(summary.to_string());
        }
        Ok(summary)
    }

    /// 抓取 + 打包，复用已有描述文件
    pub async fn download(&self, options: &BuildOptions, rebuild: bool) -> Result<BuildSummary> {
        let slug = self.adapter()?.slug().to_string();
        let path = options.out_dir.join(format!("{slug}.xml"));

        let mut descriptor = if !rebuild && file_exists(&path).await {
            info!("复用描述文件 {:?}", path);
            Descriptor::load(&path)?
        } else {
            self.crawl_to(&path).await?
        };

        self.build(&mut descriptor, options, Some(&path)).await
    }

    fn record(
        &self,
        result: TaskResult,
        descriptor: &mut Descriptor,
        checkpoint: Option<&Path>,
        summary: &mut BuildSummary,
    ) {
        match result.outcome {
            VolumeOutcome::Built(report) => {
                if descriptor.apply_resolved(&report.resolved) > 0 {
                    info!("卷 {}: 补全 {} 个图片地址", result.volume, report.resolved.len());
                }
                if let Some(path) = checkpoint
                    && let Err(e) = self.save(descriptor, path)
                {
                    warn!("描述文件检查点保存失败: {}", e);
                }
                summary.built.push((result.volume, report.path));
            }
            VolumeOutcome::Skipped(path) => {
                debug!("卷 {} 沿用 {:?}", result.volume, path);
                summary.skipped.push(result.volume);
            }
            VolumeOutcome::Failed(e) => summary.failed.push((result.volume, e.to_string())),
            VolumeOutcome::Cancelled => summary.cancelled.push(result.volume),
        }
    }

    fn save(&self, descriptor: &Descriptor, path: &Path) -> Result<()> {
        descriptor.save(path)?;
        self.core.emit(SpiderEvent::DescriptorSaved {
            path: path.display().to_string(),
        });
        Ok(())
    }

    fn fail_task(&self, error: String) {
        error!("任务执行失败: {}", error);
        self.core.emit(SpiderEvent::TaskFailed { error });
    }
}

/// 按卷号排序，可选只保留指定卷
fn select_volumes(descriptor: &Descriptor, wanted: &[String]) -> Vec<Volume> {
    for number in wanted {
        if !descriptor.volumes.contains_key(number) {
            warn!("描述文件中没有卷 {}", number);
        }
    }

    descriptor
        .sorted_volumes()
        .into_iter()
        .filter(|v| wanted.is_empty() || wanted.contains(&v.number))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rstest::rstest;

    use super::*;
    use crate::core::model::{Chapter, Metadata, Page};
    use crate::formats::cbz::CbzWriter;
    use crate::formats::testing::{sample_images, sample_volume};
    use crate::formats::FormatContext;
    use crate::network::testing::{StubTransport, stub_context};

    const HOST: &str = "http://img.example";

    /// 页面地址 `http://site/c<chapter>/<page>.html` 对应图片 `http://img.example/c<chapter>/<page>.png`
    struct StubAdapter {
        chapters: Vec<(Chapter, Vec<u32>)>,
        image_calls: AtomicUsize,
    }

    impl StubAdapter {
        fn new(chapters: Vec<(&str, Option<&str>, Vec<u32>)>) -> Self {
            Self {
                chapters: chapters
                    .into_iter()
                    .map(|(number, volume, pages)| {
                        let chapter = Chapter::new(
                            Some(format!("http://site/c{number}/1.html")),
                            format!("Chapter {number}"),
                            number,
                            volume.map(String::from),
                        );
                        (chapter, pages)
                    })
                    .collect(),
                image_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SiteAdapter for StubAdapter {
        fn id(&self) -> &str {
            "stub"
        }

        fn slug(&self) -> &str {
            "demo"
        }

        async fn get_metadata(&self) -> Result<Metadata> {
            Ok(Metadata::new("demo", "Demo"))
        }

        async fn get_chapters(&self) -> Result<Vec<Chapter>> {
            Ok(self.chapters.iter().map(|(c, _)| c.clone()).collect())
        }

        async fn get_pages(&self, chapter: &Chapter) -> Result<Vec<Page>> {
            let pages = self
                .chapters
                .iter()
                .find(|(c, _)| c.number == chapter.number)
                .map(|(_, pages)| pages.clone())
                .unwrap_or_default();
            Ok(pages
                .into_iter()
                .map(|n| Page::new(Some(format!("http://site/c{}/{n}.html", chapter.number)), n))
                .collect())
        }

        async fn get_image(&self, page: &Page) -> Result<String> {
            self.image_calls.fetch_add(1, Ordering::SeqCst);
            let url = page.url.as_deref().unwrap_or_default();
            Ok(url.replace("http://site", HOST).replace(".html", ".png"))
        }
    }

    fn three_volumes() -> Descriptor {
        let mut descriptor = Descriptor::new(Metadata::new("demo", "Demo"));
        for number in ["3", "1", "2"] {
            descriptor.add_volume(sample_volume(number, HOST));
        }
        descriptor
    }

    fn engine(service: ServiceContext) -> ScrapeEngine {
        let writer = Arc::new(CbzWriter::new(FormatContext::new(service.clone(), None)));
        ScrapeEngine::new(service).with_writer(writer)
    }

    #[tokio::test]
    async fn crawl_resolves_images_and_groups_volumes() {
        let dir = tempfile::tempdir().unwrap();
        let service = stub_context(dir.path(), Arc::new(StubTransport::new()));
        let adapter = Arc::new(StubAdapter::new(vec![
            ("1", Some("1"), vec![1, 2]),
            ("2", Some("1"), vec![1]),
            ("3", Some("2"), vec![1, 2, 3]),
            ("4", None, vec![1]),
        ]));
        let engine = ScrapeEngine::new(service).with_adapter(adapter.clone());

        let out = dir.path().join("demo.xml");
        let descriptor = engine.crawl_to(&out).await.unwrap();

        let volumes: Vec<&str> = descriptor.volumes.keys().map(|k| k.as_str()).collect();
        assert_eq!(volumes, vec!["1", "2", "TBD"]);
        assert_eq!(descriptor.volumes["1"].chapters.len(), 2);
        assert_eq!(adapter.image_calls.load(Ordering::SeqCst), 7);
        assert_eq!(
            descriptor.volumes["2"].chapters[0].pages[2].image_url.as_deref(),
            Some("http://img.example/c3/3.png")
        );

        let reloaded = Descriptor::load(&out).unwrap();
        assert_eq!(reloaded.metadata, descriptor.metadata);
        assert_eq!(reloaded.chapter_count(), 4);
        assert!(reloaded.volumes["TBD"].chapters[0].volume.is_none());
    }

    #[tokio::test]
    async fn crawl_without_adapter_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = stub_context(dir.path(), Arc::new(StubTransport::new()));
        let err = ScrapeEngine::new(service).crawl().await.unwrap_err();
        assert!(matches!(err, SpiderError::Configuration(_)));
    }

    #[rstest]
    #[case(None)]
    #[case(Some(3))]
    #[tokio::test]
    async fn failing_volume_does_not_stop_siblings(#[case] parallel: Option<usize>) {
        let mut stub = StubTransport::new();
        for number in ["1", "3"] {
            for url in sample_images(number, HOST) {
                stub = stub.route(&url, 200, url.as_bytes());
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(stub_context(dir.path(), Arc::new(stub)));

        let out_dir = dir.path().join("out");
        let checkpoint = out_dir.join("demo.xml");
        let options = BuildOptions::builder()
            .out_dir(&out_dir)
            .maybe_parallel(parallel)
            .build();

        let mut descriptor = three_volumes();
        let summary = engine
            .build(&mut descriptor, &options, Some(&checkpoint))
            .await
            .unwrap();

        assert!(!summary.is_success());
        assert_eq!(summary.built.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "2");
        assert!(out_dir.join("demo-v1.cbz").exists());
        assert!(!out_dir.join("demo-v2.cbz").exists());
        assert!(out_dir.join("demo-v3.cbz").exists());
        assert!(checkpoint.exists());
    }

    #[tokio::test]
    async fn existing_archives_are_skipped_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(StubTransport::new());
        let engine = engine(stub_context(dir.path(), transport.clone()));

        let out_dir = dir.path().join("out");
        std::fs::create_dir_all(&out_dir).unwrap();
        for number in ["1", "2", "3"] {
            std::fs::write(out_dir.join(format!("demo-v{number}.cbz")), b"done").unwrap();
        }

        let options = BuildOptions::builder().out_dir(&out_dir).parallel(2).build();
        let summary = engine
            .build(&mut three_volumes(), &options, None)
            .await
            .unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.skipped.len(), 3);
        assert_eq!(transport.calls(), 0);
        assert_eq!(
            std::fs::read(out_dir.join("demo-v2.cbz")).unwrap(),
            b"done".to_vec()
        );
    }

    #[tokio::test]
    async fn builds_only_requested_volumes() {
        let mut stub = StubTransport::new();
        for url in sample_images("2", HOST) {
            stub = stub.route(&url, 200, url.as_bytes());
        }
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(stub_context(dir.path(), Arc::new(stub)));

        let options = BuildOptions::builder()
            .out_dir(dir.path())
            .volumes(vec!["2".to_string(), "9".to_string()])
            .build();
        let summary = engine
            .build(&mut three_volumes(), &options, None)
            .await
            .unwrap();

        assert_eq!(summary.built.len(), 1);
        assert_eq!(summary.built[0].0, "2");
        assert!(!dir.path().join("demo-v1.cbz").exists());
    }

    #[tokio::test]
    async fn lazily_resolved_images_reach_the_checkpoint() {
        let mut stub = StubTransport::new();
        for page in [1, 2] {
            let url = format!("{HOST}/c5/{page}.png");
            stub = stub.route(&url, 200, url.as_bytes());
        }
        let dir = tempfile::tempdir().unwrap();
        let service = stub_context(dir.path(), Arc::new(stub));
        let adapter: Arc<dyn SiteAdapter> = Arc::new(StubAdapter::new(vec![]));
        let writer = Arc::new(CbzWriter::new(FormatContext::new(
            service.clone(),
            Some(adapter.clone()),
        )));
        let engine = ScrapeEngine::new(service)
            .with_adapter(adapter)
            .with_writer(writer);

        // 页面只有 HTML 地址
        let mut descriptor = Descriptor::new(Metadata::new("demo", "Demo"));
        let mut chapter = Chapter::new(None, "Chapter 5", "5", Some("1".into()));
        for page in [2, 1] {
            chapter.add_page(Page::new(Some(format!("http://site/c5/{page}.html")), page));
        }
        descriptor.add_chapter(chapter);

        let checkpoint = dir.path().join("demo.xml");
        let options = BuildOptions::builder().out_dir(dir.path()).build();
        let summary = engine
            .build(&mut descriptor, &options, Some(&checkpoint))
            .await
            .unwrap();
        assert!(summary.is_success());

        let saved = Descriptor::load(&checkpoint).unwrap();
        let urls: HashMap<u32, String> = saved.volumes["1"].chapters[0]
            .pages
            .iter()
            .map(|p| (p.number, p.image_url.clone().unwrap()))
            .collect();
        assert_eq!(urls[&1], "http://img.example/c5/1.png");
        assert_eq!(urls[&2], "http://img.example/c5/2.png");
    }

    #[tokio::test]
    async fn cancelled_build_schedules_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(StubTransport::new());
        let service = stub_context(dir.path(), transport.clone());
        service.shutdown.cancel();
        let engine = engine(service);

        let options = BuildOptions::builder().out_dir(dir.path()).build();
        let summary = engine
            .build(&mut three_volumes(), &options, None)
            .await
            .unwrap();

        assert_eq!(summary.cancelled.len(), 3);
        assert!(!summary.is_success());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn download_reuses_existing_descriptor() {
        let mut stub = StubTransport::new();
        for number in ["1", "2", "3"] {
            for url in sample_images(number, HOST) {
                stub = stub.route(&url, 200, url.as_bytes());
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let service = stub_context(dir.path(), Arc::new(stub));
        let adapter = Arc::new(StubAdapter::new(vec![("1", Some("1"), vec![1])]));
        let writer = Arc::new(CbzWriter::new(FormatContext::new(service.clone(), None)));
        let engine = ScrapeEngine::new(service)
            .with_adapter(adapter.clone())
            .with_writer(writer);

        three_volumes().save(dir.path().join("demo.xml")).unwrap();

        let options = BuildOptions::builder().out_dir(dir.path()).build();
        let summary = engine.download(&options, false).await.unwrap();

        assert_eq!(summary.built.len(), 3);
        // 描述文件已存在，不再抓取
        assert_eq!(adapter.image_calls.load(Ordering::SeqCst), 0);
    }
}
