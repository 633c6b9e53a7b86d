//! 应用程序入口 (Application Entrypoint)
//!
//! 负责 CLI 指令解析、遥测层初始化、依赖注入及系统生命周期管理。

mod core;
mod engine;
mod formats;
mod interfaces;
mod network;
mod repair;
mod sites;
mod ui;
mod utils;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::fmt::MakeWriter;

use crate::core::config::AppConfig;
use crate::core::descriptor::Descriptor;
use crate::core::event::{SpiderEvent, create_event_channel};
use crate::engine::{BuildOptions, BuildSummary, ScrapeEngine};
use crate::formats::{FormatContext, FormatRegistry};
use crate::interfaces::SiteAdapter;
use crate::network::{Fetcher, ServiceContext};
use crate::sites::AdapterRegistry;
use crate::ui::{Ui, get_multi};

/// 进度条感知的日志写入器 (TUI-aware Log Writer)
///
/// 确保非同步日志输出不会破坏终端进度条的渲染布局。
struct IndicatifWriter;

impl io::Write for IndicatifWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let _ = get_multi().println(s.trim_end());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for IndicatifWriter {
    type Writer = IndicatifWriter;

    fn make_writer(&self) -> Self::Writer {
        IndicatifWriter
    }
}

/// 命令行界面脚手架 (CLI Scaffolding)
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 配置文件 (缺省时读取当前目录下的 config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// 打包阶段共用参数
#[derive(Args)]
struct BuildArgs {
    /// 输出格式 (cbz/archive, epub/ebook)
    #[arg(short, long)]
    format: Option<String>,
    /// 归档输出目录
    #[arg(short, long)]
    out: Option<PathBuf>,
    /// 卷并行度
    #[arg(short, long)]
    parallel: Option<usize>,
    /// 仅打包指定卷 (逗号分隔)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    volumes: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 抓取站点并生成描述文件
    Crawl {
        /// 作品地址
        url: String,
        /// 站点适配器 (auto, mangafox, comicseries)
        #[arg(short, long)]
        adapter: Option<String>,
        /// 描述文件路径 (默认 <slug>.xml)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// 从描述文件打包
    Build {
        /// 描述文件路径
        descriptor: PathBuf,
        #[command(flatten)]
        build: BuildArgs,
    },
    /// 抓取并打包，已有描述文件时直接复用
    #[command(alias = "dl")]
    Download {
        /// 作品地址
        url: String,
        /// 站点适配器
        #[arg(short, long)]
        adapter: Option<String>,
        #[command(flatten)]
        build: BuildArgs,
        /// 忽略已有描述文件，重新抓取
        #[arg(long)]
        rebuild: bool,
    },
    /// 修复目录下旧归档的条目命名
    Fix {
        /// 目录或单个 .cbz 文件
        path: PathBuf,
    },
    /// 查看描述文件内容
    Show {
        /// 描述文件路径
        descriptor: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 遥测层初始化 (Telemetry Layer Initialization)
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(IndicatifWriter)
        .with_target(false)
        .with_ansi(true)
        .init();

    let cli = Cli::parse();
    let config = Arc::new(AppConfig::load(cli.config.as_deref())?);

    match cli.command {
        Commands::Fix { path } => {
            let report = tokio::task::spawn_blocking(move || repair::repair_tree(&path)).await??;
            info!(
                "扫描 {} 个归档: 修复 {}, 无需修改 {}, 失败 {}",
                report.scanned,
                report.repaired.len(),
                report.unchanged,
                report.failed.len()
            );
            for (path, reason) in &report.failed {
                tracing::error!("{:?}: {}", path, reason);
            }
            Ok(())
        }
        Commands::Show { descriptor } => show(&descriptor),
        command => run_pipeline(command, config).await,
    }
}

/// 抓取/打包命令：先解析名称，再建立网络层，最后启动 UI
async fn run_pipeline(command: Commands, config: Arc<AppConfig>) -> anyhow::Result<()> {
    let adapters = AdapterRegistry::new();
    let formats = FormatRegistry::new();

    // 名称错误在任何网络访问之前报告
    match &command {
        Commands::Crawl { adapter, .. } => {
            adapters.resolve(adapter.as_deref().unwrap_or(&config.build.adapter))?;
        }
        Commands::Build { build, .. } => {
            formats.resolve(build.format.as_deref().unwrap_or(&config.build.format))?;
        }
        Commands::Download { adapter, build, .. } => {
            adapters.resolve(adapter.as_deref().unwrap_or(&config.build.adapter))?;
            formats.resolve(build.format.as_deref().unwrap_or(&config.build.format))?;
        }
        Commands::Fix { .. } | Commands::Show { .. } => {}
    }

    // 建立 UI 事件反馈链路 (Event feedback loop)
    let (event_sender, event_receiver) = create_event_channel();
    let ui_handle = Ui::run(event_receiver);

    let fetcher = Arc::new(Fetcher::from_config(&config)?);
    let ctx = ServiceContext::new(fetcher, config.clone()).with_events(event_sender);

    // 信号处理与优雅退出 (Signal Handling)
    let shutdown = ctx.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("收到中断信号，正在停止...");
            shutdown.cancel();
        }
    });

    // 任务域限制：引擎持有的事件发送器在此释放，UI 循环随之结束
    let result = execute(command, ctx, &adapters, &formats).await;

    let _ = ui_handle.await;
    result
}

async fn execute(
    command: Commands,
    ctx: ServiceContext,
    adapters: &AdapterRegistry,
    formats: &FormatRegistry,
) -> anyhow::Result<()> {
    let config = ctx.config.clone();

    match command {
        Commands::Crawl { url, adapter, out } => {
            let name = adapter.unwrap_or_else(|| config.build.adapter.clone());
            let site = adapters.create(&name, &url, ctx.clone())?;
            let out = out.unwrap_or_else(|| PathBuf::from(format!("{}.xml", site.slug())));

            let engine = ScrapeEngine::new(ctx.clone()).with_adapter(site);
            let descriptor = engine.crawl_to(&out).await?;
            let summary = format!(
                "{} volumes, {} chapters",
                descriptor.volumes.len(),
                descriptor.chapter_count()
            );
            info!("描述文件已保存 {:?}: {}", out, summary);
            ctx.emit(SpiderEvent::TaskCompleted { summary });
            Ok(())
        }
        Commands::Build { descriptor, build } => {
            let path = descriptor;
            let mut descriptor = Descriptor::load(&path)
                .with_context(|| format!("无法读取描述文件 {:?}", path))?;

            let (writer_name, options) = build_options(build, &config);
            let writer = formats.create(&writer_name, FormatContext::new(ctx.clone(), None))?;

            let engine = ScrapeEngine::new(ctx).with_writer(writer);
            let summary = engine.build(&mut descriptor, &options, Some(&path)).await?;
            check_summary(&summary)
        }
        Commands::Download {
            url,
            adapter,
            build,
            rebuild,
        } => {
            let name = adapter.unwrap_or_else(|| config.build.adapter.clone());
            let site: Arc<dyn SiteAdapter> = adapters.create(&name, &url, ctx.clone())?;

            let (writer_name, options) = build_options(build, &config);
            let writer = formats.create(
                &writer_name,
                FormatContext::new(ctx.clone(), Some(site.clone())),
            )?;

            let engine = ScrapeEngine::new(ctx).with_adapter(site).with_writer(writer);
            let summary = engine.download(&options, rebuild).await?;
            check_summary(&summary)
        }
        Commands::Fix { .. } | Commands::Show { .. } => Ok(()),
    }
}

/// 命令行参数覆盖配置文件
fn build_options(args: BuildArgs, config: &AppConfig) -> (String, BuildOptions) {
    let format = args.format.unwrap_or_else(|| config.build.format.clone());
    let options = BuildOptions::builder()
        .out_dir(args.out.unwrap_or_else(|| PathBuf::from(&config.build.output_dir)))
        .maybe_parallel(args.parallel.or(config.build.parallel))
        .volumes(args.volumes)
        .build();
    (format, options)
}

fn check_summary(summary: &BuildSummary) -> anyhow::Result<()> {
    for (volume, error) in &summary.failed {
        tracing::error!("卷 {}: {}", volume, error);
    }
    if !summary.is_success() {
        bail!("build incomplete: {}", summary);
    }
    info!("{}", summary);
    Ok(())
}

fn show(path: &Path) -> anyhow::Result<()> {
    let descriptor =
        Descriptor::load(path).with_context(|| format!("无法读取描述文件 {:?}", path))?;
    let meta = &descriptor.metadata;

    println!("{} ({})", meta.title, meta.slug);
    if let Some(cover) = &meta.cover_url {
        println!("cover: {}", cover);
    }
    for volume in descriptor.sorted_volumes() {
        println!(
            "Volume {}: {} chapters, {} pages",
            volume.number,
            volume.chapters.len(),
            volume.page_count()
        );
        for chapter in volume.sorted_chapters() {
            let unresolved = chapter.pages.iter().filter(|p| p.image_url.is_none()).count();
            if unresolved > 0 {
                println!(
                    "  {:>6}  {} ({} pages, {} unresolved)",
                    chapter.number,
                    chapter.title,
                    chapter.pages.len(),
                    unresolved
                );
            } else {
                println!("  {:>6}  {} ({} pages)", chapter.number, chapter.title, chapter.pages.len());
            }
        }
    }
    Ok(())
}
