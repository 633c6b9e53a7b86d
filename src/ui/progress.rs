//! 终端进度渲染引擎 (Terminal UI Progress Engine)
//!
//! 基于 `indicatif` 实现非阻塞式进度条编排，抓取与打包两个阶段各用一条进度条。

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::core::event::{EventReceiver, SpiderEvent};

/// 全局 TUI 容器 (Singleton)
static MULTI: OnceLock<MultiProgress> = OnceLock::new();

/// 获取全局进度容器实例
pub fn get_multi() -> &'static MultiProgress {
    MULTI.get_or_init(MultiProgress::new)
}

/// TUI 状态容器
pub struct UiState {
    /// 全局任务主状态条
    main_bar: Option<ProgressBar>,
    /// 章节抓取进度条
    chapter_bar: Option<ProgressBar>,
    /// 卷打包进度条
    volume_bar: Option<ProgressBar>,
}

impl UiState {
    fn new() -> Self {
        Self {
            main_bar: None,
            chapter_bar: None,
            volume_bar: None,
        }
    }

    fn main_bar(&mut self, title: &str) -> &ProgressBar {
        self.main_bar.get_or_insert_with(|| {
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

            let bar = get_multi().add(ProgressBar::new_spinner());
            bar.set_style(style);
            bar.set_message(format!("📚 {}", title));
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        })
    }
}

static STATE: OnceLock<Arc<RwLock<UiState>>> = OnceLock::new();

fn get_state() -> &'static Arc<RwLock<UiState>> {
    STATE.get_or_init(|| Arc::new(RwLock::new(UiState::new())))
}

fn counter_bar(total: usize, color: &str) -> ProgressBar {
    let template = format!(
        "{{spinner:.{color}}} [{{bar:40.{color}/blue}}] {{pos}}/{{len}} ({{percent}}%) {{msg}}"
    );
    let style = ProgressStyle::default_bar()
        .template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");

    let bar = get_multi().add(ProgressBar::new(total as u64));
    bar.set_style(style);
    bar
}

/// 进度协调器 (Progress Orchestrator)
pub struct Ui;

impl Ui {
    /// 激活事件监听循环，启动异步渲染管线
    pub fn run(receiver: EventReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv_async().await {
                Self::handle_event(event);
            }
        })
    }

    /// 执行 UI 状态转换与渲染更新
    fn handle_event(event: SpiderEvent) {
        let state = get_state();
        let mut ui = state.write();

        match event {
            SpiderEvent::CrawlStarted { slug, title } => {
                ui.main_bar(&title)
                    .set_message(format!("📚 {} [{}]", title, slug));
            }
            SpiderEvent::ChaptersDiscovered { total } => {
                ui.chapter_bar = Some(counter_bar(total, "cyan"));
            }
            SpiderEvent::ChapterCrawled {
                current,
                total,
                number,
                pages,
            } => {
                if let Some(ref bar) = ui.chapter_bar {
                    bar.set_length(total as u64);
                    bar.set_position(current as u64);
                    bar.set_message(format!("Ch.{} ({} p)", truncate_string(&number, 12), pages));
                }
            }
            SpiderEvent::DescriptorSaved { path } => {
                if let Some(ref bar) = ui.chapter_bar
                    && !bar.is_finished()
                {
                    bar.finish_with_message(format!("💾 {}", path));
                }
            }
            SpiderEvent::BuildStarted { title, volumes } => {
                ui.main_bar(&title)
                    .set_message(format!("📦 {} ({} volumes)", title, volumes));
                ui.volume_bar = Some(counter_bar(volumes, "magenta"));
            }
            SpiderEvent::VolumeStarted { number } => {
                if let Some(ref bar) = ui.volume_bar {
                    bar.set_message(format!("Vol.{}", number));
                }
            }
            SpiderEvent::VolumeBuilt { number, path, pages } => {
                if let Some(ref bar) = ui.volume_bar {
                    bar.inc(1);
                    bar.set_message(built_message(&number, pages, &path));
                }
            }
            SpiderEvent::VolumeSkipped { number, path } => {
                if let Some(ref bar) = ui.volume_bar {
                    bar.inc(1);
                    bar.set_message(skipped_message(&number, &path));
                }
            }
            SpiderEvent::VolumeFailed { number, error } => {
                if let Some(ref bar) = ui.volume_bar {
                    bar.inc(1);
                    bar.println(format!("❌ Vol.{}: {}", number, truncate_string(&error, 80)));
                }
            }
            SpiderEvent::TaskCompleted { summary } => {
                if let Some(ref bar) = ui.volume_bar {
                    bar.finish_with_message(format!("✅ {}", summary));
                }
                if let Some(ref bar) = ui.main_bar {
                    bar.finish_with_message("✅ TASK FINISHED");
                }
            }
            SpiderEvent::TaskFailed { error } => {
                if let Some(ref bar) = ui.volume_bar {
                    bar.abandon();
                }
                if let Some(ref bar) = ui.chapter_bar {
                    bar.abandon();
                }
                if let Some(ref bar) = ui.main_bar {
                    bar.abandon_with_message(format!("❌ FAILED: {}", error));
                }
            }
        }
    }
}

/// 只显示文件名，完整路径见日志
fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

fn built_message(number: &str, pages: usize, path: &str) -> String {
    format!("✅ Vol.{} ({} p) → {}", number, pages, file_name(path))
}

fn skipped_message(number: &str, path: &str) -> String {
    format!("⏭ Vol.{} ({} exists)", number, file_name(path))
}

/// 执行语义化字符串截断
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}
