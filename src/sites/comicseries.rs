//! TheComicSeries 站点
//!
//! 站点没有章节索引：首页下拉框列出全部单页，每页标注所属章节与页码。
//! 因此章节发现需要遍历每一页，页面抓取走字节缓存，结果在实例内记忆。

use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::core::config::SiteConfig;
use crate::core::error::{Result, SpiderError};
use crate::core::model::{Chapter, Metadata, Page};
use crate::interfaces::SiteAdapter;
use crate::network::context::ServiceContext;
use crate::utils::to_absolute_url;

pub const ID: &str = "comicseries";

struct SiteSelectors {
    title: Selector,
    cover: Selector,
    nav_option: Selector,
    chapter_link: Selector,
    heading: Selector,
    image: Selector,
}

static SELECTORS: OnceLock<SiteSelectors> = OnceLock::new();

impl SiteSelectors {
    fn get() -> &'static SiteSelectors {
        SELECTORS.get_or_init(|| SiteSelectors {
            title: Selector::parse("title").unwrap(),
            cover: Selector::parse("meta[property='og:image']").unwrap(),
            nav_option: Selector::parse("select.comicnavlink option").unwrap(),
            chapter_link: Selector::parse(".headingsub a").unwrap(),
            heading: Selector::parse(".heading").unwrap(),
            image: Selector::parse("#comicimage").unwrap(),
        })
    }
}

static URL_PATTERN: OnceLock<Regex> = OnceLock::new();
static CHAPTER_PATTERN: OnceLock<Regex> = OnceLock::new();
static HEADING_PATTERN: OnceLock<Regex> = OnceLock::new();

fn url_pattern() -> &'static Regex {
    URL_PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<base>https?://(?P<slug>[a-z0-9-]+)\.thecomicseries\.com)(?:/.*)?$").unwrap()
    })
}

/// URL 是否属于 TheComicSeries
pub fn matches(url: &str) -> bool {
    url_pattern().is_match(url)
}

/// 单页解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
struct Strip {
    chapter_number: String,
    chapter_title: String,
    page_number: u32,
    image_url: String,
}

/// 遍历全部单页后得到的页面与图片映射
#[derive(Default)]
struct Discovery {
    pages: HashMap<String, Vec<Page>>,
    images: HashMap<String, String>,
}

pub struct ComicSeries {
    ctx: ServiceContext,
    base: Url,
    slug: String,
    discovered: Mutex<Option<Discovery>>,
}

impl ComicSeries {
    pub fn new(url: &str, config: SiteConfig, ctx: ServiceContext) -> Result<Self> {
        let caps = url_pattern()
            .captures(url)
            .ok_or_else(|| SpiderError::AdapterMismatch {
                adapter: ID.to_string(),
                url: url.to_string(),
            })?;

        let base_url = config.base_url.as_deref().unwrap_or(&caps["base"]);
        let base = Url::parse(base_url)
            .map_err(|e| SpiderError::Configuration(format!("invalid base url {base_url}: {e}")))?;

        Ok(Self {
            ctx,
            base,
            slug: caps["slug"].to_string(),
            discovered: Mutex::new(None),
        })
    }

    fn index_url(&self) -> String {
        self.base.to_string()
    }

    fn parse_metadata(&self, html: &str, url: &str) -> Result<Metadata> {
        let doc = Html::parse_document(html);
        let s = SiteSelectors::get();

        let title = doc
            .select(&s.title)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SpiderError::structure(url, "title"))?;

        let mut metadata = Metadata::new(&self.slug, title);
        metadata.cover_url = doc
            .select(&s.cover)
            .next()
            .and_then(|m| m.value().attr("content"))
            .map(|src| to_absolute_url(&self.base, src));
        Ok(metadata)
    }

    /// 首页下拉框中的全部单页地址
    fn parse_strip_links(&self, html: &str, url: &str) -> Result<Vec<String>> {
        let doc = Html::parse_document(html);
        let links: Vec<String> = doc
            .select(&SiteSelectors::get().nav_option)
            .filter_map(|opt| opt.value().attr("value"))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| to_absolute_url(&self.base, v))
            .collect();

        if links.is_empty() {
            return Err(SpiderError::structure(url, "select.comicnavlink"));
        }
        Ok(links)
    }

    fn parse_strip(html: &str, url: &str) -> Result<Strip> {
        let doc = Html::parse_document(html);
        let s = SiteSelectors::get();

        let chapter_pattern = CHAPTER_PATTERN
            .get_or_init(|| Regex::new(r"^Ch\.? (?P<chap>\d+): (?P<name>.+)$").unwrap());
        let heading_pattern = HEADING_PATTERN
            .get_or_init(|| Regex::new(r"^Comic (?P<num>\d+) - (?P<name>.+)$").unwrap());

        // 第一章之前的单页没有章节链接
        let (chapter_number, chapter_title) = doc
            .select(&s.chapter_link)
            .next()
            .map(|a| a.text().collect::<String>().trim().to_string())
            .and_then(|text| {
                chapter_pattern
                    .captures(&text)
                    .map(|c| (c["chap"].to_string(), c["name"].trim().to_string()))
            })
            .unwrap_or_else(|| ("0".to_string(), "Unknown".to_string()));

        let heading = doc
            .select(&s.heading)
            .next()
            .map(|h| h.text().collect::<String>().trim().to_string())
            .ok_or_else(|| SpiderError::structure(url, ".heading"))?;
        let page_number = heading_pattern
            .captures(&heading)
            .and_then(|c| c["num"].parse().ok())
            .ok_or_else(|| SpiderError::structure(url, ".heading (Comic N - Name)"))?;

        let src = doc
            .select(&s.image)
            .next()
            .and_then(|img| img.value().attr("src"))
            .ok_or_else(|| SpiderError::structure(url, "#comicimage"))?;
        let base = Url::parse(url).map_err(|e| SpiderError::Parse(format!("{url}: {e}")))?;

        Ok(Strip {
            chapter_number,
            chapter_title,
            page_number,
            image_url: to_absolute_url(&base, src),
        })
    }

    /// 遍历全部单页，按章节归组
    async fn discover(&self) -> Result<(Vec<Chapter>, Discovery)> {
        let index = self.index_url();
        let html = self.ctx.fetcher.fetch_text(&index, false).await?;
        let links = self.parse_strip_links(&html, &index)?;

        let mut chapters: IndexMap<String, Chapter> = IndexMap::new();
        let mut discovery = Discovery::default();

        for link in links {
            self.ctx.check_cancelled()?;
            let html = self.ctx.fetcher.fetch_text(&link, true).await?;
            let strip = Self::parse_strip(&html, &link)?;
            debug!(
                "Ch.{} {} - {}",
                strip.chapter_number, strip.chapter_title, strip.page_number
            );

            chapters.entry(strip.chapter_number.clone()).or_insert_with(|| {
                Chapter::new(
                    Some(link.clone()),
                    strip.chapter_title.clone(),
                    strip.chapter_number.clone(),
                    None,
                )
            });

            // `Comic 0` 为站点自带的封面占位页
            if strip.page_number == 0 {
                continue;
            }
            discovery
                .pages
                .entry(strip.chapter_number)
                .or_default()
                .push(Page::new(Some(link.clone()), strip.page_number));
            discovery.images.insert(link, strip.image_url);
        }

        Ok((chapters.into_values().collect(), discovery))
    }
}

#[async_trait]
impl SiteAdapter for ComicSeries {
    fn id(&self) -> &str {
        ID
    }

    fn slug(&self) -> &str {
        &self.slug
    }

    async fn get_metadata(&self) -> Result<Metadata> {
        let url = self.index_url();
        let html = self.ctx.fetcher.fetch_text(&url, false).await?;
        self.parse_metadata(&html, &url)
    }

    async fn get_chapters(&self) -> Result<Vec<Chapter>> {
        let (chapters, discovery) = self.discover().await?;
        *self.discovered.lock() = Some(discovery);
        Ok(chapters)
    }

    async fn get_pages(&self, chapter: &Chapter) -> Result<Vec<Page>> {
        if self.discovered.lock().is_none() {
            let (_, discovery) = self.discover().await?;
            *self.discovered.lock() = Some(discovery);
        }

        let guard = self.discovered.lock();
        Ok(guard
            .as_ref()
            .and_then(|d| d.pages.get(&chapter.number))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_image(&self, page: &Page) -> Result<String> {
        let url = page
            .url
            .as_deref()
            .ok_or_else(|| SpiderError::structure(self.index_url(), format!("url of page {}", page.number)))?;

        let known = self
            .discovered
            .lock()
            .as_ref()
            .and_then(|d| d.images.get(url).cloned());
        if let Some(image) = known {
            return Ok(image);
        }

        let html = self.ctx.fetcher.fetch_text(url, true).await?;
        Ok(Self::parse_strip(&html, url)?.image_url)
    }
}
