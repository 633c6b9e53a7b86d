//! Mangafox 站点模块
//!
//! 作品索引页提供标题、封面与章节链接；章节页的 `select.m` 列出页码，
//! 每个页面再单独展示一张图片。

mod selectors;

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::debug;
use url::Url;

use crate::core::config::SiteConfig;
use crate::core::error::{Result, SpiderError};
use crate::core::model::{Chapter, Metadata, Page};
use crate::interfaces::SiteAdapter;
use crate::network::context::ServiceContext;
use crate::utils::to_absolute_url;

use self::selectors::SiteSelectors;

pub const ID: &str = "mangafox";

static URL_PATTERN: OnceLock<Regex> = OnceLock::new();

fn url_pattern() -> &'static Regex {
    URL_PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<base>https?://(?:www\.)?(?:mangafox|fanfox)\.\w+)/manga/(?P<slug>[a-z0-9_]+)(?:(?:/v(?P<volume>[^/]+))?/c(?P<chapter>[^/]+)/(?P<page>[^/]+)\.html)?",
        )
        .unwrap()
    })
}

/// URL 是否属于 Mangafox
pub fn matches(url: &str) -> bool {
    url_pattern().is_match(url)
}

/// Mangafox 站点实现
pub struct Mangafox {
    ctx: ServiceContext,
    base: Url,
    slug: String,
}

impl Mangafox {
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
        })
    }

    /// 作品索引页
    fn manga_url(&self) -> String {
        to_absolute_url(&self.base, &format!("/manga/{}/", self.slug))
    }

    fn parse_metadata(&self, html: &str, url: &str) -> Result<Metadata> {
        let doc = Html::parse_document(html);
        let s = SiteSelectors::get();

        let title = doc
            .select(&s.title)
            .next()
            .map(|h| h.text().collect::<String>().trim().to_string())
            .ok_or_else(|| SpiderError::structure(url, "h1"))?;

        let mut metadata = Metadata::new(&self.slug, title);
        metadata.cover_url = doc
            .select(&s.cover_img)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|src| to_absolute_url(&self.base, src));

        Ok(metadata)
    }

    fn parse_chapters(&self, html: &str, url: &str) -> Result<Vec<Chapter>> {
        let doc = Html::parse_document(html);
        let s = SiteSelectors::get();

        let mut chapters = Vec::new();
        for link in doc.select(&s.chapter_link) {
            let href = link
                .value()
                .attr("href")
                .ok_or_else(|| SpiderError::structure(url, "a.tips[href]"))?;
            let chapter_url = to_absolute_url(&self.base, href);

            let caps = url_pattern()
                .captures(&chapter_url)
                .filter(|c| c.name("chapter").is_some())
                .ok_or_else(|| SpiderError::structure(url, format!("chapter link {chapter_url}")))?;
            let number = caps["chapter"].to_string();
            let volume = caps.name("volume").map(|v| v.as_str().to_string());

            let title = link
                .parent()
                .and_then(ElementRef::wrap)
                .and_then(|parent| parent.select(&s.chapter_title).next())
                .map(|t| t.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| format!("Chapter {number}"));

            chapters.push(Chapter::new(Some(chapter_url), title, number, volume));
        }

        if chapters.is_empty() {
            return Err(SpiderError::structure(url, "a.tips"));
        }
        Ok(chapters)
    }

    fn parse_pages(html: &str, chapter_url: &str) -> Result<Vec<Page>> {
        let doc = Html::parse_document(html);
        let s = SiteSelectors::get();

        let select = doc
            .select(&s.page_select)
            .next()
            .ok_or_else(|| SpiderError::structure(chapter_url, "select.m"))?;
        let base = Url::parse(chapter_url)
            .map_err(|e| SpiderError::Parse(format!("{chapter_url}: {e}")))?;

        let mut pages = Vec::new();
        for option in select.select(&s.page_option) {
            let value = option
                .value()
                .attr("value")
                .ok_or_else(|| SpiderError::structure(chapter_url, "option[value]"))?
                .trim();
            let number: u32 = value.parse().map_err(|_| {
                SpiderError::Parse(format!("{chapter_url}: page option {value:?} is not a number"))
            })?;
            // 0 为“评论”占位项
            if number == 0 {
                continue;
            }
            let page_url = to_absolute_url(&base, &format!("{number}.html"));
            pages.push(Page::new(Some(page_url), number));
        }

        Ok(pages)
    }

    fn parse_image(html: &str, url: &str) -> Result<String> {
        let doc = Html::parse_document(html);
        let s = SiteSelectors::get();

        let src = doc
            .select(&s.image)
            .next()
            .and_then(|img| img.value().attr("src"))
            .ok_or_else(|| SpiderError::structure(url, "img#image"))?;

        let base = Url::parse(url).map_err(|e| SpiderError::Parse(format!("{url}: {e}")))?;
        Ok(to_absolute_url(&base, src))
    }
}

#[async_trait]
impl SiteAdapter for Mangafox {
    fn id(&self) -> &str {
        ID
    }

    fn slug(&self) -> &str {
        &self.slug
    }

    async fn get_metadata(&self) -> Result<Metadata> {
        let url = self.manga_url();
        let html = self.ctx.fetcher.fetch_text(&url, false).await?;
        self.parse_metadata(&html, &url)
    }

    async fn get_chapters(&self) -> Result<Vec<Chapter>> {
        let url = self.manga_url();
        let html = self.ctx.fetcher.fetch_text(&url, false).await?;
        let chapters = self.parse_chapters(&html, &url)?;
        debug!("{} 个章节链接", chapters.len());
        Ok(chapters)
    }

    async fn get_pages(&self, chapter: &Chapter) -> Result<Vec<Page>> {
        let url = chapter
            .url
            .as_deref()
            .ok_or_else(|| SpiderError::structure(self.manga_url(), format!("url of chapter {}", chapter.number)))?;
        let html = self.ctx.fetcher.fetch_text(url, false).await?;
        Self::parse_pages(&html, url)
    }

    async fn get_image(&self, page: &Page) -> Result<String> {
        let url = page
            .url
            .as_deref()
            .ok_or_else(|| SpiderError::structure(self.manga_url(), format!("url of page {}", page.number)))?;
        let html = self.ctx.fetcher.fetch_text(url, false).await?;
        Self::parse_image(&html, url)
    }
}
