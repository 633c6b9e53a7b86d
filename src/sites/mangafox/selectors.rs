//! Mangafox 选择器
//!
//! 预编译的 CSS 选择器

use std::sync::OnceLock;

use scraper::Selector;

/// 站点选择器集合
pub struct SiteSelectors {
    pub title: Selector,
    pub cover_img: Selector,
    pub chapter_link: Selector,
    pub chapter_title: Selector,
    pub page_select: Selector,
    pub page_option: Selector,
    pub image: Selector,
}

static SELECTORS: OnceLock<SiteSelectors> = OnceLock::new();

impl SiteSelectors {
    /// 获取全局选择器实例
    pub fn get() -> &'static SiteSelectors {
        SELECTORS.get_or_init(|| SiteSelectors {
            title: Selector::parse("h1").unwrap(),
            cover_img: Selector::parse("div.cover img").unwrap(),
            chapter_link: Selector::parse("a.tips").unwrap(),
            chapter_title: Selector::parse("span.title").unwrap(),
            page_select: Selector::parse("select.m").unwrap(),
            page_option: Selector::parse("option").unwrap(),
            image: Selector::parse("img#image").unwrap(),
        })
    }
}
