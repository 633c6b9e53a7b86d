use std::cmp::Ordering;

/// 未分卷章节的归组标识
pub const UNASSIGNED_VOLUME: &str = "TBD";

/// 作品元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// 稳定唯一标识，用于缓存与文件命名
    pub slug: String,
    pub title: String,
    pub cover_url: Option<String>,
}

impl Metadata {
    pub fn new(slug: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            title: title.into(),
            cover_url: None,
        }
    }
}

/// 卷信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    /// 站点定义的卷标，不假定为数字
    pub number: String,
    /// 按插入顺序保存，打包时再按章节号排序
    pub chapters: Vec<Chapter>,
}

impl Volume {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            chapters: Vec::new(),
        }
    }

    pub fn add_chapter(&mut self, chapter: Chapter) {
        self.chapters.push(chapter);
    }

    /// 阅读顺序的章节视图
    pub fn sorted_chapters(&self) -> Vec<&Chapter> {
        let mut chapters: Vec<&Chapter> = self.chapters.iter().collect();
        chapters.sort_by(|a, b| compare_numbers(&a.number, &b.number));
        chapters
    }

    pub fn page_count(&self) -> usize {
        self.chapters.iter().map(|c| c.pages.len()).sum()
    }
}

/// 章节信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub url: Option<String>,
    pub title: String,
    /// 排序键，可能带小数 (如 "10.5")
    pub number: String,
    pub volume: Option<String>,
    pub pages: Vec<Page>,
}

impl Chapter {
    pub fn new(
        url: Option<String>,
        title: impl Into<String>,
        number: impl Into<String>,
        volume: Option<String>,
    ) -> Self {
        Self {
            url,
            title: title.into(),
            number: number.into(),
            volume,
            pages: Vec::new(),
        }
    }

    pub fn add_page(&mut self, page: Page) {
        self.pages.push(page);
    }

    /// 描述文件中的归属卷标
    pub fn volume_key(&self) -> &str {
        self.volume.as_deref().unwrap_or(UNASSIGNED_VOLUME)
    }

    pub fn sorted_pages(&self) -> Vec<&Page> {
        let mut pages: Vec<&Page> = self.pages.iter().collect();
        pages.sort_by_key(|p| p.number);
        pages
    }
}

/// 页面信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 展示图片的 HTML 页面地址
    pub url: Option<String>,
    /// 最终图片地址，延迟解析
    pub image_url: Option<String>,
    pub number: u32,
}

impl Page {
    pub fn new(url: Option<String>, number: u32) -> Self {
        Self {
            url,
            image_url: None,
            number,
        }
    }
}

/// 卷号/章节号比较
///
/// 两侧均可解析为十进制数时按数值比较，否则数字在前、其余按字典序。
pub fn compare_numbers(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
