//! 描述文件存储 (Descriptor Store)
//!
//! 抓取阶段与打包阶段之间唯一的持久化检查点。
//! 采用 XML 元素/属性树：metadata → volume → chapter → page。
//! 标题写在属性里：quick-xml 读取文本节点时会裁掉首尾空白，属性值则原样保留。
//! 旧版以 `<title>` 子元素保存的文件仍可读取。

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::{Result, SpiderError};
use crate::core::model::{Chapter, Metadata, Page, UNASSIGNED_VOLUME, Volume, compare_numbers};

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// 内存中的描述文件
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub metadata: Metadata,
    /// 卷号 → 卷，保持首次出现顺序
    pub volumes: IndexMap<String, Volume>,
}

/// 打包时延迟解析出的图片地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub volume: String,
    pub chapter: String,
    pub page: u32,
    pub image_url: String,
}

impl Descriptor {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            volumes: IndexMap::new(),
        }
    }

    /// 将章节归入所属卷 (不存在则创建)
    pub fn add_chapter(&mut self, chapter: Chapter) {
        let key = chapter.volume_key().to_string();
        self.volumes
            .entry(key.clone())
            .or_insert_with(|| Volume::new(key))
            .add_chapter(chapter);
    }

    pub fn add_volume(&mut self, volume: Volume) {
        self.volumes.insert(volume.number.clone(), volume);
    }

    /// 按卷号排序的卷视图
    pub fn sorted_volumes(&self) -> Vec<&Volume> {
        let mut volumes: Vec<&Volume> = self.volumes.values().collect();
        volumes.sort_by(|a, b| compare_numbers(&a.number, &b.number));
        volumes
    }

    pub fn chapter_count(&self) -> usize {
        self.volumes.values().map(|v| v.chapters.len()).sum()
    }

    /// 回写打包阶段解析出的图片地址，返回实际更新的页数
    pub fn apply_resolved(&mut self, resolved: &[ResolvedImage]) -> usize {
        let mut applied = 0;
        for item in resolved {
            let page = self
                .volumes
                .get_mut(&item.volume)
                .and_then(|v| v.chapters.iter_mut().find(|c| c.number == item.chapter))
                .and_then(|c| c.pages.iter_mut().find(|p| p.number == item.page));

            if let Some(page) = page
                && page.image_url.as_deref() != Some(item.image_url.as_str())
            {
                page.image_url = Some(item.image_url.clone());
                applied += 1;
            }
        }
        applied
    }

    /// 从文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path)?;
        let descriptor = Self::from_xml(&xml)?;
        debug!(
            "Loaded descriptor {:?}: {} volumes, {} chapters",
            path,
            descriptor.volumes.len(),
            descriptor.chapter_count()
        );
        Ok(descriptor)
    }

    /// 保存到文件 (先写临时文件再替换，避免中断留下残缺文件)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let xml = self.to_xml()?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        std::fs::write(&tmp, xml)?;
        std::fs::rename(&tmp, path)?;
        debug!("Saved descriptor {:?}", path);
        Ok(())
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        let tag: DescriptorTag =
            quick_xml::de::from_str(xml).map_err(|e| SpiderError::Descriptor(e.to_string()))?;
        Ok(tag.into())
    }

    pub fn to_xml(&self) -> Result<String> {
        let tag = DescriptorTag::from(self);
        let mut buffer = String::new();
        buffer.push_str(XML_DECLARATION);
        buffer.push('\n');

        let mut ser = quick_xml::se::Serializer::new(&mut buffer);
        ser.indent(' ', 2);
        tag.serialize(ser)
            .map_err(|e| SpiderError::Descriptor(e.to_string()))?;
        buffer.push('\n');
        Ok(buffer)
    }
}

// ============================================================================
// XML 结构映射
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "descriptor")]
struct DescriptorTag {
    metadata: MetadataTag,
    #[serde(rename = "volume", default)]
    volumes: Vec<VolumeTag>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MetadataTag {
    #[serde(rename = "@slug")]
    slug: String,
    #[serde(rename = "@title", default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(rename = "title", default, skip_serializing)]
    legacy_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cover: Option<CoverTag>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CoverTag {
    #[serde(rename = "@url")]
    url: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct VolumeTag {
    #[serde(rename = "@number")]
    number: String,
    #[serde(rename = "chapter", default)]
    chapters: Vec<ChapterTag>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChapterTag {
    #[serde(rename = "@number")]
    number: String,
    #[serde(rename = "@url", default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(rename = "@title", default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(rename = "title", default, skip_serializing)]
    legacy_title: Option<String>,
    #[serde(rename = "page", default)]
    pages: Vec<PageTag>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PageTag {
    #[serde(rename = "@number")]
    number: u32,
    /// 已解析的图片地址
    #[serde(rename = "@url", default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    /// 尚未解析时保留的页面地址
    #[serde(rename = "@source", default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

impl From<&Descriptor> for DescriptorTag {
    fn from(d: &Descriptor) -> Self {
        DescriptorTag {
            metadata: MetadataTag {
                slug: d.metadata.slug.clone(),
                title: Some(d.metadata.title.clone()),
                legacy_title: None,
                cover: d.metadata.cover_url.clone().map(|url| CoverTag { url }),
            },
            volumes: d
                .volumes
                .values()
                .map(|volume| VolumeTag {
                    number: volume.number.clone(),
                    chapters: volume
                        .chapters
                        .iter()
                        .map(|chapter| ChapterTag {
                            number: chapter.number.clone(),
                            url: chapter.url.clone(),
                            title: Some(chapter.title.clone()),
                            legacy_title: None,
                            pages: chapter
                                .pages
                                .iter()
                                .map(|page| PageTag {
                                    number: page.number,
                                    url: page.image_url.clone(),
                                    source: match page.image_url {
                                        Some(_) => None,
                                        None => page.url.clone(),
                                    },
                                })
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl From<DescriptorTag> for Descriptor {
    fn from(tag: DescriptorTag) -> Self {
        let mut descriptor = Descriptor::new(Metadata {
            slug: tag.metadata.slug,
            title: tag.metadata.title.or(tag.metadata.legacy_title).unwrap_or_default(),
            cover_url: tag.metadata.cover.map(|c| c.url),
        });

        for volume_tag in tag.volumes {
            let assigned = (volume_tag.number != UNASSIGNED_VOLUME).then(|| volume_tag.number.clone());
            let mut volume = Volume::new(volume_tag.number);

            for chapter_tag in volume_tag.chapters {
                let mut chapter = Chapter::new(
                    chapter_tag.url,
                    chapter_tag.title.or(chapter_tag.legacy_title).unwrap_or_default(),
                    chapter_tag.number,
                    assigned.clone(),
                );
                for page_tag in chapter_tag.pages {
                    chapter.add_page(Page {
                        url: page_tag.source,
                        image_url: page_tag.url,
                        number: page_tag.number,
                    });
                }
                volume.add_chapter(chapter);
            }

            descriptor.add_volume(volume);
        }

        descriptor
    }
}
