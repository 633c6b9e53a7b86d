//! ComicInfo.xml
//!
//! 漫画阅读器通用的 CBZ 元数据文件。

use serde::Serialize;

use crate::core::error::{Result, SpiderError};
use crate::core::model::{Metadata, Volume};

#[derive(Debug, Serialize)]
#[serde(rename = "ComicInfo")]
struct ComicInfo<'a> {
    #[serde(rename = "Series")]
    series: &'a str,
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Volume")]
    volume: &'a str,
    #[serde(rename = "PageCount")]
    page_count: usize,
}

/// 生成单卷的 ComicInfo.xml
pub fn render(metadata: &Metadata, volume: &Volume, page_count: usize) -> Result<String> {
    let info = ComicInfo {
        series: &metadata.title,
        title: format!("Volume {}", volume.number),
        volume: &volume.number,
        page_count,
    };

    let body = quick_xml::se::to_string(&info).map_err(|e| SpiderError::Parse(e.to_string()))?;
    Ok(format!(r#"<?xml version="1.0" encoding="UTF-8"?>{body}"#))
}
