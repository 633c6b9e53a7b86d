//! 内容寻址字节缓存 (Content-addressed Byte Cache)
//!
//! URL 的 BLAKE3 摘要按固定宽度切分为嵌套目录，避免单目录文件过多。
//! 无淘汰策略，缓存目录由使用者自行管理。

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::fs;

use crate::core::error::Result;

/// 目录分段宽度 (十六进制字符)
const SEGMENT_WIDTH: usize = 8;

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct ByteCache {
    root: PathBuf,
}

impl ByteCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// URL → 缓存文件路径
    pub fn path_for(&self, url: &str) -> PathBuf {
        let digest = blake3::hash(url.as_bytes()).to_hex();
        let hex = digest.as_str();

        let mut path = self.root.clone();
        for start in (0..hex.len()).step_by(SEGMENT_WIDTH) {
            path.push(&hex[start..(start + SEGMENT_WIDTH).min(hex.len())]);
        }
        path
    }

    /// 读取缓存，未命中返回 None
    pub async fn read(&self, url: &str) -> Result<Option<Bytes>> {
        match fs::read(self.path_for(url)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 写入缓存
    ///
    /// 先写临时文件再重命名，并发写同一键时后写者覆盖，内容一致。
    pub async fn write(&self, url: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(url);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension(format!(
            "{}-{}.tmp",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &path).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_digest_into_nested_segments() {
        let cache = ByteCache::new("cache");
        let path = cache.path_for("http://img.example/1.jpg");
        let segments: Vec<_> = path
            .strip_prefix("cache")
            .unwrap()
            .iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect();

        assert_eq!(segments.len(), 64 / SEGMENT_WIDTH);
        assert!(segments.iter().all(|s| s.len() == SEGMENT_WIDTH));
        assert_eq!(path, cache.path_for("http://img.example/1.jpg"));
        assert_ne!(path, cache.path_for("http://img.example/2.jpg"));
    }

    #[tokio::test]
    async fn reads_back_written_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ByteCache::new(dir.path());
        let url = "http://img.example/1.jpg";

        assert!(cache.read(url).await.unwrap().is_none());

        let path = cache.write(url, b"jpeg-bytes").await.unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(cache.read(url).await.unwrap().unwrap(), Bytes::from_static(b"jpeg-bytes"));

        // 覆盖写入不留下临时文件
        cache.write(url, b"jpeg-bytes").await.unwrap();
        let siblings = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(siblings, 1);
    }
}
