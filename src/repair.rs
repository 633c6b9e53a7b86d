//! 旧归档修复
//!
//! 早期生成的 CBZ 条目名未补零 (`ch10-p5.jpg`)，阅读器按字典序排列时顺序错乱。
//! 这里原样复制压缩数据，只改写条目名。

use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use zip::{ZipArchive, ZipWriter};

use crate::core::error::{Result, SpiderError};
use crate::formats::naming::normalize_entry_name;

/// 批量修复结果
#[derive(Debug, Default)]
pub struct RepairReport {
    /// 扫描到的归档数
    pub scanned: usize,
    /// 已改写的归档
    pub repaired: Vec<PathBuf>,
    /// 无需改动的归档数
    pub unchanged: usize,
    /// 无法处理的归档及原因
    pub failed: Vec<(PathBuf, String)>,
}

/// 递归修复目录下的全部 `.cbz`；单个归档损坏不影响其他归档
pub fn repair_tree(root: &Path) -> Result<RepairReport> {
    let mut archives = Vec::new();
    collect_archives(root, &mut archives)?;
    archives.sort();

    let mut report = RepairReport::default();
    for path in archives {
        report.scanned += 1;
        match repair_archive(&path) {
            Ok(true) => {
                info!("已修复 {:?}", path);
                report.repaired.push(path);
            }
            Ok(false) => {
                debug!("无需修复 {:?}", path);
                report.unchanged += 1;
            }
            Err(e) => {
                warn!("{}", e);
                report.failed.push((path, e.to_string()));
            }
        }
    }

    Ok(report)
}

fn collect_archives(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    if dir.is_file() {
        if is_cbz(dir) {
            out.push(dir.to_path_buf());
        }
        return Ok(());
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_archives(&path, out)?;
        } else if is_cbz(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn is_cbz(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("cbz"))
}

fn corrupt(path: &Path, reason: impl ToString) -> SpiderError {
    SpiderError::ArchiveCorruption {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// 修复单个归档，返回是否改写
///
/// 新归档先写入同目录临时文件，完成后替换原文件。
pub fn repair_archive(path: &Path) -> Result<bool> {
    let mut archive = ZipArchive::new(File::open(path)?).map_err(|e| corrupt(path, e))?;

    let mut names = Vec::with_capacity(archive.len());
    let mut plan = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let name = archive
            .by_index_raw(i)
            .map_err(|e| corrupt(path, e))?
            .name()
            .to_string();
        plan.push(normalize_entry_name(&name).filter(|n| *n != name));
        names.push(name);
    }

    if plan.iter().all(Option::is_none) {
        return Ok(false);
    }
    check_collisions(path, &names, &plan)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let result = rewrite(path, &mut archive, &plan, &tmp);
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result?;

    fs::rename(&tmp, path)?;
    Ok(true)
}

/// 改名后的条目名必须互不相同
fn check_collisions(path: &Path, names: &[String], plan: &[Option<String>]) -> Result<()> {
    let mut seen = HashSet::with_capacity(names.len());
    for (name, rename) in names.iter().zip(plan) {
        let target = rename.as_ref().unwrap_or(name);
        if !seen.insert(target.as_str()) {
            return Err(SpiderError::EntryCollision {
                path: path.to_path_buf(),
                name: target.clone(),
            });
        }
    }
    Ok(())
}

fn rewrite(
    path: &Path,
    archive: &mut ZipArchive<File>,
    plan: &[Option<String>],
    tmp: &Path,
) -> Result<()> {
    let mut writer = ZipWriter::new(File::create(tmp)?);

    for (i, rename) in plan.iter().enumerate() {
        let entry = archive.by_index_raw(i).map_err(|e| corrupt(path, e))?;
        match rename {
            Some(name) => {
                debug!("{} -> {}", entry.name(), name);
                writer
                    .raw_copy_file_rename(entry, name.as_str())
                    .map_err(|e| corrupt(path, e))?;
            }
            None => writer.raw_copy_file(entry).map_err(|e| corrupt(path, e))?,
        }
    }

    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use zip::CompressionMethod;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn write_archive(path: &Path, entries: &[(&str, &[u8], CompressionMethod)]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, data, method) in entries {
            zip.start_file(*name, SimpleFileOptions::default().compression_method(*method))
                .unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn read_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut entry = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                (entry.name().to_string(), data)
            })
            .collect()
    }

    #[test]
    fn renames_legacy_entries_and_keeps_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("opm");
        fs::create_dir_all(&nested).unwrap();
        let legacy = nested.join("opm-v1.cbz");
        write_archive(
            &legacy,
            &[
                ("ch10-p5.jpg", b"page five", CompressionMethod::Stored),
                ("ch9-p12.jpg", b"page twelve page twelve", CompressionMethod::Deflated),
                ("ComicInfo.xml", b"<ComicInfo/>", CompressionMethod::Stored),
            ],
        );

        let report = repair_tree(dir.path()).unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.repaired, vec![legacy.clone()]);

        let entries = read_entries(&legacy);
        assert_eq!(
            entries,
            vec![
                ("ch010-p005.jpg".to_string(), b"page five".to_vec()),
                ("ch009-p012.jpg".to_string(), b"page twelve page twelve".to_vec()),
                ("ComicInfo.xml".to_string(), b"<ComicInfo/>".to_vec()),
            ]
        );
        assert!(!nested.join("opm-v1.cbz.tmp").exists());
    }

    #[test]
    fn normalized_archives_are_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("done-v1.cbz");
        write_archive(&path, &[("ch001-p001.jpg", b"x", CompressionMethod::Stored)]);
        let before = fs::read(&path).unwrap();

        let report = repair_tree(dir.path()).unwrap();
        assert_eq!(report.unchanged, 1);
        assert!(report.repaired.is_empty());
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn rename_onto_existing_entry_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup-v1.cbz");
        write_archive(
            &path,
            &[
                ("ch10-p5.jpg", b"old", CompressionMethod::Stored),
                ("ch010-p005.jpg", b"new", CompressionMethod::Stored),
            ],
        );
        let before = fs::read(&path).unwrap();

        let err = repair_archive(&path).unwrap_err();
        assert!(matches!(err, SpiderError::EntryCollision { ref name, .. } if name == "ch010-p005.jpg"));
        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(!dir.path().join("dup-v1.cbz.tmp").exists());

        let report = repair_tree(dir.path()).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].1.contains("twice"));
    }

    #[test]
    fn corrupt_archive_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.cbz"), b"definitely not a zip").unwrap();
        let good = dir.path().join("good-v1.cbz");
        write_archive(&good, &[("ch1-p1.png", b"img", CompressionMethod::Stored)]);
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let report = repair_tree(dir.path()).unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].0.ends_with("broken.cbz"));
        assert_eq!(report.repaired, vec![good.clone()]);
        assert_eq!(read_entries(&good)[0].0, "ch001-p001.png");
    }
}
