use std::path::Path;

use url::Url;

use crate::core::error::{Result, SpiderError};

pub fn to_absolute_url(base: &Url, href: &str) -> String {
    if href.is_empty() {
        return String::new();
    }

    if let Some(path_without_slashes) = href.strip_prefix("//") {
        return format!("{}://{}", base.scheme(), path_without_slashes);
    }

    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }

    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// 从图片地址推断扩展名，无法识别时默认 jpg
pub fn image_extension(url: &str) -> String {
    // 去掉查询串与片段
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let file = path.rsplit('/').next().unwrap_or_default();

    Path::new(file)
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| {
            mime_guess::from_ext(ext)
                .first()
                .is_some_and(|m| m.type_() == mime_guess::mime::IMAGE)
        })
        .unwrap_or_else(|| "jpg".to_string())
}

/// 扩展名对应的 MIME 类型
pub fn image_mime(ext: &str) -> &'static str {
    mime_guess::from_ext(ext).first_raw().unwrap_or("image/jpeg")
}

/// 去掉内置命名空间前缀 (`adapters.mangafox` -> `mangafox`)
///
/// 不支持动态加载外部模块，其他前缀一律视为配置错误。
pub fn unqualified_name<'a>(name: &'a str, namespace: &str) -> Result<&'a str> {
    match name.rsplit_once('.') {
        None => Ok(name),
        Some((prefix, short)) if prefix == namespace => Ok(short),
        Some((prefix, _)) => Err(SpiderError::Configuration(format!(
            "{name}: module `{prefix}` cannot be loaded, only built-in {namespace} are available"
        ))),
    }
}

pub async fn file_exists(path: impl AsRef<Path>) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://img.example/a/b/001.jpg", "jpg")]
    #[case("http://img.example/a/b/001.PNG?token=abc", "png")]
    #[case("http://img.example/a/b/001.webp#frag", "webp")]
    #[case("http://img.example/a/b/image", "jpg")]
    #[case("http://img.example/a.b/page.html", "jpg")]
    fn infers_image_extension(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(image_extension(url), expected);
    }

    #[test]
    fn strips_builtin_namespace_only() {
        assert_eq!(unqualified_name("cbz", "formats").unwrap(), "cbz");
        assert_eq!(unqualified_name("formats.cbz", "formats").unwrap(), "cbz");
        assert!(matches!(
            unqualified_name("my_plugin.cbz", "formats"),
            Err(SpiderError::Configuration(_))
        ));
    }

    #[test]
    fn resolves_relative_links() {
        let base = Url::parse("http://mangafox.me/manga/opm/").unwrap();
        assert_eq!(to_absolute_url(&base, "//cdn.example/x.jpg"), "http://cdn.example/x.jpg");
        assert_eq!(to_absolute_url(&base, "c001/1.html"), "http://mangafox.me/manga/opm/c001/1.html");
        assert_eq!(to_absolute_url(&base, "https://other/x"), "https://other/x");
    }
}
