//! 归档与条目命名
//!
//! 章节号与页码补零到三位，使归档内的字典序与阅读顺序一致。

use std::sync::OnceLock;

use regex::Regex;

static ENTRY_PATTERN: OnceLock<Regex> = OnceLock::new();

/// 旧版条目名 `ch<chapter>-p<page>.<ext>`
pub fn entry_pattern() -> &'static Regex {
    ENTRY_PATTERN.get_or_init(|| {
        Regex::new(r"^ch(?P<chap>[^-]+)-p(?P<page>\d+)\.(?P<ext>\w+)$").unwrap()
    })
}

/// 章节号规范化：整数部分补零到三位，保留非零小数部分
///
/// `10` -> `010`, `10.5` -> `010.5`, `010.50` -> `010.5`, `10.0` -> `010`；
/// 非数字章节号左侧补 `0` 到三位。
pub fn normalize_chapter_number(number: &str) -> String {
    let number = number.trim();
    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));

    let is_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if int_part.is_empty() || !is_digits(int_part) || !is_digits(frac_part) {
        return format!("{number:0>3}");
    }

    let int_part = pad_digits(int_part);
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part
    } else {
        format!("{int_part}.{frac_part}")
    }
}

/// 数字串去掉多余前导零后补到三位
fn pad_digits(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    let trimmed = if trimmed.is_empty() { "0" } else { trimmed };
    format!("{trimmed:0>3}")
}

/// 归档内条目名
pub fn entry_name(chapter: &str, page: u32, ext: &str) -> String {
    format!(
        "ch{}-p{page:0>3}.{ext}",
        normalize_chapter_number(chapter)
    )
}

/// 旧条目名的规范形式；不符合旧格式时返回 `None`
pub fn normalize_entry_name(name: &str) -> Option<String> {
    let caps = entry_pattern().captures(name)?;
    Some(format!(
        "ch{}-p{}.{}",
        normalize_chapter_number(&caps["chap"]),
        pad_digits(&caps["page"]),
        &caps["ext"]
    ))
}

/// 单卷归档文件名
pub fn archive_name(slug: &str, volume: &str, ext: &str) -> String {
    format!("{slug}-v{volume}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("10", "010")]
    #[case("1", "001")]
    #[case("010", "010")]
    #[case("1234", "1234")]
    #[case("10.5", "010.5")]
    #[case("010.50", "010.5")]
    #[case("10.0", "010")]
    #[case("0", "000")]
    #[case("x", "00x")]
    #[case("extra", "extra")]
    fn normalizes_chapter_numbers(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_chapter_number(input), expected);
    }

    #[rstest]
    #[case("10", 5, "jpg", "ch010-p005.jpg")]
    #[case("10.5", 12, "png", "ch010.5-p012.png")]
    #[case("2", 1000, "jpg", "ch002-p1000.jpg")]
    fn builds_entry_names(#[case] chapter: &str, #[case] page: u32, #[case] ext: &str, #[case] expected: &str) {
        assert_eq!(entry_name(chapter, page, ext), expected);
    }

    #[rstest]
    #[case("ch10-p5.jpg", Some("ch010-p005.jpg"))]
    #[case("ch010-p005.jpg", Some("ch010-p005.jpg"))]
    #[case("ch10.5-p05.png", Some("ch010.5-p005.png"))]
    #[case("ComicInfo.xml", None)]
    #[case("cover.jpg", None)]
    fn normalizes_legacy_entries(#[case] name: &str, #[case] expected: Option<&str>) {
        assert_eq!(normalize_entry_name(name).as_deref(), expected);
    }

    #[test]
    fn lexical_order_matches_reading_order() {
        let mut names = vec![
            entry_name("10", 1, "jpg"),
            entry_name("9", 12, "jpg"),
            entry_name("9", 2, "jpg"),
            entry_name("9.5", 1, "jpg"),
        ];
        names.sort();
        assert_eq!(
            names,
            vec![
                "ch009-p002.jpg",
                "ch009-p012.jpg",
                "ch009.5-p001.jpg",
                "ch010-p001.jpg"
            ]
        );
    }

    #[test]
    fn names_archives() {
        assert_eq!(archive_name("onepunch_man", "01", "cbz"), "onepunch_man-v01.cbz");
    }
}
