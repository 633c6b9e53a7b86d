use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::core::config::SiteConfig;
use crate::core::error::{Result, SpiderError};
use crate::interfaces::SiteAdapter;
use crate::network::context::ServiceContext;
use crate::utils::unqualified_name;

pub mod comicseries;
pub mod mangafox;

/// 按 URL 自动选择站点
pub const AUTO: &str = "auto";

const NAMESPACE: &str = "adapters";

// ============================================================================
// 站点注册表
// ============================================================================

type AdapterFactory =
    Box<dyn Fn(&str, SiteConfig, ServiceContext) -> Result<Arc<dyn SiteAdapter>> + Send + Sync>;

struct AdapterEntry {
    matcher: fn(&str) -> bool,
    factory: AdapterFactory,
}

/// 名称解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterChoice {
    Auto,
    Named(String),
}

pub struct AdapterRegistry {
    // 注册顺序即 auto 匹配顺序
    entries: IndexMap<String, AdapterEntry>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            entries: IndexMap::new(),
        };
        registry.register(mangafox::ID, mangafox::matches, |url, cfg, ctx| {
            Ok(Arc::new(mangafox::Mangafox::new(url, cfg, ctx)?))
        });
        registry.register(comicseries::ID, comicseries::matches, |url, cfg, ctx| {
            Ok(Arc::new(comicseries::ComicSeries::new(url, cfg, ctx)?))
        });
        registry
    }

    pub fn register<F>(&mut self, id: &str, matcher: fn(&str) -> bool, factory: F)
    where
        F: Fn(&str, SiteConfig, ServiceContext) -> Result<Arc<dyn SiteAdapter>> + Send + Sync + 'static,
    {
        self.entries.insert(
            id.to_string(),
            AdapterEntry {
                matcher,
                factory: Box::new(factory),
            },
        );
    }

    /// 校验名称，不访问网络
    pub fn resolve(&self, name: &str) -> Result<AdapterChoice> {
        let short = unqualified_name(name.trim(), NAMESPACE)?;
        if short == AUTO {
            return Ok(AdapterChoice::Auto);
        }
        if self.entries.contains_key(short) {
            Ok(AdapterChoice::Named(short.to_string()))
        } else {
            Err(SpiderError::Configuration(format!(
                "unknown adapter `{name}` (available: {AUTO}, {})",
                self.list().join(", ")
            )))
        }
    }

    /// 按注册顺序匹配 URL
    pub fn detect(&self, url: &str) -> Result<&str> {
        self.entries
            .iter()
            .find(|(_, entry)| (entry.matcher)(url))
            .map(|(id, _)| id.as_str())
            .ok_or_else(|| SpiderError::Configuration(format!("no adapter recognises {url}")))
    }

    /// 创建站点实例
    pub fn create(&self, name: &str, url: &str, ctx: ServiceContext) -> Result<Arc<dyn SiteAdapter>> {
        let id = match self.resolve(name)? {
            AdapterChoice::Auto => self.detect(url)?.to_string(),
            AdapterChoice::Named(id) => id,
        };
        debug!("使用站点适配器 {id}");

        let entry = self
            .entries
            .get(&id)
            .ok_or_else(|| SpiderError::Configuration(format!("unknown adapter `{id}`")))?;
        let config = ctx.config.site(&id);
        (entry.factory)(url, config, ctx)
    }

    pub fn list(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use super::*;
    use crate::network::testing::{StubTransport, stub_context};

    #[rstest]
    #[case("auto", AdapterChoice::Auto)]
    #[case("mangafox", AdapterChoice::Named("mangafox".into()))]
    #[case("adapters.comicseries", AdapterChoice::Named("comicseries".into()))]
    fn resolves_builtin_names(#[case] name: &str, #[case] expected: AdapterChoice) {
        assert_eq!(AdapterRegistry::new().resolve(name).unwrap(), expected);
    }

    #[rstest]
    #[case("batoto")]
    #[case("plugins.mangafox")]
    fn rejects_unknown_names(#[case] name: &str) {
        assert!(matches!(
            AdapterRegistry::new().resolve(name),
            Err(SpiderError::Configuration(_))
        ));
    }

    #[test]
    fn detects_site_from_url() {
        let registry = AdapterRegistry::new();
        assert_eq!(
            registry.detect("http://mangafox.me/manga/onepunch_man/").unwrap(),
            "mangafox"
        );
        assert_eq!(
            registry.detect("http://rain.thecomicseries.com/").unwrap(),
            "comicseries"
        );
        assert!(registry.detect("http://example.com/").is_err());
    }

    #[rstest]
    #[case("http://mangafox.me/manga/onepunch_man/", "mangafox", "onepunch_man")]
    #[case("http://rain.thecomicseries.com/", "comicseries", "rain")]
    fn auto_creates_detected_adapter(#[case] url: &str, #[case] id: &str, #[case] slug: &str) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = stub_context(dir.path(), Arc::new(StubTransport::new()));

        let site = AdapterRegistry::new().create(AUTO, url, ctx).unwrap();
        assert_eq!(site.id(), id);
        assert_eq!(site.slug(), slug);
    }

    #[test]
    fn named_adapter_validates_url() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(StubTransport::new());
        let ctx = stub_context(dir.path(), transport.clone());

        let err = AdapterRegistry::new()
            .create("mangafox", "http://rain.thecomicseries.com/", ctx)
            .err()
            .unwrap();
        assert!(matches!(err, SpiderError::AdapterMismatch { .. }));
        assert_eq!(transport.calls(), 0);
    }
}
