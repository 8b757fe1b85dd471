//! Icon resolution: custom override > cached favicon > derived favicon-service
//! URL > builtin placeholder.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

pub const PLACEHOLDER_LINK: &str = "_default";
pub const PLACEHOLDER_FOLDER: &str = "_default_folder";
/// `data:` links have no hostname to derive a favicon from.
pub const PLACEHOLDER_DATA_LINK: &str = "_default_data";

pub const DEFAULT_FAVICON_SERVICE: &str = "https://www.google.com/s2/favicons?domain={host}&sz={size}";

/// Builtin dock icon (settings gear and handler fallback).
pub const BUILTIN_ICON: &str = "data:image/svg+xml;base64,PHN2ZyB4bWxucz0iaHR0cDovL3d3dy53My5vcmcvMjAwMC9zdmciIHZpZXdCb3g9IjAgMCAyNCAyNCI+PGNpcmNsZSBjeD0iMTIiIGN5PSIxMiIgcj0iOSIgZmlsbD0iIzAwN2FmZiIvPjwvc3ZnPg==";

/// Fully transparent 1x1 image shown until a lazy icon becomes visible.
pub const TRANSPARENT_PIXEL: &str = "data:image/svg+xml;base64,PHN2ZyB4bWxucz0iaHR0cDovL3d3dy53My5vcmcvMjAwMC9zdmciIHZpZXdCb3g9IjAgMCAxIDEiPjwvc3ZnPg==";

/// Any sentinel starting with `_default` is drawn by the page, not loaded.
pub fn is_placeholder(icon_url: &str) -> bool {
    icon_url.starts_with(PLACEHOLDER_LINK)
}

/// A favicon fetched once and kept under its bookmark id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaviconCacheEntry {
    /// The bookmark url the icon was fetched for.  A cached icon only
    /// applies while the bookmark still points there.
    pub page_url: String,
    /// Embeddable `data:` URL.
    pub data: String,
}

/// Builds favicon-service URLs from a page URL's hostname.
#[derive(Debug, Clone, PartialEq)]
pub struct FaviconService {
    template: String,
    size: u32,
}

impl Default for FaviconService {
    fn default() -> Self {
        Self::new(DEFAULT_FAVICON_SERVICE, 128)
    }
}

impl FaviconService {
    /// `template` may contain `{host}` and `{size}`.
    pub fn new(template: impl Into<String>, size: u32) -> Self {
        Self {
            template: template.into(),
            size,
        }
    }

    /// `None` for anything without a hostname (malformed, `data:`,
    /// `javascript:`, `file:`).
    pub fn url_for(&self, page_url: &str) -> Option<String> {
        let parsed = Url::parse(page_url).ok()?;
        let host = parsed.host_str().filter(|h| !h.is_empty())?;
        Some(
            self.template
                .replace("{host}", host)
                .replace("{size}", &self.size.to_string()),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconSource {
    Custom,
    Cached,
    /// Favicon-service URL; should be queued for caching.
    Derived,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIcon {
    pub url: String,
    pub source: IconSource,
}

impl ResolvedIcon {
    fn new(url: impl Into<String>, source: IconSource) -> Self {
        Self {
            url: url.into(),
            source,
        }
    }

    pub fn needs_caching(&self) -> bool {
        self.source == IconSource::Derived
    }
}

/// Pick the display icon for one node.  Never fails: anything unparseable
/// ends at a placeholder.
///
/// `url == None` means the node is a folder.
pub fn resolve_icon(
    id: &str,
    url: Option<&str>,
    custom_icons: &HashMap<String, String>,
    favicon_cache: &HashMap<String, FaviconCacheEntry>,
    service: &FaviconService,
) -> ResolvedIcon {
    if let Some(custom) = custom_icons.get(id).filter(|u| !u.trim().is_empty()) {
        return ResolvedIcon::new(custom.clone(), IconSource::Custom);
    }

    let Some(page_url) = url else {
        return ResolvedIcon::new(PLACEHOLDER_FOLDER, IconSource::Placeholder);
    };

    if let Some(cached) = favicon_cache
        .get(id)
        .filter(|c| c.page_url == page_url && !c.data.is_empty())
    {
        return ResolvedIcon::new(cached.data.clone(), IconSource::Cached);
    }

    if page_url.trim_start().to_ascii_lowercase().starts_with("data:") {
        return ResolvedIcon::new(PLACEHOLDER_DATA_LINK, IconSource::Placeholder);
    }

    match service.url_for(page_url) {
        Some(derived) => ResolvedIcon::new(derived, IconSource::Derived),
        None => ResolvedIcon::new(PLACEHOLDER_LINK, IconSource::Placeholder),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(id: &str, page_url: &str) -> HashMap<String, FaviconCacheEntry> {
        let mut cache = HashMap::new();
        cache.insert(
            id.to_string(),
            FaviconCacheEntry {
                page_url: page_url.to_string(),
                data: "data:image/png;base64,AAAA".to_string(),
            },
        );
        cache
    }

    #[test]
    fn test_custom_override_wins() {
        let mut custom = HashMap::new();
        custom.insert("7".to_string(), "https://icons.example/x.png".to_string());
        let cache = cache_with("7", "https://example.com");

        let icon = resolve_icon(
            "7",
            Some("https://example.com"),
            &custom,
            &cache,
            &FaviconService::default(),
        );
        assert_eq!(icon.url, "https://icons.example/x.png");
        assert_eq!(icon.source, IconSource::Custom);
    }

    #[test]
    fn test_cached_beats_derived() {
        let cache = cache_with("7", "https://example.com");
        let icon = resolve_icon(
            "7",
            Some("https://example.com"),
            &HashMap::new(),
            &cache,
            &FaviconService::default(),
        );
        assert_eq!(icon.source, IconSource::Cached);
        assert!(!icon.needs_caching());
    }

    #[test]
    fn test_stale_cache_is_ignored_after_url_change() {
        let cache = cache_with("7", "https://old.example");
        let icon = resolve_icon(
            "7",
            Some("https://new.example/page"),
            &HashMap::new(),
            &cache,
            &FaviconService::default(),
        );
        assert_eq!(icon.source, IconSource::Derived);
        assert_eq!(
            icon.url,
            "https://www.google.com/s2/favicons?domain=new.example&sz=128"
        );
        assert!(icon.needs_caching());
    }

    #[test]
    fn test_placeholders() {
        let none = HashMap::new();
        let cache = HashMap::new();
        let svc = FaviconService::default();

        assert_eq!(
            resolve_icon("1", None, &none, &cache, &svc).url,
            PLACEHOLDER_FOLDER
        );
        assert_eq!(
            resolve_icon("2", Some("data:text/html,hi"), &none, &cache, &svc).url,
            PLACEHOLDER_DATA_LINK
        );
        assert_eq!(
            resolve_icon("3", Some("not a url"), &none, &cache, &svc).url,
            PLACEHOLDER_LINK
        );
        assert_eq!(
            resolve_icon("4", Some("javascript:void(0)"), &none, &cache, &svc).url,
            PLACEHOLDER_LINK
        );
        assert!(is_placeholder(PLACEHOLDER_DATA_LINK));
        assert!(!is_placeholder(BUILTIN_ICON));
    }

    #[test]
    fn test_custom_template() {
        let svc = FaviconService::new("https://icons.local/{host}.ico?s={size}", 64);
        assert_eq!(
            svc.url_for("https://sub.example.org:8080/a?b").as_deref(),
            Some("https://icons.local/sub.example.org.ico?s=64")
        );
    }
}
