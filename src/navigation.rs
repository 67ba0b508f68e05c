use crate::i18n::{LanguageCatalog, LanguageCode};
use serde::Serialize;

/// Where the site is served from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteAddress {
    /// Scheme and authority, without trailing slash (e.g. "https://example.github.io")
    pub origin: String,
    pub hostname: String,
    /// Hosts ending in this serve each project under `/{repository}/`
    pub subpath_host_suffix: String,
}

impl SiteAddress {
    pub fn new(origin: &str, subpath_host_suffix: &str) -> Self {
        let origin = origin.trim_end_matches('/').to_string();
        let hostname = hostname_of(&origin);
        Self {
            origin,
            hostname,
            subpath_host_suffix: subpath_host_suffix.to_string(),
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    fn serves_subpaths(&self) -> bool {
        !self.subpath_host_suffix.is_empty() && self.hostname.ends_with(&self.subpath_host_suffix)
    }
}

/// Host part of an origin such as "https://user.github.io:443"
pub fn hostname_of(origin: &str) -> String {
    let without_scheme = origin.split_once("://").map_or(origin, |(_, rest)| rest);
    without_scheme
        .split(['/', ':'])
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Redirect the presentation layer should perform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationRequest {
    pub target_code: LanguageCode,
    pub url: String,
}

/// Repository prefix of `current_path` on a subpath-style host.
///
/// The first segment is the repository name when it is a directory (followed
/// by `/`) and not itself a catalog code.
pub fn detect_repo_prefix(
    site: &SiteAddress,
    current_path: &str,
    catalog: &LanguageCatalog,
) -> Option<String> {
    if !site.serves_subpaths() {
        return None;
    }

    let trimmed = current_path.trim_start_matches('/');
    let (first, _) = trimmed.split_once('/')?;
    if first.is_empty() || catalog.contains(first) {
        return None;
    }
    Some(format!("/{}", first))
}

/// Entry point of `code` on this site: `{origin}{repo prefix}/{code}/index.html`
pub fn build_language_url(
    site: &SiteAddress,
    current_path: &str,
    code: LanguageCode,
    catalog: &LanguageCatalog,
) -> String {
    let repo_prefix = detect_repo_prefix(site, current_path, catalog).unwrap_or_default();
    format!("{}{}/{}/index.html", site.origin, repo_prefix, code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(value: &str) -> LanguageCode {
        LanguageCode::from_code(LanguageCatalog::get(), value).unwrap()
    }

    fn pages_site() -> SiteAddress {
        SiteAddress::new("https://someone.github.io", "github.io")
    }

    #[test]
    fn test_hostname_of() {
        assert_eq!(hostname_of("https://someone.github.io"), "someone.github.io");
        assert_eq!(hostname_of("http://localhost:8080/"), "localhost");
        assert_eq!(hostname_of("example.com"), "example.com");
    }

    #[test]
    fn test_plain_host_has_no_prefix() {
        let site = SiteAddress::new("https://example.com/", "github.io");
        let url =
            build_language_url(&site, "/repo/ja/index.html", code("pt"), LanguageCatalog::get());
        assert_eq!(url, "https://example.com/pt/index.html");
    }

    #[test]
    fn test_pages_host_keeps_repository_prefix() {
        let url = build_language_url(
            &pages_site(),
            "/karumaru/ja/index.html",
            code("zh-TW"),
            LanguageCatalog::get(),
        );
        assert_eq!(url, "https://someone.github.io/karumaru/zh-TW/index.html");
    }

    #[test]
    fn test_pages_host_language_first_segment_is_not_prefix() {
        let url =
            build_language_url(&pages_site(), "/en/index.html", code("fr"), LanguageCatalog::get());
        assert_eq!(url, "https://someone.github.io/fr/index.html");
    }

    #[test]
    fn test_pages_host_root_file_is_not_prefix() {
        assert_eq!(detect_repo_prefix(&pages_site(), "/index.html", LanguageCatalog::get()), None);
        assert_eq!(detect_repo_prefix(&pages_site(), "/", LanguageCatalog::get()), None);
        assert_eq!(
            detect_repo_prefix(&pages_site(), "/karumaru/", LanguageCatalog::get()),
            Some("/karumaru".to_string())
        );
    }

    #[test]
    fn test_empty_suffix_disables_prefix_detection() {
        let site = SiteAddress::new("https://someone.github.io", "");
        assert_eq!(detect_repo_prefix(&site, "/karumaru/", LanguageCatalog::get()), None);
    }

    #[test]
    fn test_hostname_override() {
        let site = SiteAddress::new("http://127.0.0.1:4000", "github.io")
            .with_hostname("mirror.github.io");
        let url = build_language_url(&site, "/repo/", code("ja"), LanguageCatalog::get());
        assert_eq!(url, "http://127.0.0.1:4000/repo/ja/index.html");
    }
}
