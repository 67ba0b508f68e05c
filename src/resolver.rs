//! Language resolution: collapse every signal about a visitor into one locale.
//!
//! Signals are tried strongest first and the first one that yields a
//! supported code wins:
//!
//! 1. a catalog code in the URL path (explicit navigation)
//! 2. the visitor's stored choice
//! 3. the country reported by geolocation
//! 4. the client's preferred language tag
//! 5. the site default
//!
//! Geolocation is terminal. Once a country code is known, an unsupported
//! country resolves to the fallback language and the client tag is never
//! consulted.
//!
//! [`resolve`] is pure. All inputs arrive in a [`ResolutionContext`] and the
//! same context always resolves to the same [`ResolvedLanguage`].

use crate::i18n::{LanguageCatalog, LanguageCode};
use crate::location::LocationInfo;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Catalog code for Traditional Chinese
pub const TRADITIONAL_CHINESE: &str = "zh-TW";

/// Catalog code for Simplified Chinese
pub const SIMPLIFIED_CHINESE: &str = "zh";

/// Which signal produced the resolved language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Path,
    Stored,
    Geo,
    GeoFallback,
    Browser,
    Default,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Path => "path",
            Provenance::Stored => "stored",
            Provenance::Geo => "geo",
            Provenance::GeoFallback => "geo-fallback",
            Provenance::Browser => "browser",
            Provenance::Default => "default",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one language chosen for this visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedLanguage {
    pub code: LanguageCode,
    pub provenance: Provenance,
}

impl ResolvedLanguage {
    pub fn new(code: LanguageCode, provenance: Provenance) -> Self {
        Self { code, provenance }
    }
}

/// Everything resolution looks at, captured once per visit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionContext {
    /// Path of the requested page (e.g. "/ja/index.html")
    pub url_path: String,
    /// Raw stored language, not yet validated
    pub stored_preference: Option<String>,
    pub location: LocationInfo,
    /// Client language tag (e.g. "pt-BR", "zh-Hant-TW")
    pub client_language: Option<String>,
    /// Used when no signal is available at all
    pub default_language: LanguageCode,
    /// Used when the country is known but no locale serves it
    pub fallback_language: LanguageCode,
}

impl ResolutionContext {
    /// Context for the site root with no signals
    pub fn new(default_language: LanguageCode, fallback_language: LanguageCode) -> Self {
        Self {
            url_path: "/".to_string(),
            stored_preference: None,
            location: LocationInfo::default(),
            client_language: None,
            default_language,
            fallback_language,
        }
    }

    pub fn with_path(mut self, url_path: impl Into<String>) -> Self {
        self.url_path = url_path.into();
        self
    }

    pub fn with_stored_preference(mut self, stored: Option<String>) -> Self {
        self.stored_preference = stored;
        self
    }

    pub fn with_location(mut self, location: LocationInfo) -> Self {
        self.location = location;
        self
    }

    pub fn with_client_language(mut self, tag: Option<String>) -> Self {
        self.client_language = tag;
        self
    }

    /// Whether anything non-blank is stored, supported or not
    pub fn has_stored_preference(&self) -> bool {
        self.stored_preference
            .as_deref()
            .is_some_and(|value| !value.trim().is_empty())
    }
}

/// Resolve the visitor's language.
pub fn resolve(ctx: &ResolutionContext, catalog: &LanguageCatalog) -> ResolvedLanguage {
    if let Some(code) = detect_language_from_path(&ctx.url_path, catalog) {
        debug!("Language from URL path: {}", code);
        return ResolvedLanguage::new(code, Provenance::Path);
    }

    if let Some(stored) = ctx.stored_preference.as_deref().filter(|s| !s.trim().is_empty()) {
        match LanguageCode::from_code(catalog, stored) {
            Ok(code) => {
                debug!("Language from storage: {}", code);
                return ResolvedLanguage::new(code, Provenance::Stored);
            }
            Err(_) => warn!("Stored language '{}' is not supported, ignoring it", stored),
        }
    }

    if let Some(country) = ctx.location.country() {
        return match catalog.entries_by_region(country) {
            Some(entry) => {
                debug!("Language from geography: {} ({})", entry.code, country);
                ResolvedLanguage::new(LanguageCode::from_entry(entry), Provenance::Geo)
            }
            None => {
                debug!(
                    "Unsupported region {}, using fallback {}",
                    country, ctx.fallback_language
                );
                ResolvedLanguage::new(ctx.fallback_language, Provenance::GeoFallback)
            }
        };
    }

    if let Some(code) = ctx
        .client_language
        .as_deref()
        .and_then(|tag| normalize_client_language(tag, catalog))
    {
        debug!("Language from client preference: {}", code);
        return ResolvedLanguage::new(code, Provenance::Browser);
    }

    debug!("Using default language: {}", ctx.default_language);
    ResolvedLanguage::new(ctx.default_language, Provenance::Default)
}

/// First catalog code, in catalog order, that is a segment of `url_path`.
///
/// A code counts when it appears as `/{code}/` anywhere or ends the path as
/// `/{code}`. Matching is case-sensitive, like the published directories.
pub fn detect_language_from_path(
    url_path: &str,
    catalog: &LanguageCatalog,
) -> Option<LanguageCode> {
    catalog
        .entries()
        .iter()
        .find(|entry| {
            url_path.contains(&format!("/{}/", entry.code))
                || url_path.ends_with(&format!("/{}", entry.code))
        })
        .map(LanguageCode::from_entry)
}

/// Map a client language tag onto a catalog code.
///
/// Traditional Chinese tags (`zh-TW`, `zh-Hant...`) map to [`TRADITIONAL_CHINESE`],
/// other Chinese tags to [`SIMPLIFIED_CHINESE`], everything else by its
/// two-letter primary language. POSIX spellings like `pt_BR.UTF-8` are accepted.
pub fn normalize_client_language(tag: &str, catalog: &LanguageCatalog) -> Option<LanguageCode> {
    let normalized = tag.trim().replace('_', "-").to_lowercase();
    if normalized.is_empty() {
        return None;
    }

    let candidate = if normalized.starts_with("zh-tw") || normalized.starts_with("zh-hant") {
        TRADITIONAL_CHINESE.to_string()
    } else if normalized.starts_with("zh") {
        SIMPLIFIED_CHINESE.to_string()
    } else {
        normalized.chars().take(2).collect()
    };

    LanguageCode::from_code(catalog, &candidate).ok()
}
