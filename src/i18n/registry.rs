//! Language catalog: the closed set of locales the site is published in.
//!
//! Entry order is part of the contract. Several countries are claimed by more
//! than one language (`CA` by English and French, `MA`/`DZ`/`TN` by French
//! and Arabic), and [`LanguageCatalog::entries_by_region`] returns the first
//! entry in catalog order. Path detection scans codes in the same order.
//! Reordering `default_languages()` changes which locale those visitors get.

use crate::error::{Result, SwitchError};
use std::collections::HashSet;
use std::sync::OnceLock;

/// One supported locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageEntry {
    /// Catalog code, also used as the URL path segment (e.g. "ja", "zh-TW")
    pub code: &'static str,

    /// Name shown in the language selector, in the language itself
    pub display_name: &'static str,

    /// Flag emoji shown next to the name
    pub flag: &'static str,

    /// Upper-case ISO 3166-1 alpha-2 countries served by this locale.
    /// Empty means the locale is never chosen from geolocation.
    pub region_codes: &'static [&'static str],
}

impl LanguageEntry {
    /// Check whether this entry serves the given country (case-insensitive).
    pub fn covers_region(&self, country_code: &str) -> bool {
        let upper = country_code.trim().to_ascii_uppercase();
        self.region_codes.iter().any(|region| *region == upper)
    }
}

/// Ordered, immutable collection of [`LanguageEntry`] values.
#[derive(Debug, Clone)]
pub struct LanguageCatalog {
    entries: Vec<LanguageEntry>,
}

/// Built-in site catalog (initialized lazily)
static SITE_CATALOG: OnceLock<LanguageCatalog> = OnceLock::new();

impl LanguageCatalog {
    /// Build a catalog from entries, keeping their order.
    ///
    /// Rejects duplicate codes and region codes that are not upper case.
    pub fn new(entries: Vec<LanguageEntry>) -> Result<Self> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.code.is_empty() {
                return Err(SwitchError::InvalidCatalog("empty language code".into()));
            }
            if !seen.insert(entry.code) {
                return Err(SwitchError::InvalidCatalog(format!(
                    "duplicate language code '{}'",
                    entry.code
                )));
            }
            if let Some(region) = entry
                .region_codes
                .iter()
                .find(|r| r.to_ascii_uppercase() != **r)
            {
                return Err(SwitchError::InvalidCatalog(format!(
                    "region '{}' of '{}' must be upper case",
                    region, entry.code
                )));
            }
        }

        Ok(Self { entries })
    }

    /// Get the built-in site catalog.
    pub fn get() -> &'static LanguageCatalog {
        SITE_CATALOG.get_or_init(|| LanguageCatalog {
            entries: default_languages(),
        })
    }

    /// Look up an entry by its exact code.
    pub fn lookup(&self, code: &str) -> Option<&LanguageEntry> {
        self.entries.iter().find(|entry| entry.code == code)
    }

    /// Check if a code is a catalog member.
    pub fn contains(&self, code: &str) -> bool {
        self.lookup(code).is_some()
    }

    /// All codes in catalog order.
    pub fn codes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.code)
    }

    /// All entries in catalog order.
    pub fn entries(&self) -> &[LanguageEntry] {
        &self.entries
    }

    /// First entry, in catalog order, whose regions contain `country_code`.
    pub fn entries_by_region(&self, country_code: &str) -> Option<&LanguageEntry> {
        self.entries
            .iter()
            .find(|entry| entry.covers_region(country_code))
    }
}

impl Default for LanguageCatalog {
    fn default() -> Self {
        Self::get().clone()
    }
}

/// The site's locales in canonical order.
fn default_languages() -> Vec<LanguageEntry> {
    vec![
        LanguageEntry {
            code: "ja",
            display_name: "日本語",
            flag: "🇯🇵",
            region_codes: &["JP"],
        },
        LanguageEntry {
            code: "en",
            display_name: "English",
            flag: "🇺🇸",
            region_codes: &["US", "GB", "CA", "AU", "NZ", "IE", "ZA"],
        },
        LanguageEntry {
            code: "pt",
            display_name: "Português",
            flag: "🇧🇷",
            region_codes: &["BR", "PT", "AO", "MZ"],
        },
        LanguageEntry {
            code: "ru",
            display_name: "Русский",
            flag: "🇷🇺",
            region_codes: &["RU", "BY", "KZ", "KG", "TJ", "UZ"],
        },
        LanguageEntry {
            code: "fr",
            display_name: "Français",
            flag: "🇫🇷",
            region_codes: &["FR", "BE", "CH", "CA", "MA", "DZ", "TN"],
        },
        LanguageEntry {
            code: "zh",
            display_name: "中文(簡体)",
            flag: "🇨🇳",
            region_codes: &["CN", "SG"],
        },
        LanguageEntry {
            code: "zh-TW",
            display_name: "中文(繁体)",
            flag: "🇹🇼",
            region_codes: &["TW", "HK", "MO"],
        },
        LanguageEntry {
            code: "hi",
            display_name: "हिन्दी",
            flag: "🇮🇳",
            region_codes: &["IN"],
        },
        LanguageEntry {
            code: "es",
            display_name: "Español",
            flag: "🇪🇸",
            region_codes: &[
                "ES", "MX", "AR", "CO", "VE", "PE", "CL", "EC", "GT", "CU", "BO", "DO", "HN",
                "PY", "SV", "NI", "CR", "PA", "UY",
            ],
        },
        LanguageEntry {
            code: "ar",
            display_name: "العربية",
            flag: "🇸🇦",
            region_codes: &[
                "SA", "AE", "EG", "MA", "DZ", "TN", "JO", "LB", "SY", "IQ", "KW", "OM", "QA",
                "BH", "YE",
            ],
        },
        LanguageEntry {
            code: "zh-fake",
            display_name: "偽中国語",
            flag: "🤪",
            region_codes: &[],
        },
    ]
}
