//! Language code type: a code that has been validated against a catalog.

use crate::error::{Result, SwitchError};
use crate::i18n::{LanguageCatalog, LanguageEntry};
use serde::{Serialize, Serializer};
use std::fmt;

/// A validated catalog code.
///
/// Only obtainable through [`LanguageCode::from_code`], so every value that
/// flows through resolution names a locale the site actually serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LanguageCode {
    code: &'static str,
}

impl LanguageCode {
    /// Validate `code` against `catalog`.
    ///
    /// Matching is exact: "zh-tw" is not "zh-TW". Unknown codes are rejected,
    /// never mapped to something close.
    pub fn from_code(catalog: &LanguageCatalog, code: &str) -> Result<LanguageCode> {
        catalog
            .lookup(code)
            .map(LanguageCode::from_entry)
            .ok_or_else(|| SwitchError::UnsupportedLanguage(code.to_string()))
    }

    pub(crate) fn from_entry(entry: &LanguageEntry) -> LanguageCode {
        LanguageCode { code: entry.code }
    }

    /// The catalog code (e.g. "ja", "zh-TW").
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Entry for this code in `catalog`, if the catalog still has it.
    pub fn entry<'a>(&self, catalog: &'a LanguageCatalog) -> Option<&'a LanguageEntry> {
        catalog.lookup(self.code)
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code)
    }
}

impl Serialize for LanguageCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code)
    }
}

impl PartialEq<str> for LanguageCode {
    fn eq(&self, other: &str) -> bool {
        self.code == other
    }
}

impl PartialEq<&str> for LanguageCode {
    fn eq(&self, other: &&str) -> bool {
        self.code == *other
    }
}
